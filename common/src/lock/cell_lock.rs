use core::cell::Cell;
use lock_api::{GuardNoSend, RawMutex};

/// Single-threaded stand-in for a mutex. Re-entrant locking is a bug in this
/// build mode, not contention, so it panics rather than deadlocking silently.
pub struct RawCellMutex {
    locked: Cell<bool>,
}

unsafe impl RawMutex for RawCellMutex {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawCellMutex {
        locked: Cell::new(false),
    };

    type GuardMarker = GuardNoSend;

    fn lock(&self) {
        if self.is_locked() {
            panic!("deadlock: tried to re-lock a RawCellMutex on the same thread")
        }
        self.locked.set(true)
    }

    fn try_lock(&self) -> bool {
        if self.is_locked() {
            false
        } else {
            self.locked.set(true);
            true
        }
    }

    unsafe fn unlock(&self) {
        self.locked.set(false)
    }

    fn is_locked(&self) -> bool {
        self.locked.get()
    }
}
