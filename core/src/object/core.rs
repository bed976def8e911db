use lumen_common::atomic::{Atomic, Ordering};

#[cfg(not(feature = "threading"))]
use lumen_common::atomic::Radium;

use crate::object::bridge::{self, ForeignHandle};

/// Tag bit distinguishing the two interpretations of the state word. When the
/// low bit is set the word is a native ticket count shifted left by one; when
/// it is clear the word is a foreign handle address (foreign handles are
/// always at least 2-aligned, so the bit is free).
const NATIVE_TAG: usize = 1;

/// Intrusive reference-count header. Embed one in any runtime type and
/// implement [`AsObject`] for it to make the type countable through [`Ref`]
/// and [`BreakableRef`].
///
/// The entire state is a single atomic word, mutated only through
/// compare-and-swap except for the two documented plain stores: construction
/// and the one-shot foreign-ownership handoff.
///
/// [`Ref`]: crate::object::Ref
/// [`BreakableRef`]: crate::object::BreakableRef
#[derive(Debug)]
pub struct Object {
    state: Atomic<usize>,
}

/// What the caller of [`Object::dec_ref`] must do next. `Object` is
/// type-erased and cannot run the containing value's destructor, so the final
/// release is reported back to the typed pointer that knows how to free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecStatus {
    /// The last ticket was released with deallocation requested; the caller
    /// owns the storage now and must free it.
    ShouldDrop,
    /// Tickets remain, or deallocation was not requested.
    ShouldKeep,
    /// The count lives in the foreign runtime; the decrement was forwarded.
    Foreign,
}

impl Object {
    /// A fresh object holds no tickets; the first [`Ref`] constructed over it
    /// takes the 0→1 increment.
    ///
    /// [`Ref`]: crate::object::Ref
    pub fn new() -> Self {
        Self {
            state: NATIVE_TAG.into(),
        }
    }

    /// Takes one ticket. Returns the previous native count, 0 when the object
    /// is foreign-owned (foreign counts are not observable from here).
    pub fn inc_ref(&self) -> usize {
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            if state & NATIVE_TAG == 0 {
                bridge::foreign_inc(unsafe { ForeignHandle::from_state(state) });
                return 0;
            }
            debug_assert!(state >> 1 < usize::MAX >> 1, "reference count overflow");
            match self.state.compare_exchange_weak(
                state,
                state + 2,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(prev) => return prev >> 1,
                Err(actual) => state = actual,
            }
        }
    }

    /// Releases one ticket.
    ///
    /// Decrementing past zero is a double-release and indicates memory
    /// corruption already in progress, so it aborts the process instead of
    /// returning. With `deallocate` false the 1→0 transition resets the count
    /// and keeps the allocation alive; this path exists for the handoff and
    /// cycle-breaking machinery and is not exposed through the pointer types.
    pub fn dec_ref(&self, deallocate: bool) -> DecStatus {
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            if state & NATIVE_TAG == 0 {
                bridge::foreign_dec(unsafe { ForeignHandle::from_state(state) });
                return DecStatus::Foreign;
            }
            if state >> 1 == 0 {
                fatal("reference count underflow: released an object with no outstanding tickets");
            }
            match self.state.compare_exchange_weak(
                state,
                state - 2,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(prev) => {
                    if prev >> 1 == 1 {
                        // synchronize with every preceding release before the
                        // storage is touched
                        core::sync::atomic::fence(Ordering::Acquire);
                        if deallocate {
                            #[cfg(feature = "tracking")]
                            crate::object::tracker::unregister(self);
                            return DecStatus::ShouldDrop;
                        }
                    }
                    return DecStatus::ShouldKeep;
                }
                Err(actual) => state = actual,
            }
        }
    }

    /// Current native ticket count; always 0 once foreign-owned.
    pub fn ref_count(&self) -> usize {
        let state = self.state.load(Ordering::Relaxed);
        if state & NATIVE_TAG == 0 {
            0
        } else {
            state >> 1
        }
    }

    /// Hands ownership of this object to the foreign runtime, exactly once.
    ///
    /// Every outstanding native ticket is replayed as a foreign increment on
    /// `handle`, then the state word is rewritten to the handle. From that
    /// point all counting is forwarded through the bridge and destruction is
    /// the foreign runtime's responsibility.
    ///
    /// Must run from a single thread at a well-defined handoff point: it is
    /// not safe against concurrent `inc_ref`/`dec_ref` replaying while the
    /// native count is being mirrored. A second call aborts the process.
    pub fn set_foreign_owner(&self, handle: ForeignHandle) {
        let state = self.state.load(Ordering::Acquire);
        if state & NATIVE_TAG == 0 {
            fatal("object ownership was already handed to the foreign runtime");
        }
        for _ in 0..state >> 1 {
            bridge::foreign_inc(handle);
        }
        self.state.store(handle.as_usize(), Ordering::Release);
    }

    /// The foreign handle, once ownership has been handed off.
    pub fn foreign_owner(&self) -> Option<ForeignHandle> {
        let state = self.state.load(Ordering::Acquire);
        if state & NATIVE_TAG == 0 {
            Some(unsafe { ForeignHandle::from_state(state) })
        } else {
            None
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        // a live native ticket here means something still points at storage
        // that is about to disappear
        debug_assert!(
            self.ref_count() == 0,
            "object destroyed with {} outstanding ticket(s)",
            self.ref_count()
        );
        // foreign-owned objects are destroyed by the foreign runtime and
        // never pass through the dec_ref removal path
        #[cfg(feature = "tracking")]
        crate::object::tracker::unregister(self);
    }
}

/// Contract between a runtime type and the counting machinery: the type
/// embeds an [`Object`] and exposes it here.
pub trait AsObject {
    fn as_object(&self) -> &Object;

    /// Class identification used by diagnostics and logging.
    fn class_name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

impl AsObject for Object {
    fn as_object(&self) -> &Object {
        self
    }
}

/// Detected corruption is not recoverable; log and take the process down.
#[cold]
pub(crate) fn fatal(msg: &str) -> ! {
    error!("{msg}");
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_object_has_no_tickets() {
        let obj = Object::new();
        assert_eq!(obj.ref_count(), 0);
        assert!(obj.foreign_owner().is_none());
    }

    #[test]
    fn balanced_inc_dec_restores_count() {
        let obj = Object::new();
        assert_eq!(obj.inc_ref(), 0);
        assert_eq!(obj.inc_ref(), 1);
        assert_eq!(obj.inc_ref(), 2);
        assert_eq!(obj.ref_count(), 3);
        assert_eq!(obj.dec_ref(false), DecStatus::ShouldKeep);
        assert_eq!(obj.dec_ref(false), DecStatus::ShouldKeep);
        assert_eq!(obj.ref_count(), 1);
        obj.inc_ref();
        obj.dec_ref(false);
        assert_eq!(obj.dec_ref(false), DecStatus::ShouldKeep);
        assert_eq!(obj.ref_count(), 0);
    }

    #[test]
    fn last_decrement_with_deallocate_requests_drop() {
        let obj = Object::new();
        obj.inc_ref();
        assert_eq!(obj.dec_ref(true), DecStatus::ShouldDrop);
        assert_eq!(obj.ref_count(), 0);
    }

    #[test]
    fn decrement_without_deallocate_keeps_object_usable() {
        let obj = Object::new();
        obj.inc_ref();
        assert_eq!(obj.dec_ref(false), DecStatus::ShouldKeep);
        // count reset to zero, object still alive and countable
        assert_eq!(obj.inc_ref(), 0);
        assert_eq!(obj.dec_ref(true), DecStatus::ShouldDrop);
    }

    #[test]
    fn default_class_name_is_type_name() {
        struct Texture {
            base: Object,
        }
        impl AsObject for Texture {
            fn as_object(&self) -> &Object {
                &self.base
            }
        }
        let tex = Texture {
            base: Object::new(),
        };
        assert!(tex.class_name().ends_with("Texture"));
        assert_eq!(tex.as_object().ref_count(), 0);
    }
}
