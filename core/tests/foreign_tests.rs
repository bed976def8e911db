//! Exercises the one-shot handoff to a fake foreign runtime. Bridge state is
//! process-wide, so every test shares one installed bridge; per-handle
//! counters keep the assertions independent.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lumen_common::lock::{Lazy, Mutex};
use lumen_core::{
    install_foreign_bridge, AsObject, ForeignBridge, ForeignHandle, Object, Ref,
};

static FOREIGN_COUNTS: Lazy<Mutex<HashMap<usize, i64>>> = Lazy::new(Default::default);

fn bridge_inc(handle: ForeignHandle) {
    *FOREIGN_COUNTS
        .lock()
        .entry(handle.as_ptr().as_ptr() as usize)
        .or_insert(0) += 1;
}

fn bridge_dec(handle: ForeignHandle) {
    *FOREIGN_COUNTS
        .lock()
        .entry(handle.as_ptr().as_ptr() as usize)
        .or_insert(0) -= 1;
}

fn ensure_bridge() {
    let _ = install_foreign_bridge(ForeignBridge {
        inc_ref: bridge_inc,
        dec_ref: bridge_dec,
    });
}

fn fresh_handle() -> ForeignHandle {
    let slot: &'static mut u64 = Box::leak(Box::new(0));
    ForeignHandle::new(NonNull::from(slot).cast())
}

fn foreign_count(handle: ForeignHandle) -> i64 {
    FOREIGN_COUNTS
        .lock()
        .get(&(handle.as_ptr().as_ptr() as usize))
        .copied()
        .unwrap_or(0)
}

struct Gadget {
    base: Object,
    live: Arc<AtomicUsize>,
}

impl Gadget {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            base: Object::new(),
            live: live.clone(),
        }
    }
}

impl AsObject for Gadget {
    fn as_object(&self) -> &Object {
        &self.base
    }
}

impl Drop for Gadget {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[test]
fn second_install_is_rejected() {
    ensure_bridge();
    let err = install_foreign_bridge(ForeignBridge {
        inc_ref: bridge_inc,
        dec_ref: bridge_dec,
    });
    assert!(err.is_err());
}

#[test]
fn handoff_replays_every_native_ticket() {
    ensure_bridge();
    let live = Arc::new(AtomicUsize::new(0));
    let handle = fresh_handle();

    let r1 = Ref::new(Gadget::new(&live));
    let r2 = r1.clone();
    let r3 = r1.clone();
    assert_eq!(r1.ref_count(), 3);

    r1.as_object().set_foreign_owner(handle);
    assert_eq!(foreign_count(handle), 3);
    assert_eq!(r1.ref_count(), 0);
    assert_eq!(r1.as_object().foreign_owner(), Some(handle));

    // counting is forwarded verbatim from now on
    drop(r2);
    assert_eq!(foreign_count(handle), 2);
    let r4 = r1.clone();
    assert_eq!(foreign_count(handle), 3);
    assert_eq!(r4.ref_count(), 0);

    let raw = r1.as_ptr();
    drop(r1);
    drop(r3);
    drop(r4);
    assert_eq!(foreign_count(handle), 0);
    // the native side no longer owns the storage; the object stays alive
    // until the foreign runtime destroys it
    assert_eq!(live.load(Ordering::SeqCst), 1);

    // play the foreign runtime's final teardown
    unsafe { drop(Box::from_raw(raw.cast_mut())) };
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn handoff_with_zero_tickets_replays_nothing() {
    ensure_bridge();
    let handle = fresh_handle();
    let obj = Object::new();

    obj.set_foreign_owner(handle);
    assert_eq!(foreign_count(handle), 0);
    assert_eq!(obj.ref_count(), 0);
    assert_eq!(obj.foreign_owner(), Some(handle));

    obj.inc_ref();
    assert_eq!(foreign_count(handle), 1);
    assert_eq!(obj.ref_count(), 0);
    obj.dec_ref(true);
    assert_eq!(foreign_count(handle), 0);
}

#[test]
fn misaligned_handle_is_rejected() {
    let slot: &'static mut [u8; 4] = Box::leak(Box::new([0; 4]));
    let odd_addr = (slot.as_mut_ptr() as usize) | 1;
    let odd = unsafe { NonNull::new_unchecked(odd_addr as *mut ()) };
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| ForeignHandle::new(odd)));
    assert!(result.is_err());
}
