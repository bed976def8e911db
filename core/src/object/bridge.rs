//! Process-wide bridge to the foreign managed runtime.
//!
//! The two callbacks are installed once, before any object is handed off, and
//! are never replaced. Once an [`Object`] has been adopted through
//! [`Object::set_foreign_owner`] every increment and decrement on it is
//! forwarded here verbatim; whatever synchronization the foreign runtime
//! needs around its own count is the callbacks' business.
//!
//! [`Object`]: crate::object::Object
//! [`Object::set_foreign_owner`]: crate::object::Object::set_foreign_owner

use core::ptr::NonNull;

use lumen_common::lock::OnceCell;

use crate::object::core::fatal;

// the state word of an Object doubles as a handle address
static_assertions::assert_eq_size!(usize, *const ());

/// Handle identifying an object inside the foreign runtime. Non-null, and its
/// address always has the low bit clear so it can share an `Object`'s state
/// word with the native-count tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignHandle(NonNull<()>);

// handles are opaque tokens passed back to the bridge callbacks, which must
// already be callable from arbitrary threads
unsafe impl Send for ForeignHandle {}
unsafe impl Sync for ForeignHandle {}

impl ForeignHandle {
    /// # Panics
    ///
    /// Panics when the address has its low bit set; such an address would be
    /// indistinguishable from a native count.
    pub fn new(ptr: NonNull<()>) -> Self {
        assert!(
            ptr.as_ptr() as usize & 1 == 0,
            "foreign handle addresses must be 2-aligned"
        );
        Self(ptr)
    }

    /// Reinterprets a state word previously written by `set_foreign_owner`.
    ///
    /// # Safety
    ///
    /// `state` must be a non-zero, even value read from an `Object` in the
    /// foreign-owned state.
    pub(crate) unsafe fn from_state(state: usize) -> Self {
        debug_assert!(state != 0 && state & 1 == 0);
        Self(NonNull::new_unchecked(state as *mut ()))
    }

    pub fn as_ptr(&self) -> NonNull<()> {
        self.0
    }

    pub(crate) fn as_usize(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

/// The pair of counting callbacks the foreign runtime registers.
#[derive(Debug, Clone, Copy)]
pub struct ForeignBridge {
    pub inc_ref: fn(ForeignHandle),
    pub dec_ref: fn(ForeignHandle),
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("foreign bridge callbacks are already installed")]
    AlreadyInstalled,
}

cfg_if::cfg_if! {
    if #[cfg(feature = "threading")] {
        static BRIDGE: OnceCell<ForeignBridge> = OnceCell::new();

        fn with_bridge<R>(f: impl FnOnce(Option<&ForeignBridge>) -> R) -> R {
            f(BRIDGE.get())
        }

        fn try_install(bridge: ForeignBridge) -> Result<(), ForeignBridge> {
            BRIDGE.set(bridge)
        }
    } else {
        thread_local! {
            static BRIDGE: OnceCell<ForeignBridge> = OnceCell::new();
        }

        fn with_bridge<R>(f: impl FnOnce(Option<&ForeignBridge>) -> R) -> R {
            BRIDGE.with(|b| f(b.get()))
        }

        fn try_install(bridge: ForeignBridge) -> Result<(), ForeignBridge> {
            BRIDGE.with(|b| b.set(bridge))
        }
    }
}

/// Registers the bridge callbacks. Single-writer-before-any-reader: call this
/// at startup, before any object can cross the language boundary.
pub fn install_foreign_bridge(bridge: ForeignBridge) -> Result<(), BridgeError> {
    try_install(bridge).map_err(|_| BridgeError::AlreadyInstalled)
}

pub(crate) fn foreign_inc(handle: ForeignHandle) {
    with_bridge(|bridge| match bridge {
        Some(bridge) => (bridge.inc_ref)(handle),
        None => fatal("foreign-owned object counted with no bridge installed"),
    })
}

pub(crate) fn foreign_dec(handle: ForeignHandle) {
    with_bridge(|bridge| match bridge {
        Some(bridge) => (bridge.dec_ref)(handle),
        None => fatal("foreign-owned object counted with no bridge installed"),
    })
}
