//! Atomic storage that degrades to plain `Cell`s in single-threaded builds.
//!
//! Code using these aliases is written against the [`Radium`] trait, which
//! both the real atomics and `Cell` implement with identical signatures; the
//! `Ordering` argument is simply ignored by the `Cell` implementations.

pub use core::sync::atomic::Ordering;
pub use radium::Radium;

mod sealed {
    pub trait Sealed {}
}

/// Maps a primitive to its shared-mutable representation for the current
/// build mode.
pub trait Atomable: sealed::Sealed {
    type Radium: Radium<Item = Self>;
}

/// `AtomicX` under `threading`, `Cell<X>` otherwise.
pub type Atomic<T> = <T as Atomable>::Radium;

macro_rules! impl_atomable {
    ($($ty:ty => $atom:ty;)*) => {$(
        impl sealed::Sealed for $ty {}
        impl Atomable for $ty {
            #[cfg(feature = "threading")]
            type Radium = $atom;
            #[cfg(not(feature = "threading"))]
            type Radium = core::cell::Cell<$ty>;
        }
    )*};
}

impl_atomable! {
    bool => core::sync::atomic::AtomicBool;
    u8 => core::sync::atomic::AtomicU8;
    u32 => core::sync::atomic::AtomicU32;
    u64 => core::sync::atomic::AtomicU64;
    usize => core::sync::atomic::AtomicUsize;
    isize => core::sync::atomic::AtomicIsize;
}
