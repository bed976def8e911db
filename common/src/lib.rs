//! Primitives that paper over the difference between threaded and
//! single-threaded builds. With the `threading` feature the aliases in here
//! resolve to real atomics and `parking_lot` locks; without it they resolve to
//! `Cell`-based stand-ins with the same call-site surface.

pub mod atomic;
pub mod lock;
