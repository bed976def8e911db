//! Object lifetime core for the lumen runtime.
//!
//! Everything in here revolves around one mechanism: an intrusive, atomic
//! reference count ([`Object`]) that any runtime type embeds, an owning smart
//! pointer ([`Ref`]) built on it, and a cycle-breaking variant
//! ([`BreakableRef`]). Objects start out natively counted; when one crosses
//! the boundary into the foreign managed runtime its count is handed off
//! exactly once through the [`object::bridge`] callbacks, and from then on
//! every increment and decrement is forwarded there.
//!
//! The count never protects the referenced value's own data; it only
//! guarantees the allocation outlives every outstanding ticket.

#[macro_use]
extern crate log;

pub mod object;

pub use object::{
    install_foreign_bridge, AsObject, BreakableRef, BridgeError, DecStatus, ForeignBridge,
    ForeignHandle, Object, Ref,
};
