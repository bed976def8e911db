mod breakable;
pub mod bridge;
mod core;
mod reference;
#[cfg(feature = "tracking")]
pub mod tracker;

pub use self::breakable::BreakableRef;
pub use self::bridge::{install_foreign_bridge, BridgeError, ForeignBridge, ForeignHandle};
pub use self::core::{AsObject, DecStatus, Object};
pub use self::reference::Ref;
