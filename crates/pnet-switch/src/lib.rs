//! LAN forwarding: address-block registration with wildcard fallback, and
//! an optional unreliable write path for loss/jitter simulation.

mod error;
mod switch;
mod unreliable;

pub use error::Error;
pub use switch::{ExtensionHandler, SessionId, Switch};
pub use unreliable::UnreliableConfig;
