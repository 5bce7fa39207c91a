//! Shared data model for the overlay network.
//!
//! This crate has no network I/O of its own; it defines the value types
//! (virtual addresses, port keys) and small runtime helpers (the reap timer)
//! that every other `pnet-*` crate builds on.

pub mod address;
pub mod error;
pub mod port_key;
pub mod timer;

pub use address::{Addr, AddrBlock, BlockPart, InvalidAddress};
pub use port_key::PortKey;
pub use timer::Timer;
