//! The per-host VNIC: port allocation, inbound demultiplex, outbound
//! multiplex and fragmentation, and dump/promiscuous modes.

mod connection_data;
mod error;
mod ports;
mod reassembly;
mod socket_control;
mod vnic;

pub use error::Error;
pub use socket_control::{ConnectionId, SocketControl};
pub use vnic::{dispatch_decoded, ExtensionHandler, Vnic, MAX_MSG_SIZE};
