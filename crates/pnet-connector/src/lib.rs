//! Application-side multiplexer: turns `VNICSocketOpen`/`VNICConnectionSpawned`
//! control-channel events into per-connection TCP transports, stacked with
//! whatever [`Layer`]s the caller configures.

mod callback;
mod connector;
mod error;
mod session;
mod transport;

pub use callback::CallbackListener;
pub use connector::Connector;
pub use error::Error;
pub use transport::{BoxedTransport, Layer, LayerFactory, Transport};
