use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no free ports remain in [2000, 65535)")]
    PortsExhausted,
    #[error("port {0} is already owned")]
    PortBusy(u16),
    #[error("duplicate connectionId {0}")]
    DuplicateConnectionId(u32),
    #[error("destination address {0:?} is not well-formed")]
    InvalidDestination(String),
    #[error("fragment totalSize {0} exceeds the reassembly cap")]
    ImplausibleFragmentSize(u64),
}
