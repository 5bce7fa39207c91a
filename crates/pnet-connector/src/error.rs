use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bind the callback listener: {0}")]
    CallbackBindFailed(std::io::Error),
    #[error("failed to connect to VNIC control socket {0}: {1}")]
    ControlConnectFailed(std::net::SocketAddr, std::io::Error),
    #[error("control session to {0} closed before responding")]
    SessionClosed(std::net::SocketAddr),
    #[error("VNICSocketOpen for connectionId {0} was refused: {1}")]
    OpenRefused(u32, String),
    #[error("callback listener never received the spawned connection for connectionId {0}")]
    SpawnNeverArrived(u32),
}
