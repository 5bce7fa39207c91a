use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("prefix {0} is already registered with a LAN switch")]
    DuplicatePrefix(u32),
    #[error("no LAN switch registered at prefix {0}")]
    UnknownPrefix(u32),
}
