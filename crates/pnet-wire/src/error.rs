use thiserror::Error;

/// Errors while turning a value into wire bytes.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("required field '{0}' is unset")]
    RequiredFieldUnset(&'static str),
    #[error("string field exceeds max length {max}: {len} bytes")]
    StringTooLong { len: usize, max: usize },
    #[error("identifier/version string exceeds 255 bytes")]
    HeaderTooLong,
}

/// Errors while turning wire bytes into a value.
///
/// [`DecodeError::Incomplete`] is not a failure: it means the buffer does
/// not yet hold a whole frame and the caller should wait for more bytes.
/// Every other variant is a genuine malformed-frame condition; per the
/// error-handling policy the caller drops the current frame, logs at debug,
/// and resynchronizes rather than closing the session.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("waiting for more bytes")]
    Incomplete,
    #[error("unknown packet type {identifier} v{major}.{minor}")]
    UnknownPacket {
        identifier: String,
        major: u16,
        minor: u16,
    },
    #[error("unknown field tag {0}")]
    UnknownFieldTag(u16),
    #[error("decoded string was not valid utf-8")]
    InvalidUtf8,
    #[error("buffer length {0} implausibly large")]
    BufferTooLarge(u64),
    #[error("malformed version string {0:?}")]
    MalformedVersion(String),
    #[error("{0}")]
    Other(String),
}

impl DecodeError {
    pub fn is_incomplete(&self) -> bool {
        matches!(self, DecodeError::Incomplete)
    }
}
