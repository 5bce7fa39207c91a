//! Wire codec for the overlay network's self-describing packet format:
//! smallest-width intrinsic field encodings, a versioned packet registry
//! (with silo support for plugin isolation), and a resumable streaming
//! decoder that never closes a session over a malformed frame.

mod codec;
mod error;
mod packet;
mod version;

pub use codec::{
    int_width_for_range, uint_width_for_max, BodyReader, BodyWriter, DEFAULT_UINT_MAX,
};
pub use error::{DecodeError, EncodeError};
pub use packet::{
    decode_frame, encode_frame, DuplicateRegistration, Packet, PacketDecoder, Registry, Silo,
};
pub use version::Version;
