//! The self-describing outer frame: `(identifier, version)` header followed
//! by a body the concrete packet type knows how to encode/decode, plus the
//! process-wide (or siloed) registry that maps a header back to a decoder.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::{Buf, BytesMut};

use crate::codec::{BodyReader, BodyWriter};
use crate::error::{DecodeError, EncodeError};
use crate::version::Version;

/// A concrete, registered wire packet. Object-safe so decoded frames can be
/// handed around as `Box<dyn Packet>` and downcast by callers that know the
/// concrete type they expect (`AnnounceLink`, `WirePacket`, ...).
pub trait Packet: std::any::Any + std::fmt::Debug + Send + Sync {
    fn identifier(&self) -> &'static str;
    fn version(&self) -> Version;
    fn encode_body(&self, w: &mut BodyWriter) -> Result<(), EncodeError>;
    fn as_any(&self) -> &dyn std::any::Any;
}

type DecodeFn = Arc<dyn Fn(&mut BodyReader) -> Result<Box<dyn Packet>, DecodeError> + Send + Sync>;

/// Maps `(identifier, version)` to a decoder. The default registry is
/// process-wide and populated once at startup (a "write-once" table); a
/// [`Registry::fork`] produces an independent copy a caller can add
/// plugin-only registrations to without touching the original — the silo
/// mechanism described in the design: push a fresh registry, restore the
/// original by simply going back to using it once the forked one drops.
#[derive(Clone, Default)]
pub struct Registry {
    by_id: HashMap<(String, u16), BTreeMap<u16, DecodeFn>>,
}

/// A forked registry scoped to one plugin-load context. See [`Registry::fork`].
pub type Silo = Registry;

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register a decoder for `(identifier, version)`. Duplicate
    /// registration of the same `(identifier, version)` is a programming
    /// error: callers should treat `Err` as fatal at startup, not swallow it.
    pub fn register<F>(
        &mut self,
        identifier: &'static str,
        version: Version,
        decode: F,
    ) -> Result<(), DuplicateRegistration>
    where
        F: Fn(&mut BodyReader) -> Result<Box<dyn Packet>, DecodeError> + Send + Sync + 'static,
    {
        let minors = self
            .by_id
            .entry((identifier.to_string(), version.major))
            .or_default();
        if minors.contains_key(&version.minor) {
            return Err(DuplicateRegistration {
                identifier: identifier.to_string(),
                version,
            });
        }
        minors.insert(version.minor, Arc::new(decode));
        Ok(())
    }

    /// Convenience wrapper for packet types exposing `IDENTIFIER`/`VERSION`
    /// constants and a `decode_body` associated function returning `Self`.
    pub fn register_packet<P, F>(
        &mut self,
        identifier: &'static str,
        version: Version,
        decode: F,
    ) -> Result<(), DuplicateRegistration>
    where
        P: Packet + 'static,
        F: Fn(&mut BodyReader) -> Result<P, DecodeError> + Send + Sync + 'static,
    {
        self.register(identifier, version, move |r| {
            decode(r).map(|p| Box::new(p) as Box<dyn Packet>)
        })
    }

    /// Look up a decoder for an exact-or-compatible version: same major,
    /// highest registered minor not exceeding the wire minor (minor versions
    /// within a major are backward compatible, so an older decoder can
    /// parse a packet sent at a newer-but-compatible minor only up to the
    /// fields it knows about; we require the wire minor to be at least the
    /// decoder's minor).
    fn get_for_decode(&self, identifier: &str, version: Version) -> Option<&DecodeFn> {
        let minors = self.by_id.get(&(identifier.to_string(), version.major))?;
        minors
            .range(..=version.minor)
            .next_back()
            .map(|(_, decode_fn)| decode_fn)
    }

    /// The highest registered minor version for `(identifier, major)`, i.e.
    /// "the most recent compatible version".
    pub fn most_recent(&self, identifier: &str, major: u16) -> Option<Version> {
        self.by_id
            .get(&(identifier.to_string(), major))
            .and_then(|minors| minors.keys().next_back())
            .map(|minor| Version::new(major, *minor))
    }

    /// Fork this registry: start a silo that can add its own registrations
    /// without mutating `self`. Drop the fork (or simply stop using it) to
    /// restore the un-silo'd registry.
    pub fn fork(&self) -> Silo {
        self.clone()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("duplicate registration for {identifier} v{version}")]
pub struct DuplicateRegistration {
    pub identifier: String,
    pub version: Version,
}

/// Encode `packet` as a complete self-describing frame.
pub fn encode_frame<P: Packet + ?Sized>(packet: &P) -> Result<BytesMut, EncodeError> {
    let identifier = packet.identifier();
    let version = packet.version().to_string();
    if identifier.len() > u8::MAX as usize || version.len() > u8::MAX as usize {
        return Err(EncodeError::HeaderTooLong);
    }

    let mut header = BodyWriter::new();
    header.u8(identifier.len() as u8);
    header.string_raw(identifier);
    header.u8(version.len() as u8);
    header.string_raw(&version);

    let mut body = BodyWriter::new();
    packet.encode_body(&mut body)?;

    let mut out = header.into_bytes();
    out.unsplit(body.into_bytes());
    Ok(out)
}

/// Attempt to decode one complete frame from the front of `buf`. On success
/// returns the number of bytes consumed and the decoded packet; on
/// [`DecodeError::Incomplete`] the caller should wait for more bytes and
/// retry with the same (unconsumed) buffer; on any other error the frame is
/// unrecoverable and the caller should discard buffered data.
pub fn decode_frame(buf: &[u8], registry: &Registry) -> Result<(usize, Box<dyn Packet>), DecodeError> {
    let mut r = BodyReader::new(buf);
    let id_len = r.u8()? as usize;
    let identifier = r.take_string(id_len)?;
    let ver_len = r.u8()? as usize;
    let version_str = r.take_string(ver_len)?;
    let version: Version = version_str.parse()?;

    let decode_fn = registry
        .get_for_decode(&identifier, version)
        .ok_or_else(|| DecodeError::UnknownPacket {
            identifier: identifier.clone(),
            major: version.major,
            minor: version.minor,
        })?
        .clone();

    let header_len = r.position();
    let mut body_reader = BodyReader::new(&buf[header_len..]);
    let packet = decode_fn(&mut body_reader)?;
    Ok((header_len + body_reader.position(), packet))
}

/// A resumable, stream-fed decoder: feed it bytes as they arrive over a TCP
/// session, pull whole packets out as they complete. Equivalent to the
/// original's generator-based `WAITING_FOR_STREAM` pull interface.
pub struct PacketDecoder {
    registry: Arc<Registry>,
    buf: BytesMut,
}

impl PacketDecoder {
    pub fn new(registry: Arc<Registry>) -> Self {
        PacketDecoder {
            registry,
            buf: BytesMut::new(),
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete packet out of the buffered bytes, if any.
    /// Malformed frames are dropped (with the whole accumulator cleared,
    /// since the self-describing format carries no outer frame length to
    /// resynchronize on) and logged at debug; the session is never closed
    /// because of a decode error.
    pub fn next_packet(&mut self) -> Option<Box<dyn Packet>> {
        match decode_frame(&self.buf, &self.registry) {
            Ok((consumed, packet)) => {
                self.buf.advance(consumed);
                Some(packet)
            }
            Err(e) if e.is_incomplete() => None,
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed packet frame, resynchronizing");
                self.buf.clear();
                None
            }
        }
    }

    /// Pull every whole packet currently available.
    pub fn drain(&mut self) -> Vec<Box<dyn Packet>> {
        let mut out = Vec::new();
        while let Some(p) = self.next_packet() {
            out.push(p);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    struct Ping {
        n: u32,
    }

    impl Packet for Ping {
        fn identifier(&self) -> &'static str {
            "test.Ping"
        }
        fn version(&self) -> Version {
            Version::new(1, 0)
        }
        fn encode_body(&self, w: &mut BodyWriter) -> Result<(), EncodeError> {
            w.u16(1); // field count
            w.u16(0); // tag
            w.u32(self.n);
            Ok(())
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    impl Ping {
        fn decode_body(r: &mut BodyReader) -> Result<Self, DecodeError> {
            let count = r.u16()?;
            assert_eq!(count, 1);
            let _tag = r.u16()?;
            Ok(Ping { n: r.u32()? })
        }
    }

    fn registry() -> Arc<Registry> {
        let mut reg = Registry::new();
        reg.register_packet::<Ping, _>("test.Ping", Version::new(1, 0), Ping::decode_body)
            .unwrap();
        Arc::new(reg)
    }

    #[test]
    fn round_trips_through_registry() {
        let reg = registry();
        let packet = Ping { n: 42 };
        let bytes = encode_frame(&packet).unwrap();
        let (consumed, decoded) = decode_frame(&bytes, &reg).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.as_any().downcast_ref::<Ping>().unwrap(), &packet);
    }

    #[test]
    fn streaming_decoder_waits_for_more_bytes() {
        let reg = registry();
        let bytes = encode_frame(&Ping { n: 7 }).unwrap();
        let mut decoder = PacketDecoder::new(reg);
        // Feed one byte at a time; only the last push should yield a packet.
        for (i, byte) in bytes.iter().enumerate() {
            decoder.push(&[*byte]);
            let got = decoder.next_packet();
            if i + 1 < bytes.len() {
                assert!(got.is_none(), "should still be waiting at byte {i}");
            } else {
                let packet = got.expect("complete frame");
                assert_eq!(packet.as_any().downcast_ref::<Ping>().unwrap().n, 7);
            }
        }
    }

    #[test]
    fn streaming_decoder_handles_arbitrary_chunking() {
        let reg = registry();
        let mut all = BytesMut::new();
        for n in 0..5u32 {
            all.unsplit(encode_frame(&Ping { n }).unwrap());
        }
        let mut decoder = PacketDecoder::new(reg);
        // Chop the whole stream into 3-byte chunks, regardless of frame boundaries.
        let mut decoded = Vec::new();
        for chunk in all.chunks(3) {
            decoder.push(chunk);
            decoded.extend(decoder.drain());
        }
        let ns: Vec<u32> = decoded
            .iter()
            .map(|p| p.as_any().downcast_ref::<Ping>().unwrap().n)
            .collect();
        assert_eq!(ns, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn unknown_packet_is_dropped_not_fatal() {
        let reg = registry();
        let mut decoder = PacketDecoder::new(reg);
        // A header for an unregistered identifier, with a plausible body.
        let mut bad = BodyWriter::new();
        bad.u8(7);
        bad.string_raw("bogus.X");
        bad.u8(3);
        bad.string_raw("1.0");
        decoder.push(&bad.into_bytes());
        assert!(decoder.next_packet().is_none());

        // After the bad frame is discarded, a fresh valid frame decodes fine.
        let bytes = encode_frame(&Ping { n: 99 }).unwrap();
        decoder.push(&bytes);
        let packet = decoder.next_packet().expect("valid frame after resync");
        assert_eq!(packet.as_any().downcast_ref::<Ping>().unwrap().n, 99);
    }

    #[test]
    fn registry_returns_most_recent_minor() {
        let mut reg = Registry::new();
        reg.register_packet::<Ping, _>("test.Ping", Version::new(1, 0), Ping::decode_body)
            .unwrap();
        reg.register_packet::<Ping, _>("test.Ping", Version::new(1, 3), Ping::decode_body)
            .unwrap();
        assert_eq!(reg.most_recent("test.Ping", 1), Some(Version::new(1, 3)));
        assert_eq!(reg.most_recent("test.Ping", 2), None);
    }

    #[test]
    fn duplicate_registration_outside_silo_is_an_error() {
        let mut reg = Registry::new();
        reg.register_packet::<Ping, _>("test.Ping", Version::new(1, 0), Ping::decode_body)
            .unwrap();
        let err = reg
            .register_packet::<Ping, _>("test.Ping", Version::new(1, 0), Ping::decode_body)
            .unwrap_err();
        assert_eq!(err.identifier, "test.Ping");
    }

    #[test]
    fn silo_does_not_pollute_base_registry() {
        let base = registry();
        let mut silo = base.fork();
        // A plugin registers a competing v1.1 decoder in the silo only.
        silo.register_packet::<Ping, _>("test.Ping", Version::new(1, 1), Ping::decode_body)
            .unwrap();
        assert!(silo.most_recent("test.Ping", 1) == Some(Version::new(1, 1)));
        assert!(base.most_recent("test.Ping", 1) == Some(Version::new(1, 0)));
    }
}
