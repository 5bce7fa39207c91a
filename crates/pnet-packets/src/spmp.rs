//! SPMP: a request/response RPC multiplexed on the same listen socket as
//! ordinary traffic. `SpmpFrame` is the outer packet type registered with
//! the wire codec (distinct identifier from `WirePacket`/`AnnounceLink`) so
//! a single streaming decoder can tell the two planes apart; `SpmpPacket`
//! is the request/response payload carried inside it.

use pnet_wire::{BodyReader, BodyWriter, DecodeError, EncodeError, Packet, Version};

/// One SPMP request or response. A request has `request`/`args` set and
/// `result`/`error` unset; a response has `result` xor `error` set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpmpPacket {
    pub request_id: u16,
    pub request: String,
    pub args: Vec<String>,
    pub result: String,
    pub error: Option<String>,
}

impl SpmpPacket {
    pub fn request(request_id: u16, request: impl Into<String>, args: Vec<String>) -> Self {
        SpmpPacket {
            request_id,
            request: request.into(),
            args,
            result: String::new(),
            error: None,
        }
    }

    pub fn ok(request_id: u16, result: impl Into<String>) -> Self {
        SpmpPacket {
            request_id,
            request: String::new(),
            args: Vec::new(),
            result: result.into(),
            error: None,
        }
    }

    pub fn err(request_id: u16, error: impl Into<String>) -> Self {
        SpmpPacket {
            request_id,
            request: String::new(),
            args: Vec::new(),
            result: String::new(),
            error: Some(error.into()),
        }
    }

    fn encode_into(&self, w: &mut BodyWriter) -> Result<(), EncodeError> {
        let count = 3 + self.error.is_some() as u16;
        w.u16(count);
        w.u16(0);
        w.u16(self.request_id);
        w.u16(1);
        w.string(&self.request)?;
        w.u16(2);
        w.u16(self.args.len() as u16);
        for arg in &self.args {
            w.string(arg)?;
        }
        if let Some(error) = &self.error {
            w.u16(4);
            w.string(error)?;
        }
        // `result` shares tag 3 with the always-present fields above so an
        // empty result (the common request-direction case) costs nothing
        // extra on the wire beyond the tag/count bookkeeping.
        w.u16(3);
        w.string(&self.result)?;
        Ok(())
    }

    fn decode_from(r: &mut BodyReader) -> Result<Self, DecodeError> {
        let count = r.u16()?;
        let mut request_id = None;
        let mut request = None;
        let mut args = Vec::new();
        let mut result = None;
        let mut error = None;
        for _ in 0..count {
            match r.u16()? {
                0 => request_id = Some(r.u16()?),
                1 => request = Some(r.string()?),
                2 => {
                    let n = r.u16()?;
                    args = Vec::with_capacity(n as usize);
                    for _ in 0..n {
                        args.push(r.string()?);
                    }
                }
                3 => result = Some(r.string()?),
                4 => error = Some(r.string()?),
                other => return Err(DecodeError::UnknownFieldTag(other)),
            }
        }
        Ok(SpmpPacket {
            request_id: request_id.ok_or(DecodeError::Other("SPMPPacket missing requestId".into()))?,
            request: request.ok_or(DecodeError::Other("SPMPPacket missing request".into()))?,
            args,
            result: result.ok_or(DecodeError::Other("SPMPPacket missing result".into()))?,
            error,
        })
    }
}

const FRAME_ID: &str = "SpmpFrame";

/// The outer registered packet type wrapping one [`SpmpPacket`]. Having its
/// own identifier lets the switch/VNIC/WAN streaming decoder dispatch SPMP
/// traffic to the `on_extension` hook without a side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpmpFrame {
    pub inner: SpmpPacket,
}

impl Packet for SpmpFrame {
    fn identifier(&self) -> &'static str {
        FRAME_ID
    }

    fn version(&self) -> Version {
        Version::new(1, 0)
    }

    fn encode_body(&self, w: &mut BodyWriter) -> Result<(), EncodeError> {
        w.u16(1);
        w.u16(0);
        self.inner.encode_into(w)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl SpmpFrame {
    pub fn decode_body(r: &mut BodyReader) -> Result<Self, DecodeError> {
        let count = r.u16()?;
        let mut inner = None;
        for _ in 0..count {
            match r.u16()? {
                0 => inner = Some(SpmpPacket::decode_from(r)?),
                other => return Err(DecodeError::UnknownFieldTag(other)),
            }
        }
        Ok(SpmpFrame {
            inner: inner.ok_or(DecodeError::Other("SpmpFrame missing inner packet".into()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet_wire::{decode_frame, encode_frame, Registry};

    fn registry() -> Registry {
        let mut reg = Registry::new();
        reg.register_packet::<SpmpFrame, _>(FRAME_ID, Version::new(1, 0), SpmpFrame::decode_body)
            .unwrap();
        reg
    }

    #[test]
    fn request_round_trips() {
        let reg = registry();
        let frame = SpmpFrame {
            inner: SpmpPacket::request(1, "status", vec!["20.1.1.1".into()]),
        };
        let bytes = encode_frame(&frame).unwrap();
        let (_, decoded) = decode_frame(&bytes, &reg).unwrap();
        assert_eq!(decoded.as_any().downcast_ref::<SpmpFrame>().unwrap(), &frame);
    }

    #[test]
    fn error_response_round_trips() {
        let reg = registry();
        let frame = SpmpFrame {
            inner: SpmpPacket::err(1, "unknown verb"),
        };
        let bytes = encode_frame(&frame).unwrap();
        let (_, decoded) = decode_frame(&bytes, &reg).unwrap();
        assert_eq!(decoded.as_any().downcast_ref::<SpmpFrame>().unwrap(), &frame);
    }
}
