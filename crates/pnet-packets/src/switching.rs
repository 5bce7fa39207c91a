//! `AnnounceLink` and `WirePacket`: the two packet types every switch/WAN
//! hop exchanges.

use pnet_wire::{BodyReader, BodyWriter, DecodeError, EncodeError, Packet, Version};

const ANNOUNCE_LINK_ID: &str = "AnnounceLink";
const WIRE_PACKET_ID: &str = "WirePacket";

const TAG_ADDRESS: u16 = 0;

/// Sent by a client over its switch TCP session to claim an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceLink {
    pub address: String,
}

impl AnnounceLink {
    pub fn new(address: impl Into<String>) -> Self {
        AnnounceLink { address: address.into() }
    }

    pub fn decode_body(r: &mut BodyReader) -> Result<Self, DecodeError> {
        let count = r.u16()?;
        let mut address = None;
        for _ in 0..count {
            match r.u16()? {
                TAG_ADDRESS => address = Some(r.string()?),
                other => return Err(DecodeError::UnknownFieldTag(other)),
            }
        }
        Ok(AnnounceLink {
            address: address.ok_or(DecodeError::Other("AnnounceLink missing address".into()))?,
        })
    }
}

impl Packet for AnnounceLink {
    fn identifier(&self) -> &'static str {
        ANNOUNCE_LINK_ID
    }

    fn version(&self) -> Version {
        Version::new(1, 0)
    }

    fn encode_body(&self, w: &mut BodyWriter) -> Result<(), EncodeError> {
        w.u16(1);
        w.u16(TAG_ADDRESS);
        w.string(&self.address)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// The optional fragmentation header embedded in a `WirePacket` whose
/// payload is one piece of a larger message split at `MAX_MSG_SIZE`
/// boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragData {
    pub frag_id: u32,
    pub total_size: u64,
    pub offset: u64,
}

impl FragData {
    fn encode_into(&self, w: &mut BodyWriter) {
        w.u16(3);
        w.u16(0);
        w.u32(self.frag_id);
        w.u16(1);
        w.u64(self.total_size);
        w.u16(2);
        w.u64(self.offset);
    }

    fn decode_from(r: &mut BodyReader) -> Result<Self, DecodeError> {
        let count = r.u16()?;
        let mut frag_id = None;
        let mut total_size = None;
        let mut offset = None;
        for _ in 0..count {
            match r.u16()? {
                0 => frag_id = Some(r.u32()?),
                1 => total_size = Some(r.u64()?),
                2 => offset = Some(r.u64()?),
                other => return Err(DecodeError::UnknownFieldTag(other)),
            }
        }
        Ok(FragData {
            frag_id: frag_id.ok_or(DecodeError::Other("fragData missing fragId".into()))?,
            total_size: total_size.ok_or(DecodeError::Other("fragData missing totalSize".into()))?,
            offset: offset.ok_or(DecodeError::Other("fragData missing offset".into()))?,
        })
    }
}

/// The payload unit on every inter-device TCP hop. `frag_data` is present
/// only when the originating VNIC split a too-large write into several
/// `WirePacket`s sharing one `frag_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePacket {
    pub source: String,
    pub destination: String,
    pub source_port: u16,
    pub destination_port: u16,
    pub frag_data: Option<FragData>,
    pub data: Vec<u8>,
}

const TAG_SOURCE: u16 = 0;
const TAG_DESTINATION: u16 = 1;
const TAG_SOURCE_PORT: u16 = 2;
const TAG_DESTINATION_PORT: u16 = 3;
const TAG_FRAG_DATA: u16 = 4;
const TAG_DATA: u16 = 5;

impl Packet for WirePacket {
    fn identifier(&self) -> &'static str {
        WIRE_PACKET_ID
    }

    fn version(&self) -> Version {
        Version::new(1, 0)
    }

    fn encode_body(&self, w: &mut BodyWriter) -> Result<(), EncodeError> {
        let count = 5 + self.frag_data.is_some() as u16;
        w.u16(count);
        w.u16(TAG_SOURCE);
        w.string(&self.source)?;
        w.u16(TAG_DESTINATION);
        w.string(&self.destination)?;
        w.u16(TAG_SOURCE_PORT);
        w.u16(self.source_port);
        w.u16(TAG_DESTINATION_PORT);
        w.u16(self.destination_port);
        if let Some(frag) = &self.frag_data {
            w.u16(TAG_FRAG_DATA);
            frag.encode_into(w);
        }
        w.u16(TAG_DATA);
        w.bytes(&self.data);
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl WirePacket {
    pub fn decode_body(r: &mut BodyReader) -> Result<Self, DecodeError> {
        let count = r.u16()?;
        let mut source = None;
        let mut destination = None;
        let mut source_port = None;
        let mut destination_port = None;
        let mut frag_data = None;
        let mut data = None;
        for _ in 0..count {
            match r.u16()? {
                TAG_SOURCE => source = Some(r.string()?),
                TAG_DESTINATION => destination = Some(r.string()?),
                TAG_SOURCE_PORT => source_port = Some(r.u16()?),
                TAG_DESTINATION_PORT => destination_port = Some(r.u16()?),
                TAG_FRAG_DATA => frag_data = Some(FragData::decode_from(r)?),
                TAG_DATA => data = Some(r.bytes()?),
                other => return Err(DecodeError::UnknownFieldTag(other)),
            }
        }
        Ok(WirePacket {
            source: source.ok_or(DecodeError::Other("WirePacket missing source".into()))?,
            destination: destination.ok_or(DecodeError::Other("WirePacket missing destination".into()))?,
            source_port: source_port.ok_or(DecodeError::Other("WirePacket missing sourcePort".into()))?,
            destination_port: destination_port
                .ok_or(DecodeError::Other("WirePacket missing destinationPort".into()))?,
            frag_data,
            data: data.ok_or(DecodeError::Other("WirePacket missing data".into()))?,
        })
    }
}
