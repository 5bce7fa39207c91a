//! Application ↔ VNIC control packets: opening/closing logical sockets,
//! dump mode, and promiscuity level.

use pnet_wire::{BodyReader, BodyWriter, DecodeError, EncodeError, Packet, Version};

/// `VNICSocketOpenResponse.error_code` value for "port already has an owner".
pub const ERROR_CODE_BUSY: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectData {
    pub destination: String,
    pub destination_port: u16,
}

impl ConnectData {
    fn encode_into(&self, w: &mut BodyWriter) -> Result<(), EncodeError> {
        w.u16(2);
        w.u16(0);
        w.string(&self.destination)?;
        w.u16(1);
        w.u16(self.destination_port);
        Ok(())
    }

    fn decode_from(r: &mut BodyReader) -> Result<Self, DecodeError> {
        let count = r.u16()?;
        let mut destination = None;
        let mut destination_port = None;
        for _ in 0..count {
            match r.u16()? {
                0 => destination = Some(r.string()?),
                1 => destination_port = Some(r.u16()?),
                other => return Err(DecodeError::UnknownFieldTag(other)),
            }
        }
        Ok(ConnectData {
            destination: destination.ok_or(DecodeError::Other("connectData missing destination".into()))?,
            destination_port: destination_port
                .ok_or(DecodeError::Other("connectData missing destinationPort".into()))?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenData {
    pub source_port: u16,
}

impl ListenData {
    fn encode_into(&self, w: &mut BodyWriter) {
        w.u16(1);
        w.u16(0);
        w.u16(self.source_port);
    }

    fn decode_from(r: &mut BodyReader) -> Result<Self, DecodeError> {
        let count = r.u16()?;
        let mut source_port = None;
        for _ in 0..count {
            match r.u16()? {
                0 => source_port = Some(r.u16()?),
                other => return Err(DecodeError::UnknownFieldTag(other)),
            }
        }
        Ok(ListenData {
            source_port: source_port.ok_or(DecodeError::Other("listenData missing sourcePort".into()))?,
        })
    }
}

const OPEN_ID: &str = "VNICSocketOpen";
const TAG_OPEN_CONNECTION_ID: u16 = 0;
const TAG_OPEN_CALLBACK_ADDRESS: u16 = 1;
const TAG_OPEN_CALLBACK_PORT: u16 = 2;
const TAG_OPEN_CONNECT_DATA: u16 = 3;
const TAG_OPEN_LISTEN_DATA: u16 = 4;

/// Application→VNIC: open an outbound or listening virtual socket.
/// Exactly one of `connect_data`/`listen_data` is expected to be set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VnicSocketOpen {
    pub connection_id: u32,
    pub callback_address: String,
    pub callback_port: u16,
    pub connect_data: Option<ConnectData>,
    pub listen_data: Option<ListenData>,
}

impl Packet for VnicSocketOpen {
    fn identifier(&self) -> &'static str {
        OPEN_ID
    }

    fn version(&self) -> Version {
        Version::new(1, 0)
    }

    fn encode_body(&self, w: &mut BodyWriter) -> Result<(), EncodeError> {
        let count = 3 + self.connect_data.is_some() as u16 + self.listen_data.is_some() as u16;
        w.u16(count);
        w.u16(TAG_OPEN_CONNECTION_ID);
        w.u32(self.connection_id);
        w.u16(TAG_OPEN_CALLBACK_ADDRESS);
        w.string(&self.callback_address)?;
        w.u16(TAG_OPEN_CALLBACK_PORT);
        w.u16(self.callback_port);
        if let Some(connect) = &self.connect_data {
            w.u16(TAG_OPEN_CONNECT_DATA);
            connect.encode_into(w)?;
        }
        if let Some(listen) = &self.listen_data {
            w.u16(TAG_OPEN_LISTEN_DATA);
            listen.encode_into(w);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl VnicSocketOpen {
    pub fn decode_body(r: &mut BodyReader) -> Result<Self, DecodeError> {
        let count = r.u16()?;
        let mut connection_id = None;
        let mut callback_address = None;
        let mut callback_port = None;
        let mut connect_data = None;
        let mut listen_data = None;
        for _ in 0..count {
            match r.u16()? {
                TAG_OPEN_CONNECTION_ID => connection_id = Some(r.u32()?),
                TAG_OPEN_CALLBACK_ADDRESS => callback_address = Some(r.string()?),
                TAG_OPEN_CALLBACK_PORT => callback_port = Some(r.u16()?),
                TAG_OPEN_CONNECT_DATA => connect_data = Some(ConnectData::decode_from(r)?),
                TAG_OPEN_LISTEN_DATA => listen_data = Some(ListenData::decode_from(r)?),
                other => return Err(DecodeError::UnknownFieldTag(other)),
            }
        }
        Ok(VnicSocketOpen {
            connection_id: connection_id.ok_or(DecodeError::Other("VNICSocketOpen missing connectionId".into()))?,
            callback_address: callback_address
                .ok_or(DecodeError::Other("VNICSocketOpen missing callbackAddress".into()))?,
            callback_port: callback_port
                .ok_or(DecodeError::Other("VNICSocketOpen missing callbackPort".into()))?,
            connect_data,
            listen_data,
        })
    }
}

const OPEN_RESPONSE_ID: &str = "VNICSocketOpenResponse";
const TAG_RESP_CONNECTION_ID: u16 = 0;
const TAG_RESP_PORT: u16 = 1;
const TAG_RESP_ERROR_CODE: u16 = 2;
const TAG_RESP_ERROR_MESSAGE: u16 = 3;

/// VNIC→application response to `VNICSocketOpen`, positive or negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VnicSocketOpenResponse {
    pub connection_id: u32,
    pub port: u16,
    pub error_code: Option<u16>,
    pub error_message: Option<String>,
}

impl VnicSocketOpenResponse {
    pub fn ok(connection_id: u32, port: u16) -> Self {
        VnicSocketOpenResponse {
            connection_id,
            port,
            error_code: None,
            error_message: None,
        }
    }

    pub fn busy(connection_id: u32, message: impl Into<String>) -> Self {
        VnicSocketOpenResponse {
            connection_id,
            port: 0,
            error_code: Some(ERROR_CODE_BUSY),
            error_message: Some(message.into()),
        }
    }
}

impl Packet for VnicSocketOpenResponse {
    fn identifier(&self) -> &'static str {
        OPEN_RESPONSE_ID
    }

    fn version(&self) -> Version {
        Version::new(1, 0)
    }

    fn encode_body(&self, w: &mut BodyWriter) -> Result<(), EncodeError> {
        let count =
            2 + self.error_code.is_some() as u16 + self.error_message.is_some() as u16;
        w.u16(count);
        w.u16(TAG_RESP_CONNECTION_ID);
        w.u32(self.connection_id);
        w.u16(TAG_RESP_PORT);
        w.u16(self.port);
        if let Some(code) = self.error_code {
            w.u16(TAG_RESP_ERROR_CODE);
            w.u16(code);
        }
        if let Some(msg) = &self.error_message {
            w.u16(TAG_RESP_ERROR_MESSAGE);
            w.string(msg)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl VnicSocketOpenResponse {
    pub fn decode_body(r: &mut BodyReader) -> Result<Self, DecodeError> {
        let count = r.u16()?;
        let mut connection_id = None;
        let mut port = None;
        let mut error_code = None;
        let mut error_message = None;
        for _ in 0..count {
            match r.u16()? {
                TAG_RESP_CONNECTION_ID => connection_id = Some(r.u32()?),
                TAG_RESP_PORT => port = Some(r.u16()?),
                TAG_RESP_ERROR_CODE => error_code = Some(r.u16()?),
                TAG_RESP_ERROR_MESSAGE => error_message = Some(r.string()?),
                other => return Err(DecodeError::UnknownFieldTag(other)),
            }
        }
        Ok(VnicSocketOpenResponse {
            connection_id: connection_id
                .ok_or(DecodeError::Other("VNICSocketOpenResponse missing connectionId".into()))?,
            port: port.ok_or(DecodeError::Other("VNICSocketOpenResponse missing port".into()))?,
            error_code,
            error_message,
        })
    }
}

const SPAWNED_ID: &str = "VNICConnectionSpawned";
const TAG_SPAWN_CONNECTION_ID: u16 = 0;
const TAG_SPAWN_TCP_PORT: u16 = 1;
const TAG_SPAWN_SOURCE: u16 = 2;
const TAG_SPAWN_SOURCE_PORT: u16 = 3;
const TAG_SPAWN_DESTINATION: u16 = 4;
const TAG_SPAWN_DESTINATION_PORT: u16 = 5;

/// VNIC→application: a newly materialized logical connection has been
/// bound to TCP port `spawn_tcp_port` on the callback listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VnicConnectionSpawned {
    pub connection_id: u32,
    pub spawn_tcp_port: u16,
    pub source: String,
    pub source_port: u16,
    pub destination: String,
    pub destination_port: u16,
}

impl Packet for VnicConnectionSpawned {
    fn identifier(&self) -> &'static str {
        SPAWNED_ID
    }

    fn version(&self) -> Version {
        Version::new(1, 0)
    }

    fn encode_body(&self, w: &mut BodyWriter) -> Result<(), EncodeError> {
        w.u16(6);
        w.u16(TAG_SPAWN_CONNECTION_ID);
        w.u32(self.connection_id);
        w.u16(TAG_SPAWN_TCP_PORT);
        w.u16(self.spawn_tcp_port);
        w.u16(TAG_SPAWN_SOURCE);
        w.string(&self.source)?;
        w.u16(TAG_SPAWN_SOURCE_PORT);
        w.u16(self.source_port);
        w.u16(TAG_SPAWN_DESTINATION);
        w.string(&self.destination)?;
        w.u16(TAG_SPAWN_DESTINATION_PORT);
        w.u16(self.destination_port);
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl VnicConnectionSpawned {
    pub fn decode_body(r: &mut BodyReader) -> Result<Self, DecodeError> {
        let count = r.u16()?;
        let mut connection_id = None;
        let mut spawn_tcp_port = None;
        let mut source = None;
        let mut source_port = None;
        let mut destination = None;
        let mut destination_port = None;
        for _ in 0..count {
            match r.u16()? {
                TAG_SPAWN_CONNECTION_ID => connection_id = Some(r.u32()?),
                TAG_SPAWN_TCP_PORT => spawn_tcp_port = Some(r.u16()?),
                TAG_SPAWN_SOURCE => source = Some(r.string()?),
                TAG_SPAWN_SOURCE_PORT => source_port = Some(r.u16()?),
                TAG_SPAWN_DESTINATION => destination = Some(r.string()?),
                TAG_SPAWN_DESTINATION_PORT => destination_port = Some(r.u16()?),
                other => return Err(DecodeError::UnknownFieldTag(other)),
            }
        }
        Ok(VnicConnectionSpawned {
            connection_id: connection_id
                .ok_or(DecodeError::Other("VNICConnectionSpawned missing connectionId".into()))?,
            spawn_tcp_port: spawn_tcp_port
                .ok_or(DecodeError::Other("VNICConnectionSpawned missing spawnTcpPort".into()))?,
            source: source.ok_or(DecodeError::Other("VNICConnectionSpawned missing source".into()))?,
            source_port: source_port
                .ok_or(DecodeError::Other("VNICConnectionSpawned missing sourcePort".into()))?,
            destination: destination
                .ok_or(DecodeError::Other("VNICConnectionSpawned missing destination".into()))?,
            destination_port: destination_port
                .ok_or(DecodeError::Other("VNICConnectionSpawned missing destinationPort".into()))?,
        })
    }
}

const CLOSE_ID: &str = "VNICSocketClose";

/// Application→VNIC: tear down a logical socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VnicSocketClose {
    pub connection_id: u32,
}

impl Packet for VnicSocketClose {
    fn identifier(&self) -> &'static str {
        CLOSE_ID
    }

    fn version(&self) -> Version {
        Version::new(1, 0)
    }

    fn encode_body(&self, w: &mut BodyWriter) -> Result<(), EncodeError> {
        w.u16(1);
        w.u16(0);
        w.u32(self.connection_id);
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl VnicSocketClose {
    pub fn decode_body(r: &mut BodyReader) -> Result<Self, DecodeError> {
        let count = r.u16()?;
        let mut connection_id = None;
        for _ in 0..count {
            match r.u16()? {
                0 => connection_id = Some(r.u32()?),
                other => return Err(DecodeError::UnknownFieldTag(other)),
            }
        }
        Ok(VnicSocketClose {
            connection_id: connection_id.ok_or(DecodeError::Other("VNICSocketClose missing connectionId".into()))?,
        })
    }
}

macro_rules! empty_packet {
    ($name:ident, $id:expr) => {
        /// Application↔VNIC: enter/exit raw "pcap" mode. Carries no fields.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name;

        impl Packet for $name {
            fn identifier(&self) -> &'static str {
                $id
            }

            fn version(&self) -> Version {
                Version::new(1, 0)
            }

            fn encode_body(&self, w: &mut BodyWriter) -> Result<(), EncodeError> {
                w.u16(0);
                Ok(())
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }

        impl $name {
            pub fn decode_body(r: &mut BodyReader) -> Result<Self, DecodeError> {
                let count = r.u16()?;
                for _ in 0..count {
                    let tag = r.u16()?;
                    return Err(DecodeError::UnknownFieldTag(tag));
                }
                Ok($name)
            }
        }
    };
}

empty_packet!(VnicStartDump, "VNICStartDump");
empty_packet!(VnicStopDump, "VNICStopDump");

const PROMISCUOUS_ID: &str = "VNICPromiscuousLevel";
const TAG_PROMISCUOUS_SET: u16 = 0;
const TAG_PROMISCUOUS_GET: u16 = 1;

/// Get/set the VNIC's promiscuity level (0..4 trailing components wildcarded
/// on announce). Either or both of `set`/`get` may be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VnicPromiscuousLevel {
    pub set: Option<u8>,
    pub get: Option<u8>,
}

impl Packet for VnicPromiscuousLevel {
    fn identifier(&self) -> &'static str {
        PROMISCUOUS_ID
    }

    fn version(&self) -> Version {
        Version::new(1, 0)
    }

    fn encode_body(&self, w: &mut BodyWriter) -> Result<(), EncodeError> {
        let count = self.set.is_some() as u16 + self.get.is_some() as u16;
        w.u16(count);
        if let Some(set) = self.set {
            w.u16(TAG_PROMISCUOUS_SET);
            w.u8(set);
        }
        if let Some(get) = self.get {
            w.u16(TAG_PROMISCUOUS_GET);
            w.u8(get);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl VnicPromiscuousLevel {
    pub fn decode_body(r: &mut BodyReader) -> Result<Self, DecodeError> {
        let count = r.u16()?;
        let mut set = None;
        let mut get = None;
        for _ in 0..count {
            match r.u16()? {
                TAG_PROMISCUOUS_SET => set = Some(r.u8()?),
                TAG_PROMISCUOUS_GET => get = Some(r.u8()?),
                other => return Err(DecodeError::UnknownFieldTag(other)),
            }
        }
        Ok(VnicPromiscuousLevel { set, get })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet_wire::{decode_frame, encode_frame, Registry};

    fn registry() -> Registry {
        let mut reg = Registry::new();
        reg.register_packet::<VnicSocketOpen, _>(OPEN_ID, Version::new(1, 0), VnicSocketOpen::decode_body)
            .unwrap();
        reg.register_packet::<VnicSocketOpenResponse, _>(
            OPEN_RESPONSE_ID,
            Version::new(1, 0),
            VnicSocketOpenResponse::decode_body,
        )
        .unwrap();
        reg.register_packet::<VnicConnectionSpawned, _>(
            SPAWNED_ID,
            Version::new(1, 0),
            VnicConnectionSpawned::decode_body,
        )
        .unwrap();
        reg.register_packet::<VnicSocketClose, _>(CLOSE_ID, Version::new(1, 0), VnicSocketClose::decode_body)
            .unwrap();
        reg.register_packet::<VnicStartDump, _>("VNICStartDump", Version::new(1, 0), VnicStartDump::decode_body)
            .unwrap();
        reg.register_packet::<VnicStopDump, _>("VNICStopDump", Version::new(1, 0), VnicStopDump::decode_body)
            .unwrap();
        reg.register_packet::<VnicPromiscuousLevel, _>(
            PROMISCUOUS_ID,
            Version::new(1, 0),
            VnicPromiscuousLevel::decode_body,
        )
        .unwrap();
        reg
    }

    #[test]
    fn socket_open_round_trips_connect_variant() {
        let reg = registry();
        let packet = VnicSocketOpen {
            connection_id: 7,
            callback_address: "127.0.0.1".into(),
            callback_port: 9091,
            connect_data: Some(ConnectData {
                destination: "2.2.2.2".into(),
                destination_port: 100,
            }),
            listen_data: None,
        };
        let bytes = encode_frame(&packet).unwrap();
        let (_, decoded) = decode_frame(&bytes, &reg).unwrap();
        assert_eq!(decoded.as_any().downcast_ref::<VnicSocketOpen>().unwrap(), &packet);
    }

    #[test]
    fn socket_open_round_trips_listen_variant() {
        let reg = registry();
        let packet = VnicSocketOpen {
            connection_id: 9,
            callback_address: "127.0.0.1".into(),
            callback_port: 9092,
            connect_data: None,
            listen_data: Some(ListenData { source_port: 666 }),
        };
        let bytes = encode_frame(&packet).unwrap();
        let (_, decoded) = decode_frame(&bytes, &reg).unwrap();
        assert_eq!(decoded.as_any().downcast_ref::<VnicSocketOpen>().unwrap(), &packet);
    }

    #[test]
    fn socket_open_response_busy_round_trips() {
        let reg = registry();
        let packet = VnicSocketOpenResponse::busy(9, "port in use");
        let bytes = encode_frame(&packet).unwrap();
        let (_, decoded) = decode_frame(&bytes, &reg).unwrap();
        assert_eq!(
            decoded.as_any().downcast_ref::<VnicSocketOpenResponse>().unwrap(),
            &packet
        );
    }

    #[test]
    fn empty_packets_round_trip() {
        let reg = registry();
        for bytes in [encode_frame(&VnicStartDump).unwrap(), encode_frame(&VnicStopDump).unwrap()] {
            let (_, decoded) = decode_frame(&bytes, &reg).unwrap();
            assert!(decoded.as_any().is::<VnicStartDump>() || decoded.as_any().is::<VnicStopDump>());
        }
    }

    #[test]
    fn promiscuous_level_round_trips_get_and_set() {
        let reg = registry();
        let packet = VnicPromiscuousLevel { set: Some(2), get: None };
        let bytes = encode_frame(&packet).unwrap();
        let (_, decoded) = decode_frame(&bytes, &reg).unwrap();
        assert_eq!(decoded.as_any().downcast_ref::<VnicPromiscuousLevel>().unwrap(), &packet);
    }
}
