//! The VNIC: per-host broker between local applications (over a control
//! channel) and the overlay (one link session to a switch).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use pnet_common::{Addr, AddrBlock, PortKey};
use pnet_packets::{
    AnnounceLink, ConnectData, FragData, ListenData, VnicConnectionSpawned, VnicPromiscuousLevel,
    VnicSocketOpenResponse, WirePacket,
};
use pnet_wire::Packet;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::connection_data::ConnectionData;
use crate::error::Error;
use crate::ports::FreePorts;
use crate::reassembly::Reassembly;
use crate::socket_control::SocketControl;

/// A write above this many bytes is split across several `WirePacket`s
/// sharing one `fragId`.
pub const MAX_MSG_SIZE: usize = 65536;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Receives packet types the VNIC's link session itself does not
/// interpret (SPMP), the same role `pnet_switch::ExtensionHandler` plays
/// for a switch session.
pub trait ExtensionHandler: Send + Sync {
    fn handle(&self, packet: &dyn Packet, raw: &[u8]);
}

/// Decode one frame off a VNIC's link session and dispatch it: `WirePacket`
/// goes to `on_wire_packet`, anything else to the extension handler.
pub fn dispatch_decoded(vnic: &Arc<Vnic>, packet: &dyn Packet, raw: &[u8]) {
    if let Some(p) = packet.as_any().downcast_ref::<WirePacket>() {
        vnic.on_wire_packet(p, raw);
    } else {
        vnic.on_extension(packet, raw);
    }
}

pub struct Vnic {
    self_address: Addr,
    link: Mutex<Option<UnboundedSender<Bytes>>>,
    control: Mutex<Option<UnboundedSender<Bytes>>>,
    promiscuity: Mutex<u8>,
    ports: Mutex<HashMap<u16, SocketControl>>,
    port_by_connection: Mutex<HashMap<u32, u16>>,
    listen_callbacks: Mutex<HashMap<u16, (String, u16)>>,
    connections: Mutex<HashMap<PortKey, ConnectionData>>,
    free_ports: Mutex<FreePorts>,
    reassembly: Mutex<HashMap<(PortKey, u32), Reassembly>>,
    dumps: Mutex<HashMap<u64, UnboundedSender<Bytes>>>,
    next_dump_id: AtomicU64,
    extension: Mutex<Option<Box<dyn ExtensionHandler>>>,
    connect_timeout: Duration,
}

impl Vnic {
    pub fn new(self_address: Addr) -> Self {
        Vnic {
            self_address,
            link: Mutex::new(None),
            control: Mutex::new(None),
            promiscuity: Mutex::new(0),
            ports: Mutex::new(HashMap::new()),
            port_by_connection: Mutex::new(HashMap::new()),
            listen_callbacks: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            free_ports: Mutex::new(FreePorts::new()),
            reassembly: Mutex::new(HashMap::new()),
            dumps: Mutex::new(HashMap::new()),
            next_dump_id: AtomicU64::new(1),
            extension: Mutex::new(None),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn self_address(&self) -> Addr {
        self.self_address
    }

    pub fn set_extension_handler(&self, handler: Box<dyn ExtensionHandler>) {
        *self.extension.lock().unwrap() = Some(handler);
    }

    /// Dispatch a decoded packet that is neither `AnnounceLink` nor
    /// `WirePacket` (e.g. an `SpmpFrame`) to the registered handler, if any.
    pub fn on_extension(&self, packet: &dyn Packet, raw: &[u8]) {
        if let Some(handler) = self.extension.lock().unwrap().as_ref() {
            handler.handle(packet, raw);
        } else {
            tracing::debug!(identifier = packet.identifier(), "on_extension: no handler registered, dropping");
        }
    }

    /// Attach the outbound channel of this VNIC's switch session and
    /// immediately announce at the current promiscuity level.
    pub fn set_link(&self, tx: UnboundedSender<Bytes>) {
        *self.link.lock().unwrap() = Some(tx);
        self.announce();
    }

    pub fn clear_link(&self) {
        *self.link.lock().unwrap() = None;
    }

    /// Attach the outbound channel used to reply to the local application
    /// control session.
    pub fn set_control_channel(&self, tx: UnboundedSender<Bytes>) {
        *self.control.lock().unwrap() = Some(tx);
    }

    fn send_link(&self, packet: &dyn Packet) {
        let Ok(bytes) = pnet_wire::encode_frame(packet) else {
            return;
        };
        if let Some(tx) = self.link.lock().unwrap().as_ref() {
            let _ = tx.send(bytes.freeze());
        }
    }

    /// Send a packet over this VNIC's switch-facing link session, for
    /// callers outside the crate that reply to an `on_extension` packet
    /// (e.g. SPMP) on the same channel it arrived on.
    pub fn send_on_link(&self, packet: &dyn Packet) {
        self.send_link(packet);
    }

    fn send_app(&self, packet: &dyn Packet) {
        let Ok(bytes) = pnet_wire::encode_frame(packet) else {
            return;
        };
        if let Some(tx) = self.control.lock().unwrap().as_ref() {
            let _ = tx.send(bytes.freeze());
        }
    }

    fn announce(&self) {
        let level = *self.promiscuity.lock().unwrap();
        let block = AddrBlock::from_addr_wildcarding(&self.self_address, level);
        tracing::info!(address = %block, "vnic announcing link");
        self.send_link(&AnnounceLink::new(block.to_string()));
    }

    /// `VNICPromiscuousLevel` handler. Applying a new level always
    /// re-announces, even if unchanged, per the resolved open question.
    pub fn promiscuous_level(&self, request: VnicPromiscuousLevel) -> VnicPromiscuousLevel {
        if let Some(level) = request.set {
            *self.promiscuity.lock().unwrap() = level.min(4);
            self.announce();
        }
        let current = *self.promiscuity.lock().unwrap();
        VnicPromiscuousLevel {
            set: None,
            get: request.get.map(|_| current),
        }
    }

    pub fn start_dump(&self) -> (u64, UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_dump_id.fetch_add(1, Ordering::Relaxed);
        self.dumps.lock().unwrap().insert(id, tx);
        (id, rx)
    }

    pub fn stop_dump(&self, id: u64) {
        self.dumps.lock().unwrap().remove(&id);
    }

    /// Inject a `WirePacket` in dump mode; the VNIC honors its key verbatim.
    pub fn inject(&self, packet: &WirePacket) {
        self.send_link(packet);
    }

    /// Outbound open sequence: allocate a port, reply, then dial the
    /// callback address in the background.
    pub fn open_connect(self: &Arc<Self>, connection_id: u32, callback_address: String, callback_port: u16, connect: ConnectData) {
        match self.try_reserve_connect(connection_id, &connect) {
            Ok((source_port, key)) => {
                self.send_app(&VnicSocketOpenResponse::ok(connection_id, source_port));
                let this = self.clone();
                let destination = connect.destination;
                let destination_port = connect.destination_port;
                tokio::spawn(async move {
                    this.dial_and_bind(connection_id, source_port, key, callback_address, callback_port, destination, destination_port)
                        .await;
                });
            }
            Err(e) => {
                tracing::warn!(connection_id, error = %e, "open_connect rejected");
                self.send_app(&VnicSocketOpenResponse::busy(connection_id, e.to_string()));
            }
        }
    }

    fn try_reserve_connect(&self, connection_id: u32, connect: &ConnectData) -> Result<(u16, PortKey), Error> {
        if self.port_by_connection.lock().unwrap().contains_key(&connection_id) {
            return Err(Error::DuplicateConnectionId(connection_id));
        }
        let destination: Addr = connect
            .destination
            .parse()
            .map_err(|_| Error::InvalidDestination(connect.destination.clone()))?;
        let source_port = self.free_ports.lock().unwrap().allocate().ok_or(Error::PortsExhausted)?;
        let key = PortKey::new(self.self_address, source_port, destination, connect.destination_port);
        self.ports
            .lock()
            .unwrap()
            .insert(source_port, SocketControl::Connect { connection_id, spawned: None });
        self.port_by_connection.lock().unwrap().insert(connection_id, source_port);
        self.connections.lock().unwrap().insert(key, ConnectionData::new());
        Ok((source_port, key))
    }

    /// Listening open sequence: reserve the port (or reply `BUSY`) and
    /// remember the callback address for spawn-on-demand.
    pub fn open_listen(&self, connection_id: u32, callback_address: String, callback_port: u16, listen: ListenData) {
        if self.port_by_connection.lock().unwrap().contains_key(&connection_id) {
            tracing::warn!(connection_id, "open_listen: duplicate connectionId");
            self.send_app(&VnicSocketOpenResponse::busy(connection_id, "duplicate connectionId"));
            return;
        }
        let mut ports = self.ports.lock().unwrap();
        if ports.contains_key(&listen.source_port) {
            drop(ports);
            tracing::warn!(port = listen.source_port, "open_listen: port busy");
            self.send_app(&VnicSocketOpenResponse::busy(
                connection_id,
                format!("port {} already in use", listen.source_port),
            ));
            return;
        }
        ports.insert(
            listen.source_port,
            SocketControl::Listen { connection_id, spawned: HashSet::new() },
        );
        drop(ports);
        self.port_by_connection.lock().unwrap().insert(connection_id, listen.source_port);
        self.listen_callbacks
            .lock()
            .unwrap()
            .insert(listen.source_port, (callback_address, callback_port));
        self.send_app(&VnicSocketOpenResponse::ok(connection_id, listen.source_port));
    }

    /// Tear down a `SocketControl` and every connection it owns: its one
    /// spawned connection for `CONNECT`, or every spawned connection for
    /// `LISTEN`.
    pub fn close(&self, connection_id: u32) {
        let Some(port) = self.port_by_connection.lock().unwrap().remove(&connection_id) else {
            return;
        };
        self.listen_callbacks.lock().unwrap().remove(&port);
        if let Some(ctrl) = self.ports.lock().unwrap().remove(&port) {
            let mut connections = self.connections.lock().unwrap();
            for key in ctrl.owned_keys() {
                connections.remove(&key);
            }
        }
        self.free_ports.lock().unwrap().release(port);
        tracing::info!(connection_id, port, "socket control closed");
    }

    async fn dial_and_bind(
        self: Arc<Self>,
        connection_id: u32,
        local_port: u16,
        key: PortKey,
        callback_address: String,
        callback_port: u16,
        peer_address: String,
        peer_port: u16,
    ) {
        let dial = tokio::time::timeout(self.connect_timeout, TcpStream::connect((callback_address.as_str(), callback_port))).await;
        match dial {
            Ok(Ok(stream)) => {
                self.bind_connection(connection_id, local_port, key, stream, peer_address, peer_port).await;
            }
            _ => {
                tracing::warn!(connection_id, callback_address, callback_port, "callback dial failed or timed out");
                self.connections.lock().unwrap().remove(&key);
            }
        }
    }

    async fn bind_connection(
        self: Arc<Self>,
        connection_id: u32,
        local_port: u16,
        key: PortKey,
        stream: TcpStream,
        peer_address: String,
        peer_port: u16,
    ) {
        let spawn_tcp_port = stream.local_addr().map(|a| a.port()).unwrap_or(0);
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_write_pump(write_half, rx);

        if let Some(conn) = self.connections.lock().unwrap().get_mut(&key) {
            conn.bind(tx);
        }
        if let Some(ctrl) = self.ports.lock().unwrap().get_mut(&local_port) {
            ctrl.record_spawn(key);
        }

        self.send_app(&VnicConnectionSpawned {
            connection_id,
            spawn_tcp_port,
            source: self.self_address.to_string(),
            source_port: local_port,
            destination: peer_address,
            destination_port: peer_port,
        });

        self.spawn_read_pump(read_half, key);
    }

    fn spawn_read_pump(self: &Arc<Self>, mut read_half: OwnedReadHalf, key: PortKey) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_MSG_SIZE];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) | Err(_) => {
                        this.on_connection_closed(key);
                        return;
                    }
                    Ok(n) => this.send(key, &buf[..n]),
                }
            }
        });
    }

    fn on_connection_closed(&self, key: PortKey) {
        self.connections.lock().unwrap().remove(&key);
        let mut ports = self.ports.lock().unwrap();
        let mut to_release = None;
        for (port, ctrl) in ports.iter_mut() {
            if ctrl.owned_keys().contains(&key) {
                ctrl.remove_spawn(&key);
                if let SocketControl::Connect { spawned: None, .. } = ctrl {
                    to_release = Some((*port, ctrl.connection_id()));
                }
                break;
            }
        }
        if let Some((port, connection_id)) = to_release {
            ports.remove(&port);
            drop(ports);
            self.port_by_connection.lock().unwrap().remove(&connection_id);
            self.free_ports.lock().unwrap().release(port);
        }
        tracing::info!(%key, "connection closed");
    }

    /// Wrap `data` into one or more `WirePacket`s (fragmenting above
    /// `MAX_MSG_SIZE`) and send them over the switch link.
    pub fn send(&self, key: PortKey, data: &[u8]) {
        if data.len() <= MAX_MSG_SIZE {
            self.send_link(&WirePacket {
                source: key.source.to_string(),
                destination: key.destination.to_string(),
                source_port: key.source_port,
                destination_port: key.destination_port,
                frag_data: None,
                data: data.to_vec(),
            });
            return;
        }
        let frag_id: u32 = rand::random();
        let total_size = data.len() as u64;
        for (i, chunk) in data.chunks(MAX_MSG_SIZE).enumerate() {
            let offset = (i * MAX_MSG_SIZE) as u64;
            self.send_link(&WirePacket {
                source: key.source.to_string(),
                destination: key.destination.to_string(),
                source_port: key.source_port,
                destination_port: key.destination_port,
                frag_data: Some(FragData { frag_id, total_size, offset }),
                data: chunk.to_vec(),
            });
        }
    }

    /// Inbound demux: dump fan-out, reassembly, inverse-key lookup, and
    /// listener-triggered spawn.
    pub fn on_wire_packet(self: &Arc<Self>, wire: &WirePacket, raw: &[u8]) {
        for tx in self.dumps.lock().unwrap().values() {
            let _ = tx.send(Bytes::copy_from_slice(raw));
        }

        let Ok(source) = wire.source.parse::<Addr>() else {
            tracing::debug!(source = %wire.source, "on_wire_packet: malformed source, dropping");
            return;
        };
        let Ok(destination) = wire.destination.parse::<Addr>() else {
            tracing::debug!(destination = %wire.destination, "on_wire_packet: malformed destination, dropping");
            return;
        };
        let wire_key = PortKey::new(source, wire.source_port, destination, wire.destination_port);
        let local_key = wire_key.inverse();

        let payload = match &wire.frag_data {
            None => wire.data.clone(),
            Some(frag) => match self.reassemble(local_key, *frag, &wire.data) {
                Some(complete) => complete,
                None => return,
            },
        };

        if self.connections.lock().unwrap().contains_key(&local_key) {
            self.deliver(local_key, payload);
            return;
        }

        let listen_port = wire.destination_port;
        let listening = matches!(self.ports.lock().unwrap().get(&listen_port), Some(SocketControl::Listen { .. }));
        if !listening {
            tracing::debug!(%local_key, "on_wire_packet: no connection and no listener, dropping");
            return;
        }
        let Some((callback_address, callback_port)) = self.listen_callbacks.lock().unwrap().get(&listen_port).cloned() else {
            return;
        };
        let connection_id = self
            .ports
            .lock()
            .unwrap()
            .get(&listen_port)
            .map(SocketControl::connection_id)
            .unwrap_or(0);

        self.connections.lock().unwrap().insert(local_key, ConnectionData::new());
        self.deliver(local_key, payload);

        let this = self.clone();
        let peer_address = wire.source.clone();
        let peer_port = wire.source_port;
        tokio::spawn(async move {
            this.dial_and_bind(connection_id, listen_port, local_key, callback_address, callback_port, peer_address, peer_port)
                .await;
        });
    }

    fn deliver(&self, key: PortKey, payload: Vec<u8>) {
        if let Some(conn) = self.connections.lock().unwrap().get_mut(&key) {
            conn.write(&payload);
        }
    }

    fn reassemble(self: &Arc<Self>, key: PortKey, frag: FragData, data: &[u8]) -> Option<Vec<u8>> {
        let rkey = (key, frag.frag_id);
        let mut table = self.reassembly.lock().unwrap();
        if !table.contains_key(&rkey) {
            let this = self.clone();
            match Reassembly::new(frag.total_size, move || {
                this.reassembly.lock().unwrap().remove(&rkey);
                tracing::debug!(frag_id = rkey.1, "fragment reassembly expired after 5 minutes of inactivity");
            }) {
                Ok(r) => {
                    table.insert(rkey, r);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "rejecting fragment");
                    return None;
                }
            }
        }
        let complete = table.get_mut(&rkey).and_then(|r| r.add_fragment(frag.offset, data));
        if complete.is_some() {
            table.remove(&rkey);
        }
        complete
    }
}

fn spawn_write_pump(mut write_half: OwnedWriteHalf, mut rx: UnboundedReceiver<Bytes>) {
    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if write_half.write_all(&chunk).await.is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet_packets::WirePacket;
    use tokio::net::TcpListener;

    fn addr(s: &str) -> Addr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn promiscuous_level_change_always_reannounces() {
        let vnic = Vnic::new(addr("1.1.1.1"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        vnic.set_link(tx); // initial announce at level 0
        let first = rx.recv().await.unwrap();

        let resp = vnic.promiscuous_level(VnicPromiscuousLevel { set: Some(2), get: Some(0) });
        assert_eq!(resp.get, Some(2));
        let second = rx.recv().await.unwrap();
        assert_ne!(first.as_ref(), second.as_ref());

        // setting the same level again still re-announces
        vnic.promiscuous_level(VnicPromiscuousLevel { set: Some(2), get: None });
        let third = rx.recv().await.unwrap();
        assert_eq!(second.as_ref(), third.as_ref());
    }

    #[tokio::test]
    async fn outbound_open_round_trip_end_to_end() {
        let vnic = Arc::new(Vnic::new(addr("1.1.1.1")));
        let (link_tx, mut link_rx) = mpsc::unbounded_channel();
        vnic.set_link(link_tx);
        let _ = link_rx.recv().await.unwrap(); // initial announce

        let (app_tx, mut app_rx) = mpsc::unbounded_channel();
        vnic.set_control_channel(app_tx);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let callback_addr = listener.local_addr().unwrap();

        vnic.open_connect(
            7,
            callback_addr.ip().to_string(),
            callback_addr.port(),
            ConnectData { destination: "2.2.2.2".into(), destination_port: 100 },
        );

        let open_response_bytes = app_rx.recv().await.unwrap();
        let mut reg = pnet_wire::Registry::new();
        pnet_packets::register_core(&mut reg).unwrap();
        pnet_packets::register_vnic(&mut reg).unwrap();
        let (_, decoded) = pnet_wire::decode_frame(&open_response_bytes, &reg).unwrap();
        let response = decoded.as_any().downcast_ref::<VnicSocketOpenResponse>().unwrap();
        assert_eq!(response.connection_id, 7);
        assert!((2000..65535).contains(&response.port));

        let (accepted, _) = listener.accept().await.unwrap();

        let spawned_bytes = app_rx.recv().await.unwrap();
        let (_, decoded) = pnet_wire::decode_frame(&spawned_bytes, &reg).unwrap();
        let spawned = decoded.as_any().downcast_ref::<VnicConnectionSpawned>().unwrap();
        assert_eq!(spawned.connection_id, 7);
        assert_eq!(spawned.source, "1.1.1.1");
        assert_eq!(spawned.source_port, response.port);
        assert_eq!(spawned.destination, "2.2.2.2");
        assert_eq!(spawned.destination_port, 100);
        assert_eq!(spawned.spawn_tcp_port, accepted.local_addr().unwrap().port());

        drop(accepted);
    }

    #[tokio::test]
    async fn listening_socket_spawns_on_first_inbound_packet() {
        let vnic = Arc::new(Vnic::new(addr("1.1.1.1")));
        let (link_tx, mut link_rx) = mpsc::unbounded_channel();
        vnic.set_link(link_tx);
        let _ = link_rx.recv().await.unwrap();

        let (app_tx, mut app_rx) = mpsc::unbounded_channel();
        vnic.set_control_channel(app_tx);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let callback_addr = listener.local_addr().unwrap();

        vnic.open_listen(9, callback_addr.ip().to_string(), callback_addr.port(), ListenData { source_port: 666 });
        let open_response_bytes = app_rx.recv().await.unwrap();
        let mut reg = pnet_wire::Registry::new();
        pnet_packets::register_core(&mut reg).unwrap();
        pnet_packets::register_vnic(&mut reg).unwrap();
        let (_, decoded) = pnet_wire::decode_frame(&open_response_bytes, &reg).unwrap();
        let response = decoded.as_any().downcast_ref::<VnicSocketOpenResponse>().unwrap();
        assert_eq!(response.port, 666);

        let inbound = WirePacket {
            source: "2.2.2.2".into(),
            destination: "1.1.1.1".into(),
            source_port: 100,
            destination_port: 666,
            frag_data: None,
            data: b"hello".to_vec(),
        };
        let raw = pnet_wire::encode_frame(&inbound).unwrap();
        vnic.on_wire_packet(&inbound, &raw);

        let (mut accepted, _) = listener.accept().await.unwrap();
        let spawned_bytes = app_rx.recv().await.unwrap();
        let (_, decoded) = pnet_wire::decode_frame(&spawned_bytes, &reg).unwrap();
        let spawned = decoded.as_any().downcast_ref::<VnicConnectionSpawned>().unwrap();
        assert_eq!(spawned.connection_id, 9);
        assert_eq!(spawned.source_port, 666);
        assert_eq!(spawned.destination, "2.2.2.2");
        assert_eq!(spawned.destination_port, 100);

        let mut buf = [0u8; 5];
        accepted.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn fragmented_write_reassembles_to_identical_bytes() {
        let receiver = Arc::new(Vnic::new(addr("2.2.2.2")));
        let key = PortKey::new(addr("1.1.1.1"), 5000, addr("2.2.2.2"), 100);
        let data = vec![7u8; 204_800];

        let sender = Vnic::new(addr("1.1.1.1"));
        let (tx, mut sender_rx) = mpsc::unbounded_channel();
        sender.set_link(tx);
        sender.send(key, &data);

        let _ = sender_rx.recv().await.unwrap(); // discard the initial AnnounceLink
        let mut packets = Vec::new();
        for _ in 0..4 {
            packets.push(sender_rx.recv().await.unwrap());
        }
        assert_eq!(packets.len(), 4);

        let mut reg = pnet_wire::Registry::new();
        pnet_packets::register_core(&mut reg).unwrap();
        let mut reassembled: Option<Vec<u8>> = None;
        for raw in &packets {
            let (_, decoded) = pnet_wire::decode_frame(raw, &reg).unwrap();
            let wire = decoded.as_any().downcast_ref::<WirePacket>().unwrap();
            assert_eq!(wire.frag_data.unwrap().total_size, 204_800);
            if let Some(complete) = receiver.reassemble(key, wire.frag_data.unwrap(), &wire.data) {
                reassembled = Some(complete);
            }
        }
        assert_eq!(reassembled.unwrap(), data);
    }

    #[test]
    fn dispatch_decoded_routes_non_wire_packets_to_the_extension_handler() {
        use std::sync::atomic::{AtomicBool, Ordering};

        struct Seen(Arc<AtomicBool>);
        impl ExtensionHandler for Seen {
            fn handle(&self, _packet: &dyn Packet, _raw: &[u8]) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let vnic = Arc::new(Vnic::new(addr("1.1.1.1")));
        let seen = Arc::new(AtomicBool::new(false));
        vnic.set_extension_handler(Box::new(Seen(seen.clone())));

        let frame = pnet_packets::SpmpFrame {
            inner: pnet_packets::SpmpPacket::request(1, "status", vec![]),
        };
        let raw = pnet_wire::encode_frame(&frame).unwrap();
        dispatch_decoded(&vnic, &frame, &raw);

        assert!(seen.load(Ordering::SeqCst));
    }
}
