//! `Connector`: the application-facing half of the VNIC control protocol.
//! Owns the callback listener, one control session per distinct VNIC
//! address, and a `connectionId` counter shared across both.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use pnet_packets::{ConnectData, ListenData, VnicSocketOpen};
use pnet_wire::Registry;

use crate::callback::CallbackListener;
use crate::error::Error;
use crate::session::ControlSession;
use crate::transport::{apply_layers, BoxedTransport, LayerFactory};

pub struct Connector {
    registry: Arc<Registry>,
    layers: Vec<LayerFactory>,
    callback: Mutex<Option<Arc<CallbackListener>>>,
    sessions: Mutex<HashMap<SocketAddr, Arc<ControlSession>>>,
    next_connection_id: AtomicU32,
}

impl Connector {
    pub fn new(registry: Arc<Registry>, layers: Vec<LayerFactory>) -> Arc<Self> {
        Arc::new(Connector {
            registry,
            layers,
            callback: Mutex::new(None),
            sessions: Mutex::new(HashMap::new()),
            next_connection_id: AtomicU32::new(1),
        })
    }

    async fn ensure_callback_listener(&self) -> Result<Arc<CallbackListener>, Error> {
        if let Some(cb) = self.callback.lock().unwrap().clone() {
            return Ok(cb);
        }
        let cb = Arc::new(CallbackListener::bind().await?);
        let mut guard = self.callback.lock().unwrap();
        if let Some(existing) = guard.as_ref() {
            return Ok(existing.clone());
        }
        *guard = Some(cb.clone());
        Ok(cb)
    }

    async fn session_for(&self, vnic_addr: SocketAddr) -> Result<Arc<ControlSession>, Error> {
        if let Some(session) = self.sessions.lock().unwrap().get(&vnic_addr).cloned() {
            return Ok(session);
        }
        let session = Arc::new(ControlSession::connect(vnic_addr, self.registry.clone()).await?);
        self.sessions.lock().unwrap().insert(vnic_addr, session.clone());
        Ok(session)
    }

    fn next_connection_id(&self) -> u32 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Dial `destination` through the VNIC at `vnic_addr`: open a `CONNECT`
    /// socket, wait for the VNIC to materialize it as a real TCP connection
    /// on the callback listener, wrap it in the configured stacking layers,
    /// and hand it to `app_factory`.
    pub async fn create_connection<F, Fut, T>(
        self: &Arc<Self>,
        vnic_addr: SocketAddr,
        destination: ConnectData,
        app_factory: F,
    ) -> Result<T, Error>
    where
        F: FnOnce(BoxedTransport) -> Fut,
        Fut: Future<Output = T>,
    {
        let callback = self.ensure_callback_listener().await?;
        let session = self.session_for(vnic_addr).await?;
        let connection_id = self.next_connection_id();

        let open_rx = session.register_open_waiter(connection_id);
        let spawn_rx = session.register_spawn_once(connection_id);
        session.send(&VnicSocketOpen {
            connection_id,
            callback_address: callback.addr().ip().to_string(),
            callback_port: callback.addr().port(),
            connect_data: Some(destination),
            listen_data: None,
        });

        match open_rx.await.map_err(|_| Error::SessionClosed(vnic_addr))? {
            Ok(_port) => {}
            Err((_code, message)) => return Err(Error::OpenRefused(connection_id, message)),
        }

        let spawned = spawn_rx.await.map_err(|_| Error::SessionClosed(vnic_addr))?;
        let stream = callback
            .take(spawned.spawn_tcp_port)
            .await
            .ok_or(Error::SpawnNeverArrived(connection_id))?;

        let transport = apply_layers(Box::new(stream), &self.layers);
        Ok(app_factory(transport).await)
    }

    /// Listen for `listen_port` through the VNIC at `vnic_addr`. Resolves as
    /// soon as the VNIC confirms the listen; every subsequent
    /// `VNICConnectionSpawned` for this `connectionId` spawns a fresh
    /// application-protocol instance via `app_factory`.
    pub async fn create_server<F, Fut>(
        self: &Arc<Self>,
        vnic_addr: SocketAddr,
        listen_port: u16,
        app_factory: F,
    ) -> Result<u16, Error>
    where
        F: Fn(BoxedTransport) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback = self.ensure_callback_listener().await?;
        let session = self.session_for(vnic_addr).await?;
        let connection_id = self.next_connection_id();

        let open_rx = session.register_open_waiter(connection_id);
        let mut spawn_rx = session.register_spawn_repeating(connection_id);
        session.send(&VnicSocketOpen {
            connection_id,
            callback_address: callback.addr().ip().to_string(),
            callback_port: callback.addr().port(),
            connect_data: None,
            listen_data: Some(ListenData { source_port: listen_port }),
        });

        let port = match open_rx.await.map_err(|_| Error::SessionClosed(vnic_addr))? {
            Ok(port) => port,
            Err((_code, message)) => return Err(Error::OpenRefused(connection_id, message)),
        };

        let layers = self.layers.clone();
        let app_factory = Arc::new(app_factory);
        tokio::spawn(async move {
            while let Some(spawned) = spawn_rx.recv().await {
                let Some(stream) = callback.take(spawned.spawn_tcp_port).await else {
                    tracing::debug!(connection_id, "listening callback never arrived, dropping spawn");
                    continue;
                };
                let transport = apply_layers(Box::new(stream), &layers);
                let app_factory = app_factory.clone();
                tokio::spawn(async move { app_factory(transport).await; });
            }
        });

        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet_packets::{VnicConnectionSpawned, VnicSocketOpen, VnicSocketOpenResponse};
    use pnet_wire::PacketDecoder;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn registry() -> Arc<Registry> {
        let mut reg = Registry::new();
        pnet_packets::register_core(&mut reg).unwrap();
        pnet_packets::register_vnic(&mut reg).unwrap();
        Arc::new(reg)
    }

    /// Plays the VNIC side of the control protocol for one `create_connection`
    /// call: accept the control session, answer with `ok`, dial the callback
    /// listener, announce the spawn, and write a fixed payload.
    async fn run_fake_vnic_connect(listener: TcpListener, registry: Arc<Registry>) {
        let (mut control, _) = listener.accept().await.unwrap();
        let mut decoder = PacketDecoder::new(registry);
        let mut buf = vec![0u8; 4096];
        let open = loop {
            let n = control.read(&mut buf).await.unwrap();
            decoder.push(&buf[..n]);
            if let Some(packet) = decoder.next_packet() {
                break packet;
            }
        };
        let open = open.as_any().downcast_ref::<VnicSocketOpen>().unwrap().clone();

        let response = VnicSocketOpenResponse::ok(open.connection_id, 4242);
        control.write_all(&pnet_wire::encode_frame(&response).unwrap()).await.unwrap();

        let mut dial = TcpStream::connect((open.callback_address.as_str(), open.callback_port)).await.unwrap();
        let spawn_tcp_port = dial.local_addr().unwrap().port();
        let connect_data = open.connect_data.as_ref().unwrap();

        let spawned = VnicConnectionSpawned {
            connection_id: open.connection_id,
            spawn_tcp_port,
            source: "9.9.9.9".into(),
            source_port: 4242,
            destination: connect_data.destination.clone(),
            destination_port: connect_data.destination_port,
        };
        control.write_all(&pnet_wire::encode_frame(&spawned).unwrap()).await.unwrap();

        dial.write_all(b"hi from vnic").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn create_connection_round_trips_through_a_fake_vnic() {
        let reg = registry();
        let control_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let control_addr = control_listener.local_addr().unwrap();

        tokio::spawn(run_fake_vnic_connect(control_listener, reg.clone()));

        let connector = Connector::new(reg, Vec::new());
        let received = connector
            .create_connection(
                control_addr,
                ConnectData { destination: "2.2.2.2".into(), destination_port: 100 },
                |mut transport| async move {
                    let mut buf = [0u8; 12];
                    transport.read_exact(&mut buf).await.unwrap();
                    buf
                },
            )
            .await
            .unwrap();

        assert_eq!(&received, b"hi from vnic");
    }

    #[tokio::test]
    async fn create_server_confirms_the_listen_port_immediately() {
        let reg = registry();
        let control_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let control_addr = control_listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut control, _) = control_listener.accept().await.unwrap();
            let mut decoder = PacketDecoder::new(reg.clone());
            let mut buf = vec![0u8; 4096];
            let open = loop {
                let n = control.read(&mut buf).await.unwrap();
                decoder.push(&buf[..n]);
                if let Some(packet) = decoder.next_packet() {
                    break packet;
                }
            };
            let open = open.as_any().downcast_ref::<VnicSocketOpen>().unwrap().clone();
            let response = VnicSocketOpenResponse::ok(open.connection_id, 7000);
            control.write_all(&pnet_wire::encode_frame(&response).unwrap()).await.unwrap();
            // hold the control session open for the duration of the test
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        });

        let connector = Connector::new(registry(), Vec::new());
        let port = connector
            .create_server(control_addr, 7000, |_transport| async move {})
            .await
            .unwrap();
        assert_eq!(port, 7000);
    }
}
