//! One control TCP session to a VNIC's application-control listener:
//! decodes `VNICSocketOpenResponse`/`VNICConnectionSpawned` off the wire
//! and routes each to whichever `create_connection`/`create_server` call
//! is waiting on that `connectionId`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use pnet_packets::{VnicConnectionSpawned, VnicSocketOpenResponse};
use pnet_wire::{Packet, PacketDecoder, Registry};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::Error;

/// `Ok(port)` for a successful open, `Err((errorCode, message))` for a
/// rejection such as `ERROR_CODE_BUSY`.
pub type OpenResult = Result<u16, (u16, String)>;

enum SpawnHandler {
    Once(oneshot::Sender<VnicConnectionSpawned>),
    Repeating(mpsc::UnboundedSender<VnicConnectionSpawned>),
}

struct Dispatch {
    open_waiters: Mutex<HashMap<u32, oneshot::Sender<OpenResult>>>,
    spawn_handlers: Mutex<HashMap<u32, SpawnHandler>>,
}

impl Dispatch {
    fn fail_all(&self) {
        self.open_waiters.lock().unwrap().clear();
        self.spawn_handlers.lock().unwrap().clear();
    }
}

pub struct ControlSession {
    write_tx: mpsc::UnboundedSender<Bytes>,
    dispatch: Arc<Dispatch>,
    reader_task: JoinHandle<()>,
}

impl Drop for ControlSession {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

impl ControlSession {
    pub async fn connect(addr: SocketAddr, registry: Arc<Registry>) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).await.map_err(|e| Error::ControlConnectFailed(addr, e))?;
        let (mut read_half, write_half) = stream.into_split();
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_pump(write_half, write_rx));

        let dispatch = Arc::new(Dispatch {
            open_waiters: Mutex::new(HashMap::new()),
            spawn_handlers: Mutex::new(HashMap::new()),
        });
        let task_dispatch = dispatch.clone();
        let reader_task = tokio::spawn(async move {
            let mut decoder = PacketDecoder::new(registry);
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) | Err(_) => {
                        task_dispatch.fail_all();
                        return;
                    }
                    Ok(n) => {
                        decoder.push(&buf[..n]);
                        while let Some(packet) = decoder.next_packet() {
                            dispatch_packet(&task_dispatch, packet.as_ref());
                        }
                    }
                }
            }
        });

        Ok(ControlSession { write_tx, dispatch, reader_task })
    }

    pub fn send(&self, packet: &dyn Packet) {
        let Ok(bytes) = pnet_wire::encode_frame(packet) else {
            return;
        };
        let _ = self.write_tx.send(bytes.freeze());
    }

    pub fn register_open_waiter(&self, connection_id: u32) -> oneshot::Receiver<OpenResult> {
        let (tx, rx) = oneshot::channel();
        self.dispatch.open_waiters.lock().unwrap().insert(connection_id, tx);
        rx
    }

    pub fn register_spawn_once(&self, connection_id: u32) -> oneshot::Receiver<VnicConnectionSpawned> {
        let (tx, rx) = oneshot::channel();
        self.dispatch.spawn_handlers.lock().unwrap().insert(connection_id, SpawnHandler::Once(tx));
        rx
    }

    pub fn register_spawn_repeating(&self, connection_id: u32) -> mpsc::UnboundedReceiver<VnicConnectionSpawned> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.dispatch.spawn_handlers.lock().unwrap().insert(connection_id, SpawnHandler::Repeating(tx));
        rx
    }
}

fn dispatch_packet(dispatch: &Dispatch, packet: &dyn Packet) {
    if let Some(resp) = packet.as_any().downcast_ref::<VnicSocketOpenResponse>() {
        if let Some(tx) = dispatch.open_waiters.lock().unwrap().remove(&resp.connection_id) {
            let result = match resp.error_code {
                None => Ok(resp.port),
                Some(code) => Err((code, resp.error_message.clone().unwrap_or_default())),
            };
            let _ = tx.send(result);
        }
        return;
    }
    if let Some(spawned) = packet.as_any().downcast_ref::<VnicConnectionSpawned>() {
        let mut handlers = dispatch.spawn_handlers.lock().unwrap();
        match handlers.get(&spawned.connection_id) {
            Some(SpawnHandler::Once(_)) => {
                if let Some(SpawnHandler::Once(tx)) = handlers.remove(&spawned.connection_id) {
                    let _ = tx.send(spawned.clone());
                }
            }
            Some(SpawnHandler::Repeating(tx)) => {
                let _ = tx.send(spawned.clone());
            }
            None => {
                tracing::debug!(connection_id = spawned.connection_id, "VNICConnectionSpawned for unknown connectionId, dropping");
            }
        }
    }
}

async fn write_pump(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Bytes>) {
    while let Some(chunk) = rx.recv().await {
        if write_half.write_all(&chunk).await.is_err() {
            break;
        }
    }
}
