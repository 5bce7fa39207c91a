//! The callback listener: one local TCP socket the VNIC dials into for
//! every connection it spawns on this connector's behalf. Inbound sockets
//! are indexed by their remote ("VNIC-side") port — the value the matching
//! `VNICConnectionSpawned.spawn_tcp_port` carries — until that event
//! arrives and pairs them up.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::Error;

struct Shared {
    accepted: Mutex<HashMap<u16, TcpStream>>,
    waiters: Mutex<HashMap<u16, oneshot::Sender<TcpStream>>>,
}

pub struct CallbackListener {
    addr: SocketAddr,
    shared: Arc<Shared>,
    accept_task: JoinHandle<()>,
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

impl CallbackListener {
    pub async fn bind() -> Result<Self, Error> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.map_err(Error::CallbackBindFailed)?;
        let addr = listener.local_addr().map_err(Error::CallbackBindFailed)?;
        let shared = Arc::new(Shared {
            accepted: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
        });
        let task_shared = shared.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let port = peer.port();
                        let waiter = task_shared.waiters.lock().unwrap().remove(&port);
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(stream);
                            }
                            None => {
                                task_shared.accepted.lock().unwrap().insert(port, stream);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "callback listener accept failed, stopping");
                        return;
                    }
                }
            }
        });
        Ok(CallbackListener { addr, shared, accept_task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the socket the VNIC dials in with source port
    /// `spawn_tcp_port`, returning immediately if it already arrived.
    pub async fn take(&self, spawn_tcp_port: u16) -> Option<TcpStream> {
        if let Some(stream) = self.shared.accepted.lock().unwrap().remove(&spawn_tcp_port) {
            return Some(stream);
        }
        let (tx, rx) = oneshot::channel();
        self.shared.waiters.lock().unwrap().insert(spawn_tcp_port, tx);
        rx.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn take_returns_a_connection_accepted_before_the_call() {
        let listener = CallbackListener::bind().await.unwrap();
        let dialer = TcpStream::connect(listener.addr()).await.unwrap();
        let dialer_port = dialer.local_addr().unwrap().port();

        // give the accept loop a moment to record it
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let accepted = listener.take(dialer_port).await;
        assert!(accepted.is_some());
    }

    #[tokio::test]
    async fn take_registers_a_waiter_when_nothing_has_arrived_yet() {
        let listener = CallbackListener::bind().await.unwrap();

        // Nothing has connected on this port, so `take` should still be
        // pending after a short wait rather than resolving to `None`.
        let pending = tokio::time::timeout(std::time::Duration::from_millis(20), listener.take(54321)).await;
        assert!(pending.is_err(), "take() resolved with nothing accepted");
    }
}
