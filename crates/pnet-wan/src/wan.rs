//! The WAN: a graph of per-prefix LAN switches with next-hop routing
//! computed by [`crate::routes::RouteTable`], plus direct in-process links
//! pairing neighboring LAN switches so `HierarchyRouter` gateway sessions
//! have somewhere to forward to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use pnet_packets::{AnnounceLink, WirePacket};
use pnet_switch::{SessionId, Switch};
use pnet_wire::{decode_frame, Packet, Registry};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::routes::{Prefix, RouteTable};

struct DirectLinkHandle {
    task_a: JoinHandle<()>,
    task_b: JoinHandle<()>,
}

impl Drop for DirectLinkHandle {
    fn drop(&mut self) {
        self.task_a.abort();
        self.task_b.abort();
    }
}

struct WanState {
    switches: HashMap<Prefix, Arc<Switch>>,
    routes: RouteTable,
    direct_links: HashMap<(Prefix, Prefix), DirectLinkHandle>,
}

pub struct Wan {
    registry: Arc<Registry>,
    state: Mutex<WanState>,
    next_session_id: AtomicU64,
}

fn normalize(a: Prefix, b: Prefix) -> (Prefix, Prefix) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Decode one frame and dispatch it into `switch` as `from_session`, the
/// way a real per-connection task would after reading it off a TCP socket.
pub fn dispatch_decoded(switch: &Switch, from_session: SessionId, packet: &dyn Packet, raw: &[u8]) {
    if let Some(p) = packet.as_any().downcast_ref::<AnnounceLink>() {
        switch.on_announce_link(from_session, p);
    } else if let Some(p) = packet.as_any().downcast_ref::<WirePacket>() {
        switch.on_wire_packet(from_session, p, raw);
    } else {
        switch.on_extension(from_session, packet, raw);
    }
}

async fn drive_direct_link(
    registry: Arc<Registry>,
    switch: Arc<Switch>,
    from_session: SessionId,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    routing_loss_rate: f64,
) {
    while let Some(bytes) = rx.recv().await {
        if routing_loss_rate > 0.0 && rand::thread_rng().gen_bool(routing_loss_rate) {
            tracing::debug!(from_session, "dropped on lossy direct link");
            continue;
        }
        match decode_frame(&bytes, &registry) {
            Ok((_, packet)) => dispatch_decoded(&switch, from_session, packet.as_ref(), &bytes),
            Err(e) if e.is_incomplete() => {
                tracing::debug!(error = %e, "direct link received a partial frame");
            }
            Err(e) => tracing::debug!(error = %e, "malformed frame on direct link, dropping"),
        }
    }
}

impl Wan {
    pub fn new(registry: Arc<Registry>) -> Self {
        Wan {
            registry,
            state: Mutex::new(WanState {
                switches: HashMap::new(),
                routes: RouteTable::new(),
                direct_links: HashMap::new(),
            }),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Register the LAN switch serving `prefix`. Raising on a duplicate
    /// prefix is a startup/programming error, not a runtime one.
    pub fn register_lan(&self, prefix: Prefix, switch: Arc<Switch>) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if state.switches.contains_key(&prefix) {
            return Err(Error::DuplicatePrefix(prefix));
        }
        state.switches.insert(prefix, switch);
        Ok(())
    }

    pub fn switch_at(&self, prefix: Prefix) -> Option<Arc<Switch>> {
        self.state.lock().unwrap().switches.get(&prefix).cloned()
    }

    pub fn next_hop(&self, src: Prefix, dst: Prefix) -> Option<Prefix> {
        self.state.lock().unwrap().routes.next_hop(src, dst)
    }

    /// Declare `prefix`'s direct neighbors, clearing and recomputing all
    /// routes, then synchronously instantiating (or tearing down) the
    /// matched in-process direct links for every edge that changed. Every
    /// endpoint of a newly added edge must already have a registered LAN
    /// switch.
    pub fn set_direct_connections(
        &self,
        prefix: Prefix,
        neighbors: &[Prefix],
        routing_loss_rate: f64,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        let diff = state.routes.set_direct_connections(prefix, neighbors);

        for &(a, b) in &diff.removed {
            state.direct_links.remove(&normalize(a, b));
        }

        for &(a, b) in &diff.added {
            let key = normalize(a, b);
            if state.direct_links.contains_key(&key) {
                continue;
            }
            let switch_a = state.switches.get(&a).cloned().ok_or(Error::UnknownPrefix(a))?;
            let switch_b = state.switches.get(&b).cloned().ok_or(Error::UnknownPrefix(b))?;
            let handle = self.create_direct_link(a, switch_a, b, switch_b, routing_loss_rate);
            state.direct_links.insert(key, handle);
        }
        Ok(())
    }

    fn create_direct_link(
        &self,
        p1: Prefix,
        switch1: Arc<Switch>,
        p2: Prefix,
        switch2: Arc<Switch>,
        routing_loss_rate: f64,
    ) -> DirectLinkHandle {
        let session_a = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session_b = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        let (tx_a, rx_a) = mpsc::unbounded_channel::<Bytes>();
        let (tx_b, rx_b) = mpsc::unbounded_channel::<Bytes>();

        switch1.attach_session(session_a, tx_a);
        switch1.register_link(&format!("{p2}.0.0.0"), session_a);
        switch2.attach_session(session_b, tx_b);
        switch2.register_link(&format!("{p1}.0.0.0"), session_b);

        tracing::info!(p1, p2, "direct WAN link established");

        let task_a = tokio::spawn(drive_direct_link(
            self.registry.clone(),
            switch2,
            session_b,
            rx_a,
            routing_loss_rate,
        ));
        let task_b = tokio::spawn(drive_direct_link(
            self.registry.clone(),
            switch1,
            session_a,
            rx_b,
            routing_loss_rate,
        ));
        DirectLinkHandle { task_a, task_b }
    }
}
