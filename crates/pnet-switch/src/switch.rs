//! The LAN forwarding engine: `linkToAddress`/`addressToLinks` bidirectional
//! maps plus the protocol handler that dispatches `AnnounceLink`/
//! `WirePacket`/extension (SPMP) packets arriving on a session.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use bytes::Bytes;
use pnet_common::{Addr, AddrBlock};
use pnet_packets::{AnnounceLink, WirePacket};
use pnet_wire::Packet;
use tokio::sync::mpsc::UnboundedSender;

use crate::unreliable::UnreliableConfig;

/// Identifies one TCP session attached to the switch. The switch itself
/// does not own the socket; the caller (the per-connection task) hands in
/// an outbound channel at [`Switch::attach_session`] and reads frames off
/// the socket, feeding decoded packets to [`Switch::on_announce_link`] /
/// [`Switch::on_wire_packet`].
pub type SessionId = u64;

/// Receives packet types the switch itself does not interpret (SPMP).
pub trait ExtensionHandler: Send + Sync {
    fn handle(&self, from: SessionId, packet: &dyn Packet, raw: &[u8]);
}

struct State {
    link_to_address: HashMap<SessionId, AddrBlock>,
    address_to_links: HashMap<AddrBlock, HashSet<SessionId>>,
    outboxes: HashMap<SessionId, UnboundedSender<Bytes>>,
}

impl State {
    fn new() -> Self {
        State {
            link_to_address: HashMap::new(),
            address_to_links: HashMap::new(),
            outboxes: HashMap::new(),
        }
    }

    fn unregister_link(&mut self, session: SessionId) {
        if let Some(block) = self.link_to_address.remove(&session) {
            if let Some(set) = self.address_to_links.get_mut(&block) {
                set.remove(&session);
                if set.is_empty() {
                    self.address_to_links.remove(&block);
                }
            }
        }
    }
}

pub struct Switch {
    state: Mutex<State>,
    unreliable: Mutex<Option<UnreliableConfig>>,
    extension: Mutex<Option<Box<dyn ExtensionHandler>>>,
}

impl Default for Switch {
    fn default() -> Self {
        Self::new()
    }
}

impl Switch {
    pub fn new() -> Self {
        Switch {
            state: Mutex::new(State::new()),
            unreliable: Mutex::new(None),
            extension: Mutex::new(None),
        }
    }

    pub fn set_unreliable(&self, config: Option<UnreliableConfig>) {
        *self.unreliable.lock().unwrap() = config;
    }

    pub fn set_extension_handler(&self, handler: Box<dyn ExtensionHandler>) {
        *self.extension.lock().unwrap() = Some(handler);
    }

    /// Register a session's outbound channel. Call once per TCP session,
    /// before feeding it any decoded packets.
    pub fn attach_session(&self, session: SessionId, outbox: UnboundedSender<Bytes>) {
        self.state.lock().unwrap().outboxes.insert(session, outbox);
    }

    /// Remove a session from both link maps and its outbound channel. Call
    /// when the session's TCP connection closes.
    pub fn detach_session(&self, session: SessionId) {
        let mut state = self.state.lock().unwrap();
        state.unregister_link(session);
        state.outboxes.remove(&session);
        tracing::info!(session, "switch session detached");
    }

    /// Validate `address` as a well-formed address block (any component may
    /// be `*`); drop silently on invalid. Remove any previous mapping for
    /// this session from both maps, then insert the new one.
    pub fn register_link(&self, address: &str, session: SessionId) {
        let block: AddrBlock = match address.parse() {
            Ok(b) => b,
            Err(_) => {
                tracing::debug!(address, session, "dropping AnnounceLink with malformed address");
                return;
            }
        };
        let mut state = self.state.lock().unwrap();
        state.unregister_link(session);
        state.link_to_address.insert(session, block);
        state.address_to_links.entry(block).or_default().insert(session);
        tracing::info!(address, session, "registered link");
    }

    pub fn unregister_link(&self, session: SessionId) {
        self.state.lock().unwrap().unregister_link(session);
    }

    /// Invariant check helper: every session present in `link_to_address`
    /// is present in the matching `address_to_links` bucket, and vice versa.
    #[cfg(test)]
    fn maps_are_consistent(&self) -> bool {
        let state = self.state.lock().unwrap();
        for (session, block) in &state.link_to_address {
            if !state.address_to_links.get(block).is_some_and(|s| s.contains(session)) {
                return false;
            }
        }
        for (block, sessions) in &state.address_to_links {
            for session in sessions {
                if state.link_to_address.get(session) != Some(block) {
                    return false;
                }
            }
        }
        true
    }

    /// Walk from `destination` up its parent-block chain; at each step,
    /// union all sessions registered at exactly that block. `source`/
    /// `source_port` are accepted (matching the original signature) but not
    /// used in the match — only the destination address determines
    /// delivery. Returns empty if `destination` is not a well-formed
    /// address (not a block: exact four integers, no wildcard).
    pub fn outbound_links(
        &self,
        _source: &str,
        _source_port: u16,
        destination: &str,
        _destination_port: u16,
    ) -> HashSet<SessionId> {
        let addr: Addr = match destination.parse() {
            Ok(a) => a,
            Err(_) => return HashSet::new(),
        };
        let state = self.state.lock().unwrap();
        let mut out = HashSet::new();
        for block in addr.as_block().chain() {
            if let Some(sessions) = state.address_to_links.get(&block) {
                out.extend(sessions.iter().copied());
            }
        }
        out
    }

    /// `AnnounceLink` handler: claim `packet.address` for `from`.
    pub fn on_announce_link(&self, from: SessionId, packet: &AnnounceLink) {
        self.register_link(&packet.address, from);
    }

    /// `WirePacket` handler: forward the identical serialized bytes to
    /// every session selected by [`Switch::outbound_links`].
    pub fn on_wire_packet(&self, from: SessionId, packet: &WirePacket, raw: &[u8]) {
        let targets = self.outbound_links(
            &packet.source,
            packet.source_port,
            &packet.destination,
            packet.destination_port,
        );
        if targets.is_empty() {
            tracing::debug!(from, destination = %packet.destination, "no link for destination, dropping");
            return;
        }
        self.forward_raw(&targets, raw);
    }

    /// Write `raw` verbatim (subject to the unreliable write path, if
    /// configured) to each session in `targets`. Exposed so adapters like
    /// `HierarchyRouter` that compute their own augmented target set can
    /// still reuse the switch's write path.
    pub fn forward_raw(&self, targets: &HashSet<SessionId>, raw: &[u8]) {
        let unreliable = *self.unreliable.lock().unwrap();
        let state = self.state.lock().unwrap();
        for target in targets {
            let Some(outbox) = state.outboxes.get(target) else {
                continue;
            };
            let mut payload = raw.to_vec();
            if let Some(cfg) = unreliable {
                cfg.corrupt(&mut payload);
                if let Some(delay) = cfg.delay() {
                    let outbox = outbox.clone();
                    let payload = Bytes::from(payload);
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = outbox.send(payload);
                    });
                    continue;
                }
            }
            let _ = outbox.send(Bytes::from(payload));
        }
    }

    /// Any decoded packet that is neither `AnnounceLink` nor `WirePacket`
    /// (i.e. SPMP) is handed to the extension handler, if one is set.
    pub fn on_extension(&self, from: SessionId, packet: &dyn Packet, raw: &[u8]) {
        if let Some(handler) = self.extension.lock().unwrap().as_ref() {
            handler.handle(from, packet, raw);
        }
    }
}
