//! `HierarchyRouter`: per-connection adapter wrapping one LAN switch at a
//! time, migrating between switches as the session's host "moves" between
//! prefixes, and augmenting outbound delivery with a next-hop gateway
//! lookup when the destination is outside the current prefix.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use pnet_common::Addr;
use pnet_packets::{AnnounceLink, WirePacket};
use pnet_switch::{SessionId, Switch};

use crate::error::Error;
use crate::routes::Prefix;
use crate::wan::Wan;

pub struct HierarchyRouter {
    wan: Arc<Wan>,
    session: SessionId,
    current_prefix: Mutex<Option<Prefix>>,
    announced: Mutex<Option<String>>,
}

impl HierarchyRouter {
    pub fn new(wan: Arc<Wan>, session: SessionId) -> Self {
        HierarchyRouter {
            wan,
            session,
            current_prefix: Mutex::new(None),
            announced: Mutex::new(None),
        }
    }

    /// Migrate this adapter's announced addresses from its current LAN
    /// switch (if any) to the switch at `prefix`: unregister on the old,
    /// register on the new.
    pub fn set_location(&self, prefix: Prefix) -> Result<(), Error> {
        let new_switch = self.wan.switch_at(prefix).ok_or(Error::UnknownPrefix(prefix))?;

        let mut current = self.current_prefix.lock().unwrap();
        if let Some(old_prefix) = *current {
            if let Some(old_switch) = self.wan.switch_at(old_prefix) {
                old_switch.unregister_link(self.session);
            }
        }
        if let Some(address) = self.announced.lock().unwrap().as_ref() {
            new_switch.register_link(address, self.session);
        }
        *current = Some(prefix);
        Ok(())
    }

    pub fn current_prefix(&self) -> Option<Prefix> {
        *self.current_prefix.lock().unwrap()
    }

    pub fn on_announce_link(&self, packet: &AnnounceLink) {
        *self.announced.lock().unwrap() = Some(packet.address.clone());
        if let Some(switch) = self.current_prefix().and_then(|p| self.wan.switch_at(p)) {
            switch.on_announce_link(self.session, packet);
        }
    }

    /// The local switch's own result, augmented with the gateway session
    /// reachable at `{nextHop}.0.0.0` in the current switch when the
    /// destination's prefix differs from the one this adapter currently
    /// participates in.
    pub fn outbound_links(
        &self,
        source: &str,
        source_port: u16,
        destination: &str,
        destination_port: u16,
    ) -> HashSet<SessionId> {
        let Some(prefix) = self.current_prefix() else {
            return HashSet::new();
        };
        let Some(switch) = self.wan.switch_at(prefix) else {
            return HashSet::new();
        };
        let mut out = switch.outbound_links(source, source_port, destination, destination_port);

        if let Ok(dest_addr) = destination.parse::<Addr>() {
            if dest_addr.zone != prefix {
                if let Some(next_hop) = self.wan.next_hop(prefix, dest_addr.zone) {
                    let gateway = format!("{next_hop}.0.0.0");
                    out.extend(switch.outbound_links(source, source_port, &gateway, destination_port));
                }
            }
        }
        out
    }

    pub fn on_wire_packet(&self, packet: &WirePacket, raw: &[u8]) {
        let Some(prefix) = self.current_prefix() else {
            return;
        };
        let Some(switch) = self.wan.switch_at(prefix) else {
            return;
        };
        let targets = self.outbound_links(
            &packet.source,
            packet.source_port,
            &packet.destination,
            packet.destination_port,
        );
        if targets.is_empty() {
            tracing::debug!(destination = %packet.destination, "WAN adapter found no route, dropping");
            return;
        }
        switch.forward_raw(&targets, raw);
    }
}
