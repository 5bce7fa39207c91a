//! `SocketControl`: the owner record for one allocated port, and the
//! per-kind close cascade described by the original `SocketControl`.

use std::collections::HashSet;

use pnet_common::PortKey;

pub type ConnectionId = u32;

/// `CONNECT` owns at most one spawned connection; `LISTEN` owns however
/// many inbound flows have been spawned against it so far.
#[derive(Debug, Clone)]
pub enum SocketControl {
    Connect {
        connection_id: ConnectionId,
        spawned: Option<PortKey>,
    },
    Listen {
        connection_id: ConnectionId,
        spawned: HashSet<PortKey>,
    },
}

impl SocketControl {
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            SocketControl::Connect { connection_id, .. } => *connection_id,
            SocketControl::Listen { connection_id, .. } => *connection_id,
        }
    }

    /// Every `PortKey` this control currently owns a spawned connection
    /// for — torn down when the whole control closes.
    pub fn owned_keys(&self) -> Vec<PortKey> {
        match self {
            SocketControl::Connect { spawned, .. } => spawned.iter().copied().collect(),
            SocketControl::Listen { spawned, .. } => spawned.iter().copied().collect(),
        }
    }

    pub fn record_spawn(&mut self, key: PortKey) {
        match self {
            SocketControl::Connect { spawned, .. } => *spawned = Some(key),
            SocketControl::Listen { spawned, .. } => {
                spawned.insert(key);
            }
        }
    }

    /// Drop one spawned connection's key. For `Listen` this leaves the
    /// listener (and any other spawned connections) intact; for `Connect`
    /// it empties the control's single slot.
    pub fn remove_spawn(&mut self, key: &PortKey) {
        match self {
            SocketControl::Connect { spawned, .. } => {
                if spawned.as_ref() == Some(key) {
                    *spawned = None;
                }
            }
            SocketControl::Listen { spawned, .. } => {
                spawned.remove(key);
            }
        }
    }
}
