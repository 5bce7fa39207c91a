//! `pnetd wan`: a router over several LAN prefixes, each bound to its own
//! TCP listener, wired together by direct-connection edges that `Wan`
//! instantiates as in-process links between the matched `Switch`es.

use std::net::SocketAddr;
use std::sync::Arc;

use pnet_wan::Wan;
use pnet_wire::Registry;
use tokio::net::TcpListener;

use crate::switch_daemon::{new_switch, run_switch_listener};

/// One LAN prefix's configuration: its numeric prefix, its own listen
/// address, and the prefixes it has a direct connection to.
pub struct PrefixSpec {
    pub prefix: u32,
    pub listen: SocketAddr,
}

pub fn parse_prefix_spec(raw: &str) -> anyhow::Result<PrefixSpec> {
    let (prefix, addr) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("--prefix must be PREFIX=HOST:PORT, got {raw:?}"))?;
    Ok(PrefixSpec {
        prefix: prefix.parse()?,
        listen: addr.parse()?,
    })
}

pub fn parse_neighbor_edge(raw: &str) -> anyhow::Result<(u32, u32)> {
    let (a, b) = raw
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("--neighbor must be PREFIX:PREFIX, got {raw:?}"))?;
    Ok((a.parse()?, b.parse()?))
}

pub async fn run_wan(
    prefixes: Vec<PrefixSpec>,
    neighbors: Vec<(u32, u32)>,
    routing_loss_rate: f64,
    registry: Arc<Registry>,
) -> anyhow::Result<()> {
    let wan = Arc::new(Wan::new(registry.clone()));
    let mut listeners = Vec::new();
    for spec in prefixes {
        let switch = new_switch(format!("WAN prefix {}", spec.prefix));
        wan.register_lan(spec.prefix, switch.clone())?;
        let listener = TcpListener::bind(spec.listen).await?;
        tracing::info!(prefix = spec.prefix, listen = %spec.listen, "WAN prefix listening");
        listeners.push((spec.prefix, switch, listener));
    }

    let mut neighbor_map: std::collections::HashMap<u32, Vec<u32>> = std::collections::HashMap::new();
    for (a, b) in neighbors {
        neighbor_map.entry(a).or_default().push(b);
        neighbor_map.entry(b).or_default().push(a);
    }
    for (prefix, adj) in &neighbor_map {
        wan.set_direct_connections(*prefix, adj, routing_loss_rate)?;
    }

    let mut tasks = Vec::new();
    for (prefix, switch, listener) in listeners {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            tracing::info!(prefix, "WAN prefix switch accepting link sessions");
            run_switch_listener(switch, listener, registry).await;
        }));
    }
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
