//! `pnetd switch`: a standalone LAN switch accepting link sessions (from
//! VNICs or from a WAN's direct-connection peers) on one TCP listener.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use pnet_spmp::{Dispatcher, SwitchSpmpHandler};
use pnet_switch::Switch;
use pnet_wire::Registry;
use tokio::net::TcpListener;

use crate::frame_loop::{run_frame_loop, write_pump};

/// A switch with its SPMP extension handler already wired up: a `status`
/// verb any connected peer can query over an `SpmpFrame`.
pub fn new_switch(label: impl Into<String> + Send + 'static) -> Arc<Switch> {
    let switch = Arc::new(Switch::new());
    let mut dispatcher = Dispatcher::new();
    let label = label.into();
    dispatcher.register("status", move |_args| Ok(label.clone()));
    switch.set_extension_handler(Box::new(SwitchSpmpHandler::new(switch.clone(), dispatcher)));
    switch
}

pub async fn run_switch(listen: SocketAddr, registry: Arc<Registry>) -> anyhow::Result<()> {
    let switch = new_switch(format!("switch at {listen}"));
    let listener = TcpListener::bind(listen).await?;
    tracing::info!(%listen, "switch listening");
    run_switch_listener(switch, listener, registry).await;
    Ok(())
}

/// Accept loop shared by the standalone `switch` subcommand and every LAN
/// prefix the `wan` subcommand hosts: one `Switch`, one listener, a fresh
/// session id per accepted connection.
pub async fn run_switch_listener(switch: Arc<Switch>, listener: TcpListener, registry: Arc<Registry>) {
    let next_session = Arc::new(AtomicU64::new(1));
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "switch accept failed");
                continue;
            }
        };
        let session = next_session.fetch_add(1, Ordering::Relaxed);
        let switch = switch.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            tracing::info!(session, %peer, "link session accepted");
            let (read_half, write_half) = stream.into_split();
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Bytes>();
            switch.attach_session(session, tx);
            tokio::spawn(write_pump(write_half, rx));
            run_frame_loop(read_half, registry, |packet, raw| {
                pnet_wan::dispatch_decoded(&switch, session, packet, raw);
            })
            .await;
            switch.detach_session(session);
            tracing::info!(session, %peer, "link session closed");
        });
    }
}
