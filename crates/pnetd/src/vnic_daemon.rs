//! `pnetd vnic`: one host's VNIC, dialing out to a switch/WAN link and
//! accepting application control sessions on its own listener.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use pnet_common::Addr;
use pnet_packets::{VnicPromiscuousLevel, VnicSocketClose, VnicSocketOpen, VnicStartDump, VnicStopDump};
use pnet_spmp::{Dispatcher, VnicSpmpHandler};
use pnet_vnic::{dispatch_decoded, Vnic};
use pnet_wire::{Packet, Registry};
use tokio::net::{TcpListener, TcpStream};

use crate::frame_loop::{run_frame_loop, write_pump};

/// How long to wait before redialing a dropped VNIC↔switch link.
const LINK_RECONNECT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

pub async fn run_vnic(address: Addr, link: SocketAddr, control_listen: SocketAddr, registry: Arc<Registry>) -> anyhow::Result<()> {
    let vnic = Arc::new(Vnic::new(address));
    let mut dispatcher = Dispatcher::new();
    dispatcher.register("address", {
        let address = address.to_string();
        move |_args| Ok(address.clone())
    });
    vnic.set_extension_handler(Box::new(VnicSpmpHandler::new(vnic.clone(), dispatcher)));

    tokio::spawn(drive_link(vnic.clone(), link, registry.clone()));

    let listener = TcpListener::bind(control_listen).await?;
    tracing::info!(%control_listen, "VNIC control listener accepting");
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!(%peer, "application control session accepted");
        let vnic = vnic.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            run_control_session(vnic, stream, registry).await;
            tracing::info!(%peer, "application control session closed");
        });
    }
}

/// Dial `link`, run the frame loop until the connection drops, clear the
/// VNIC's link so in-flight sends stop being queued into a dead channel,
/// then redial every `LINK_RECONNECT_INTERVAL` until it succeeds again.
async fn drive_link(vnic: Arc<Vnic>, link: SocketAddr, registry: Arc<Registry>) {
    loop {
        match TcpStream::connect(link).await {
            Ok(stream) => {
                tracing::info!(address = %vnic.self_address(), %link, "VNIC dialed its link session");
                let (link_read, link_write) = stream.into_split();
                let (link_tx, link_rx) = tokio::sync::mpsc::unbounded_channel::<Bytes>();
                vnic.set_link(link_tx);
                tokio::spawn(write_pump(link_write, link_rx));
                run_frame_loop(link_read, registry.clone(), |packet, raw| {
                    dispatch_decoded(&vnic, packet, raw);
                })
                .await;
                vnic.clear_link();
                tracing::warn!(%link, "VNIC link session closed, will redial");
            }
            Err(e) => {
                tracing::warn!(%link, error = %e, "failed to dial VNIC link session");
            }
        }
        tokio::time::sleep(LINK_RECONNECT_INTERVAL).await;
    }
}

async fn run_control_session(vnic: Arc<Vnic>, stream: TcpStream, registry: Arc<Registry>) {
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Bytes>();
    vnic.set_control_channel(tx.clone());
    tokio::spawn(write_pump(write_half, rx));

    let active_dump: Arc<Mutex<Option<u64>>> = Arc::new(Mutex::new(None));
    run_frame_loop(read_half, registry, |packet, raw| {
        dispatch_control_packet(&vnic, &active_dump, &tx, packet, raw);
    })
    .await;

    if let Some(id) = active_dump.lock().unwrap().take() {
        vnic.stop_dump(id);
    }
}

fn dispatch_control_packet(
    vnic: &Arc<Vnic>,
    active_dump: &Arc<Mutex<Option<u64>>>,
    control_tx: &tokio::sync::mpsc::UnboundedSender<Bytes>,
    packet: &dyn Packet,
    raw: &[u8],
) {
    if let Some(open) = packet.as_any().downcast_ref::<VnicSocketOpen>() {
        if let Some(connect) = &open.connect_data {
            vnic.open_connect(open.connection_id, open.callback_address.clone(), open.callback_port, connect.clone());
        } else if let Some(listen) = &open.listen_data {
            vnic.open_listen(open.connection_id, open.callback_address.clone(), open.callback_port, *listen);
        } else {
            tracing::debug!(connection_id = open.connection_id, "VNICSocketOpen with neither connectData nor listenData, dropping");
        }
    } else if let Some(close) = packet.as_any().downcast_ref::<VnicSocketClose>() {
        vnic.close(close.connection_id);
    } else if packet.as_any().downcast_ref::<VnicStartDump>().is_some() {
        let (id, mut dump_rx) = vnic.start_dump();
        *active_dump.lock().unwrap() = Some(id);
        let control_tx = control_tx.clone();
        tokio::spawn(async move {
            while let Some(bytes) = dump_rx.recv().await {
                if control_tx.send(bytes).is_err() {
                    break;
                }
            }
        });
    } else if packet.as_any().downcast_ref::<VnicStopDump>().is_some() {
        if let Some(id) = active_dump.lock().unwrap().take() {
            vnic.stop_dump(id);
        }
    } else if let Some(level) = packet.as_any().downcast_ref::<VnicPromiscuousLevel>() {
        let response = vnic.promiscuous_level(*level);
        let Ok(bytes) = pnet_wire::encode_frame(&response) else {
            return;
        };
        let _ = control_tx.send(bytes.freeze());
    } else {
        vnic.on_extension(packet, raw);
    }
}
