//! Shared real-socket framing loop: buffer bytes off a `TcpStream` read
//! half, pull whole frames with `pnet_wire::decode_frame`, and hand each
//! `(packet, raw)` pair to a callback. Keeping the raw slice (rather than
//! using `PacketDecoder`) matters here because the switch/WAN/VNIC forward
//! paths resend frames byte-for-byte.

use std::sync::Arc;

use bytes::BytesMut;
use pnet_wire::{Packet, Registry};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;

/// Read from `read_half` until EOF or error, dispatching every complete
/// frame to `on_packet`. A malformed frame clears the whole accumulator and
/// resynchronizes, mirroring `PacketDecoder`'s policy, since the session
/// itself should not be torn down over one bad frame.
pub async fn run_frame_loop(mut read_half: OwnedReadHalf, registry: Arc<Registry>, mut on_packet: impl FnMut(&dyn Packet, &[u8])) {
    let mut accum = BytesMut::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        match read_half.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                accum.extend_from_slice(&buf[..n]);
                loop {
                    match pnet_wire::decode_frame(&accum, &registry) {
                        Ok((consumed, packet)) => {
                            let raw = accum.split_to(consumed);
                            on_packet(packet.as_ref(), &raw);
                        }
                        Err(e) if e.is_incomplete() => break,
                        Err(e) => {
                            tracing::debug!(error = %e, "dropping malformed frame, resynchronizing");
                            accum.clear();
                            break;
                        }
                    }
                }
            }
        }
    }
}

pub async fn write_pump(mut write_half: tokio::net::tcp::OwnedWriteHalf, mut rx: tokio::sync::mpsc::UnboundedReceiver<bytes::Bytes>) {
    use tokio::io::AsyncWriteExt;
    while let Some(chunk) = rx.recv().await {
        if write_half.write_all(&chunk).await.is_err() {
            break;
        }
    }
}
