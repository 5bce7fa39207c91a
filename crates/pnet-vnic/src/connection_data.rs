//! `ConnectionData`: the per-`PortKey` delivery sink. Buffers writes in
//! memory until the callback TCP socket is dialed and bound, then switches
//! to direct writes and flushes the backlog.

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc::UnboundedSender;

enum Sink {
    Pending(BytesMut),
    Bound(UnboundedSender<Bytes>),
}

pub struct ConnectionData {
    sink: Sink,
}

impl ConnectionData {
    pub fn new() -> Self {
        ConnectionData {
            sink: Sink::Pending(BytesMut::new()),
        }
    }

    /// Deliver inbound bytes for this `PortKey`: straight to the bound
    /// socket if one exists, otherwise appended to the pending buffer.
    pub fn write(&mut self, data: &[u8]) {
        match &mut self.sink {
            Sink::Bound(tx) => {
                let _ = tx.send(Bytes::copy_from_slice(data));
            }
            Sink::Pending(buf) => buf.extend_from_slice(data),
        }
    }

    /// Bind the callback socket's write channel, flushing any bytes that
    /// arrived before the dial completed. Guarantees the first byte the
    /// socket sees for this key is the first byte ever delivered to it.
    pub fn bind(&mut self, tx: UnboundedSender<Bytes>) {
        if let Sink::Pending(buf) = &mut self.sink {
            if !buf.is_empty() {
                let _ = tx.send(buf.split().freeze());
            }
        }
        self.sink = Sink::Bound(tx);
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.sink, Sink::Bound(_))
    }
}

impl Default for ConnectionData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn writes_before_bind_are_buffered_then_flushed_in_order() {
        let mut conn = ConnectionData::new();
        conn.write(b"hello ");
        conn.write(b"world");
        assert!(!conn.is_bound());

        let (tx, mut rx) = mpsc::unbounded_channel();
        conn.bind(tx);
        assert!(conn.is_bound());

        let flushed = rx.recv().await.unwrap();
        assert_eq!(flushed.as_ref(), b"hello world");
    }

    #[tokio::test]
    async fn writes_after_bind_go_straight_through() {
        let mut conn = ConnectionData::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        conn.bind(tx);
        conn.write(b"direct");
        let got = rx.recv().await.unwrap();
        assert_eq!(got.as_ref(), b"direct");
    }
}
