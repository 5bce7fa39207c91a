//! The byte-stream object handed to an application-protocol factory, and
//! the stacking-protocol chain that wraps it first.

use tokio::io::{AsyncRead, AsyncWrite};

/// Anything that reads and writes like a TCP connection. Blanket-implemented
/// for every type that already satisfies the bounds, so a bare
/// `tokio::net::TcpStream` is already a `Transport`.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

pub type BoxedTransport = Box<dyn Transport>;

/// One stacking protocol layered between the raw callback socket and the
/// application. Consumes itself to wrap `inner`, mirroring the original's
/// `StackingTransport`/`StackingProtocol` chain.
pub trait Layer: Send {
    fn wrap(self: Box<Self>, inner: BoxedTransport) -> BoxedTransport;
}

/// Builds one fresh `Layer` instance per connection, since a layer may hold
/// per-connection state (e.g. a framing buffer).
pub type LayerFactory = std::sync::Arc<dyn Fn() -> Box<dyn Layer> + Send + Sync>;

pub(crate) fn apply_layers(mut transport: BoxedTransport, layers: &[LayerFactory]) -> BoxedTransport {
    for factory in layers {
        transport = factory().wrap(transport);
    }
    transport
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// A trivial layer that upper-cases every byte read through it, to prove
    /// `apply_layers` actually interposes rather than passing through.
    struct UppercaseLayer;

    struct Uppercasing {
        inner: BoxedTransport,
    }

    impl AsyncRead for Uppercasing {
        fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
            let before = buf.filled().len();
            let res = Pin::new(&mut self.inner).poll_read(cx, buf);
            if res.is_ready() {
                for b in &mut buf.filled_mut()[before..] {
                    b.make_ascii_uppercase();
                }
            }
            res
        }
    }

    impl AsyncWrite for Uppercasing {
        fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }
        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }
        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    impl Layer for UppercaseLayer {
        fn wrap(self: Box<Self>, inner: BoxedTransport) -> BoxedTransport {
            Box::new(Uppercasing { inner })
        }
    }

    #[tokio::test]
    async fn layers_apply_in_order_around_the_raw_transport() {
        use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

        let (mut far_end, near_end) = duplex(64);
        let layers: Vec<LayerFactory> = vec![std::sync::Arc::new(|| Box::new(UppercaseLayer) as Box<dyn Layer>)];
        let mut wrapped = apply_layers(Box::new(near_end), &layers);

        far_end.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        wrapped.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"HELLO");
    }
}
