//! Byte-stream transports: TCP, UNIX domain sockets, and the
//! maybe-upgraded TLS wrapper.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

#[cfg(unix)]
use tokio::net::UnixStream;

use crate::connection::tls;
use crate::connection::{ConnectOptions, ServerAddress, Transport};
use crate::error::{ClientError, Error, Result};

pub(crate) enum Socket {
    Tcp(TcpStream),

    #[cfg(unix)]
    Unix(UnixStream),
}

impl Socket {
    pub(crate) async fn connect(address: &ServerAddress) -> Result<Socket> {
        match address {
            ServerAddress::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(true)?;

                Ok(Socket::Tcp(stream))
            }

            #[cfg(unix)]
            ServerAddress::Unix { path } => Ok(Socket::Unix(UnixStream::connect(path).await?)),

            #[cfg(not(unix))]
            ServerAddress::Unix { .. } => Err(Error::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "UNIX domain sockets are not supported on this platform",
            ))),
        }
    }

    /// UNIX sockets are local and count as secure channels.
    pub(crate) fn is_local(&self) -> bool {
        match self {
            Socket::Tcp(_) => false,

            #[cfg(unix)]
            Socket::Unix(_) => true,
        }
    }
}

impl AsyncRead for Socket {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_read(cx, buf),

            #[cfg(unix)]
            Socket::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Socket {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_write(cx, buf),

            #[cfg(unix)]
            Socket::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_flush(cx),

            #[cfg(unix)]
            Socket::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_shutdown(cx),

            #[cfg(unix)]
            Socket::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// A socket that starts in cleartext and may be upgraded to TLS when
/// the session machine requests it.
pub struct MaybeTlsStream {
    state: TlsState,
}

enum TlsState {
    Raw(Socket),
    Tls(Box<tokio_native_tls::TlsStream<Socket>>),

    // Transient while the upgrade future runs.
    Upgrading,
}

impl MaybeTlsStream {
    pub(crate) fn raw(socket: Socket) -> Self {
        Self {
            state: TlsState::Raw(socket),
        }
    }

    pub(crate) fn is_tls(&self) -> bool {
        matches!(self.state, TlsState::Tls(_))
    }

    async fn upgrade(&mut self, options: &ConnectOptions) -> Result<()> {
        let socket = match std::mem::replace(&mut self.state, TlsState::Upgrading) {
            TlsState::Raw(socket) => socket,
            other => {
                self.state = other;
                return Err(ClientError::UnknownTlsError.into());
            }
        };

        match tls::handshake(socket, options).await {
            Ok(stream) => {
                self.state = TlsState::Tls(Box::new(stream));
                Ok(())
            }

            // The socket is consumed by a failed handshake; the session
            // is torn down by the caller anyway.
            Err(err) => Err(err),
        }
    }

    async fn shutdown_tls(&mut self) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        match &mut self.state {
            TlsState::Tls(stream) => Ok(stream.shutdown().await?),
            _ => Err(ClientError::UnknownTlsError.into()),
        }
    }
}

impl Transport for MaybeTlsStream {
    fn is_secure(&self) -> bool {
        match &self.state {
            TlsState::Raw(socket) => socket.is_local(),
            TlsState::Tls(_) => true,
            TlsState::Upgrading => false,
        }
    }

    fn supports_tls(&self) -> bool {
        match &self.state {
            // TLS over a UNIX socket is pointless; mirror the servers,
            // which only offer it on TCP.
            TlsState::Raw(socket) => !socket.is_local(),
            _ => false,
        }
    }

    fn tls_handshake<'a>(&'a mut self, options: &'a ConnectOptions) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.upgrade(options))
    }

    fn tls_shutdown(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.shutdown_tls())
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().state {
            TlsState::Raw(s) => Pin::new(s).poll_read(cx, buf),
            TlsState::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            TlsState::Upgrading => Poll::Ready(Err(broken())),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().state {
            TlsState::Raw(s) => Pin::new(s).poll_write(cx, buf),
            TlsState::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            TlsState::Upgrading => Poll::Ready(Err(broken())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().state {
            TlsState::Raw(s) => Pin::new(s).poll_flush(cx),
            TlsState::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            TlsState::Upgrading => Poll::Ready(Err(broken())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().state {
            TlsState::Raw(s) => Pin::new(s).poll_shutdown(cx),
            TlsState::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            TlsState::Upgrading => Poll::Ready(Err(broken())),
        }
    }
}

fn broken() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "stream lost during TLS upgrade")
}
