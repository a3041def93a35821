//! TLS upgrade via native-tls.

use native_tls::{Certificate, TlsConnector};

use crate::connection::socket::Socket;
use crate::connection::{ConnectOptions, ServerAddress};
use crate::error::{Error, Result};

pub(crate) async fn handshake(
    socket: Socket,
    options: &ConnectOptions,
) -> Result<tokio_native_tls::TlsStream<Socket>> {
    let mut builder = TlsConnector::builder();

    // Without a CA the upgrade encrypts but does not authenticate the
    // peer; with one, full verification is enabled.
    let verify = options.ssl_ca.is_some();
    builder
        .danger_accept_invalid_certs(!verify)
        .danger_accept_invalid_hostnames(!verify);

    if let Some(ca) = &options.ssl_ca {
        let data = tokio::fs::read(ca).await?;
        let cert = Certificate::from_pem(&data).map_err(Error::tls)?;
        builder.add_root_certificate(cert);
    }

    let connector = tokio_native_tls::TlsConnector::from(builder.build().map_err(Error::tls)?);

    let host = match &options.address {
        ServerAddress::Tcp { host, .. } => host.as_str(),
        ServerAddress::Unix { .. } => "localhost",
    };

    connector.connect(host, socket).await.map_err(Error::tls)
}
