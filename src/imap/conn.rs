use async_imap::Session;
use futures::io::{AsyncRead, AsyncWrite};
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncReadCompatExt;

use crate::error::ConnectionError;
use crate::models::Account;

/// Transport under an IMAP session, TLS or plain.
pub trait ImapStream: AsyncRead + AsyncWrite + Unpin + Send + Debug {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send + Debug> ImapStream for T {}

pub type ImapSession = Session<Box<dyn ImapStream>>;

/// Runs one network step under `limit`, mapping elapsed time to `Timeout(step)`.
pub async fn bounded<T, F>(limit: Duration, step: &'static str, fut: F) -> Result<T, ConnectionError>
where
    F: Future<Output = Result<T, ConnectionError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(ConnectionError::Timeout(step)),
    }
}

/// Connects, logs in and returns an authenticated session. Each failure
/// stage maps to its own `ConnectionError` variant.
pub async fn connect(account: &Account, limit: Duration) -> Result<ImapSession, ConnectionError> {
    let host = account.imap_host.as_str();

    let tcp = bounded(limit, "tcp connect", async {
        TcpStream::connect((host, account.imap_port))
            .await
            .map_err(|e| ConnectionError::Unreachable(format!("{host}:{}: {e}", account.imap_port)))
    })
    .await?;

    let stream: Box<dyn ImapStream> = if account.secure {
        let tls = native_tls::TlsConnector::builder()
            .build()
            .map_err(|e| ConnectionError::Tls(e.to_string()))?;
        let tls = tokio_native_tls::TlsConnector::from(tls);
        let tls_stream = bounded(limit, "tls handshake", async {
            tls.connect(host, tcp)
                .await
                .map_err(|e| ConnectionError::Tls(e.to_string()))
        })
        .await?;
        Box::new(tls_stream.compat())
    } else {
        Box::new(tcp.compat())
    };

    let client = async_imap::Client::new(stream);
    let session = bounded(limit, "login", async {
        client
            .login(&account.email, &account.password)
            .await
            .map_err(|(e, _)| ConnectionError::Auth(e.to_string()))
    })
    .await?;

    tracing::debug!(email=%account.email, host=%host, secure=account.secure, "imap session authenticated");
    Ok(session)
}
