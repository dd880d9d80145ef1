use thiserror::Error;

/// Failure to establish or keep an IMAP session for one account.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("host unreachable: {0}")]
    Unreachable(String),

    #[error("TLS handshake failed: {0}")]
    Tls(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("IMAP command failed: {0}")]
    Protocol(String),

    #[error("timed out during {0}")]
    Timeout(&'static str),

    #[error("connection dropped: {0}")]
    Dropped(String),
}

impl ConnectionError {
    /// Auth failures won't fix themselves, everything else is worth a reconnect.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ConnectionError::Auth(_))
    }
}

impl From<async_imap::error::Error> for ConnectionError {
    fn from(e: async_imap::error::Error) -> Self {
        match e {
            async_imap::error::Error::Io(io) => ConnectionError::Dropped(io.to_string()),
            async_imap::error::Error::ConnectionLost => {
                ConnectionError::Dropped("connection lost".into())
            }
            other => ConnectionError::Protocol(other.to_string()),
        }
    }
}

/// Failure of a call to the hosted language model.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("GEMINI_API_KEY is not configured")]
    MissingApiKey,

    #[error("oracle call timed out")]
    Timeout,

    #[error("oracle transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("oracle returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("oracle returned no usable content")]
    EmptyResponse,
}
