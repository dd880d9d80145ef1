/// Mailbox account models
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAP_HOST: &str = "imap.gmail.com";
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// One configured mailbox. Loaded once at startup and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub imap_host: String,
    pub imap_port: u16,
    /// Implicit TLS when true, plain TCP otherwise (port 143 style servers).
    pub secure: bool,
}

impl Account {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            imap_host: DEFAULT_IMAP_HOST.to_string(),
            imap_port: DEFAULT_IMAP_PORT,
            secure: true,
        }
    }

    pub fn with_server(mut self, host: impl Into<String>, port: u16, secure: bool) -> Self {
        self.imap_host = host.into();
        self.imap_port = port;
        self.secure = secure;
        self
    }

    /// Accounts are keyed by their mailbox address.
    pub fn id(&self) -> &str {
        &self.email
    }
}
