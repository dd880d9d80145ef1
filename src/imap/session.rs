/// Mailbox session abstraction and its IMAP implementation
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use std::time::Duration;

use super::conn::{self, bounded, ImapSession};
use crate::error::ConnectionError;
use crate::models::message::INBOX;
use crate::models::{Account, RawMessage};

/// UIDs per `UID FETCH` round trip.
const FETCH_CHUNK: usize = 50;
const FETCH_ITEMS: &str = "(UID INTERNALDATE BODY.PEEK[])";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRef {
    Uid(u32),
    /// Whatever message currently sits at `*` in the folder.
    Latest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// The server pushed an update (usually EXISTS) while idling.
    NewData,
    /// Nothing arrived before `max_wait`; callers drain anyway and re-idle.
    Timeout,
}

/// One authenticated connection to the primary folder of one mailbox.
#[async_trait]
pub trait MailboxSession: Send {
    /// Messages received on or after `cutoff`, ascending by UID.
    async fn fetch_since(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<RawMessage>, ConnectionError>;

    async fn fetch_one(&mut self, reference: MessageRef) -> Result<Option<RawMessage>, ConnectionError>;

    /// Every message with a UID above `cursor`, ascending.
    async fn fetch_after(&mut self, cursor: u32) -> Result<Vec<RawMessage>, ConnectionError>;

    /// Largest UID currently in the folder, 0 when empty.
    async fn highest_uid(&mut self) -> Result<u32, ConnectionError>;

    /// Blocks until the server signals a change or `max_wait` elapses.
    async fn wait_for_arrival(&mut self, max_wait: Duration) -> Result<Arrival, ConnectionError>;

    async fn logout(&mut self);
}

/// Opens sessions; the orchestrator reconnects through this.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    async fn connect(&self, account: &Account) -> Result<Box<dyn MailboxSession>, ConnectionError>;
}

pub struct ImapConnector {
    pub network_timeout: Duration,
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn connect(&self, account: &Account) -> Result<Box<dyn MailboxSession>, ConnectionError> {
        let mailbox = ImapMailbox::open(account, self.network_timeout).await?;
        Ok(Box::new(mailbox))
    }
}

pub struct ImapMailbox {
    // Taken out while idling since IDLE consumes the session.
    session: Option<ImapSession>,
    email: String,
    limit: Duration,
}

impl ImapMailbox {
    pub async fn open(account: &Account, limit: Duration) -> Result<Self, ConnectionError> {
        let mut session = conn::connect(account, limit).await?;
        let mailbox = bounded(limit, "select", async {
            session.select(INBOX).await.map_err(ConnectionError::from)
        })
        .await?;
        tracing::info!(email=%account.email, exists = mailbox.exists, "selected {INBOX}");
        Ok(Self {
            session: Some(session),
            email: account.email.clone(),
            limit,
        })
    }

    fn session(&mut self) -> Result<&mut ImapSession, ConnectionError> {
        self.session
            .as_mut()
            .ok_or_else(|| ConnectionError::Dropped("session lost during IDLE".into()))
    }

    async fn uid_search(&mut self, query: String) -> Result<Vec<u32>, ConnectionError> {
        let limit = self.limit;
        let session = self.session()?;
        let uids = bounded(limit, "uid search", async {
            session.uid_search(&query).await.map_err(ConnectionError::from)
        })
        .await?;
        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch_set(&mut self, set: &str) -> Result<Vec<RawMessage>, ConnectionError> {
        let limit = self.limit;
        let session = self.session()?;
        let fetches = bounded(limit, "uid fetch", async {
            let stream = session
                .uid_fetch(set, FETCH_ITEMS)
                .await
                .map_err(ConnectionError::from)?;
            stream
                .try_collect::<Vec<_>>()
                .await
                .map_err(ConnectionError::from)
        })
        .await?;

        let mut out: Vec<RawMessage> = fetches
            .iter()
            .filter_map(|f| {
                let uid = f.uid?;
                let source = f.body()?.to_vec();
                Some(RawMessage {
                    uid,
                    internal_date: f.internal_date().map(|d| d.with_timezone(&Utc)),
                    source,
                })
            })
            .collect();
        out.sort_by_key(|m| m.uid);
        Ok(out)
    }

    async fn fetch_uids(&mut self, uids: &[u32]) -> Result<Vec<RawMessage>, ConnectionError> {
        let mut out = Vec::with_capacity(uids.len());
        for chunk in uids.chunks(FETCH_CHUNK) {
            let set = chunk
                .iter()
                .map(|u| u.to_string())
                .collect::<Vec<_>>()
                .join(",");
            out.extend(self.fetch_set(&set).await?);
        }
        Ok(out)
    }
}

#[async_trait]
impl MailboxSession for ImapMailbox {
    async fn fetch_since(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<RawMessage>, ConnectionError> {
        let uids = self.uid_search(format!("SINCE {}", imap_date(cutoff))).await?;
        tracing::debug!(email=%self.email, count = uids.len(), "backfill search matched");
        self.fetch_uids(&uids).await
    }

    async fn fetch_one(&mut self, reference: MessageRef) -> Result<Option<RawMessage>, ConnectionError> {
        match reference {
            MessageRef::Uid(uid) => Ok(self.fetch_set(&uid.to_string()).await?.into_iter().next()),
            MessageRef::Latest => {
                let top = self.highest_uid().await?;
                if top == 0 {
                    return Ok(None);
                }
                Ok(self.fetch_set(&top.to_string()).await?.into_iter().next())
            }
        }
    }

    async fn fetch_after(&mut self, cursor: u32) -> Result<Vec<RawMessage>, ConnectionError> {
        // `n:*` always includes the last message, even below n.
        let uids: Vec<u32> = self
            .uid_search(format!("UID {}:*", cursor.saturating_add(1)))
            .await?
            .into_iter()
            .filter(|u| *u > cursor)
            .collect();
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_uids(&uids).await
    }

    async fn highest_uid(&mut self) -> Result<u32, ConnectionError> {
        Ok(self.uid_search("ALL".into()).await?.last().copied().unwrap_or(0))
    }

    async fn wait_for_arrival(&mut self, max_wait: Duration) -> Result<Arrival, ConnectionError> {
        let session = self
            .session
            .take()
            .ok_or_else(|| ConnectionError::Dropped("session lost during IDLE".into()))?;
        let limit = self.limit;

        let mut idle = session.idle();
        bounded(limit, "idle init", async { idle.init().await.map_err(ConnectionError::from) }).await?;

        let arrival = {
            let (wait, _stop) = idle.wait();
            match tokio::time::timeout(max_wait, wait).await {
                Ok(Ok(_)) => Arrival::NewData,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => Arrival::Timeout,
            }
        };

        let session = bounded(limit, "idle done", async { idle.done().await.map_err(ConnectionError::from) }).await?;
        self.session = Some(session);
        Ok(arrival)
    }

    async fn logout(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = tokio::time::timeout(self.limit, session.logout()).await;
        }
    }
}

/// IMAP SEARCH date, e.g. `19-Sep-2026`.
pub fn imap_date(date: DateTime<Utc>) -> String {
    date.format("%d-%b-%Y").to_string()
}
