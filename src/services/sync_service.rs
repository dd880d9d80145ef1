/// Per-account ingestion: backfill once, then IDLE-driven live sync
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::AbortHandle;

use crate::config::Settings;
use crate::error::ConnectionError;
use crate::imap::{Arrival, MailboxConnector, MailboxSession};
use crate::models::message::INBOX;
use crate::models::{Account, Category, RawMessage};
use crate::services::pipeline::Pipeline;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub backfill_days: i64,
    /// Servers drop IDLE after 30 minutes, so re-issue before that.
    pub idle_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            backfill_days: 30,
            idle_timeout: Duration::from_secs(29 * 60),
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl SyncOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            backfill_days: settings.backfill_days,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    Idle,
    Connecting,
    Backfilling,
    Listening,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncEvent {
    pub account_id: String,
    pub event_type: SyncEventType,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SyncEventType {
    StateChanged { state: AccountState },
    Indexed { id: String, subject: String, category: Category },
    MessageFailed { uid: u32, message: String },
    ConnectionLost { message: String },
    BackfillComplete { processed: usize, failed: usize },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    pub account_id: String,
    pub state: AccountState,
    pub last_error: Option<String>,
    pub indexed: u64,
}

type StatusMap = Arc<RwLock<HashMap<String, AccountStatus>>>;

pub struct SyncManager {
    status: StatusMap,
    event_tx: broadcast::Sender<SyncEvent>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl Default for SyncManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncManager {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            status: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawns one independent task per account. Returns immediately.
    pub async fn start(
        &self,
        accounts: Vec<Account>,
        connector: Arc<dyn MailboxConnector>,
        pipeline: Pipeline,
        options: SyncOptions,
    ) {
        if accounts.is_empty() {
            tracing::warn!("no mailbox accounts configured (EMAIL_USER_n / EMAIL_PASS_n), ingestion disabled");
            return;
        }

        let mut tasks = self.tasks.lock().await;
        for account in accounts {
            {
                let mut status = self.status.write().await;
                if status.contains_key(account.id()) {
                    tracing::warn!(email=%account.email, "account listed twice, ignoring duplicate");
                    continue;
                }
                status.insert(
                    account.id().to_string(),
                    AccountStatus {
                        account_id: account.id().to_string(),
                        state: AccountState::Idle,
                        last_error: None,
                        indexed: 0,
                    },
                );
            }

            tracing::info!(email=%account.email, host=%account.imap_host, "starting account sync");
            let worker = AccountWorker {
                account,
                connector: connector.clone(),
                pipeline: pipeline.clone(),
                backoff: options.initial_backoff,
                options: options.clone(),
                status: self.status.clone(),
                events: self.event_tx.clone(),
                cursor: 0,
                backfilled: false,
            };
            tasks.push(tokio::spawn(worker.run()).abort_handle());
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Snapshot of every account, ordered by account id.
    pub async fn statuses(&self) -> Vec<AccountStatus> {
        let mut all: Vec<AccountStatus> = self.status.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        all
    }

    pub async fn state_of(&self, account_id: &str) -> Option<AccountState> {
        self.status.read().await.get(account_id).map(|s| s.state)
    }

    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        tracing::info!("account sync tasks stopped");
    }
}

struct AccountWorker {
    account: Account,
    connector: Arc<dyn MailboxConnector>,
    pipeline: Pipeline,
    options: SyncOptions,
    status: StatusMap,
    events: broadcast::Sender<SyncEvent>,
    backoff: Duration,
    /// Highest UID handed to the pipeline on the live path.
    cursor: u32,
    backfilled: bool,
}

impl AccountWorker {
    async fn run(mut self) {
        loop {
            self.set_state(AccountState::Connecting).await;
            let err = match self.run_session().await {
                Ok(()) => {
                    self.backoff = self.options.initial_backoff;
                    continue;
                }
                Err(e) => e,
            };

            self.record_error(&err).await;
            if !err.is_retryable() {
                tracing::error!(email=%self.account.email, error=%err, "giving up on account");
                self.set_state(AccountState::Idle).await;
                return;
            }

            tracing::warn!(
                email=%self.account.email,
                error=%err,
                backoff_secs = self.backoff.as_secs(),
                "mailbox session failed, reconnecting"
            );
            self.publish(SyncEventType::ConnectionLost {
                message: err.to_string(),
            });
            tokio::time::sleep(self.backoff).await;
            self.backoff = (self.backoff * 2).min(self.options.max_backoff);
        }
    }

    async fn run_session(&mut self) -> Result<(), ConnectionError> {
        let mut live = self.connector.connect(&self.account).await?;
        self.backoff = self.options.initial_backoff;

        if !self.backfilled {
            self.set_state(AccountState::Backfilling).await;
            self.cursor = live.highest_uid().await?;
            if let Err(e) = self.backfill().await {
                tracing::error!(email=%self.account.email, error=%e, "backfill failed");
                live.logout().await;
                return Err(e);
            }
        }

        self.set_state(AccountState::Listening).await;
        let result = self.listen(live.as_mut()).await;
        live.logout().await;
        result
    }

    /// Scans the recent window on its own connection. Only a successful
    /// fetch marks the backfill done; connection failures go back to the
    /// reconnect loop so the window is retried.
    async fn backfill(&mut self) -> Result<(), ConnectionError> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(self.options.backfill_days);
        let mut session = self.connector.connect(&self.account).await?;

        let fetched = session.fetch_since(cutoff).await;
        session.logout().await;
        let messages = fetched?;
        self.backfilled = true;

        tracing::info!(email=%self.account.email, count = messages.len(), %cutoff, "backfilling");
        let mut failed = 0;
        for raw in &messages {
            if !self.ingest(raw).await {
                failed += 1;
            }
        }
        tracing::info!(email=%self.account.email, processed = messages.len(), failed, "backfill complete");
        self.publish(SyncEventType::BackfillComplete {
            processed: messages.len(),
            failed,
        });
        Ok(())
    }

    async fn listen(&mut self, session: &mut dyn MailboxSession) -> Result<(), ConnectionError> {
        // arrivals during backfill
        self.drain(session).await?;
        loop {
            match session.wait_for_arrival(self.options.idle_timeout).await? {
                Arrival::NewData => tracing::debug!(email=%self.account.email, "mailbox changed"),
                Arrival::Timeout => tracing::trace!(email=%self.account.email, "IDLE timeout, re-issuing"),
            }
            self.drain(session).await?;
        }
    }

    async fn drain(&mut self, session: &mut dyn MailboxSession) -> Result<(), ConnectionError> {
        let fresh = session.fetch_after(self.cursor).await?;
        if !fresh.is_empty() {
            tracing::info!(email=%self.account.email, count = fresh.len(), cursor = self.cursor, "new messages");
        }
        for raw in &fresh {
            self.ingest(raw).await;
            self.cursor = self.cursor.max(raw.uid);
        }
        Ok(())
    }

    async fn ingest(&self, raw: &RawMessage) -> bool {
        match self
            .pipeline
            .process(raw, &self.account, INBOX, Category::Other)
            .await
        {
            Ok(record) => {
                if let Some(s) = self.status.write().await.get_mut(self.account.id()) {
                    s.indexed += 1;
                }
                self.publish(SyncEventType::Indexed {
                    id: record.id,
                    subject: record.subject,
                    category: record.category,
                });
                true
            }
            Err(e) => {
                tracing::error!(email=%self.account.email, uid = raw.uid, error=%e, "failed to index message");
                self.publish(SyncEventType::MessageFailed {
                    uid: raw.uid,
                    message: e.to_string(),
                });
                false
            }
        }
    }

    async fn set_state(&self, state: AccountState) {
        if let Some(s) = self.status.write().await.get_mut(self.account.id()) {
            if s.state == state {
                return;
            }
            s.state = state;
        }
        tracing::debug!(email=%self.account.email, ?state, "account state");
        self.publish(SyncEventType::StateChanged { state });
    }

    async fn record_error(&self, err: &ConnectionError) {
        if let Some(s) = self.status.write().await.get_mut(self.account.id()) {
            s.last_error = Some(err.to_string());
        }
    }

    fn publish(&self, event_type: SyncEventType) {
        // no subscribers is fine
        let _ = self.events.send(SyncEvent {
            account_id: self.account.id().to_string(),
            event_type,
            timestamp: chrono::Utc::now().timestamp(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = SyncEvent {
            account_id: "me@example.com".into(),
            event_type: SyncEventType::StateChanged {
                state: AccountState::Listening,
            },
            timestamp: 0,
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["event_type"]["type"], "state_changed");
        assert_eq!(v["event_type"]["state"], "listening");
    }

    #[test]
    fn status_uses_camel_case_keys() {
        let status = AccountStatus {
            account_id: "me@example.com".into(),
            state: AccountState::Idle,
            last_error: None,
            indexed: 3,
        };
        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v["accountId"], "me@example.com");
        assert_eq!(v["lastError"], serde_json::Value::Null);
        assert_eq!(v["indexed"], 3);
    }

    #[test]
    fn default_backoff_matches_idle_reconnect_policy() {
        let o = SyncOptions::default();
        assert_eq!(o.initial_backoff, Duration::from_secs(5));
        assert_eq!(o.max_backoff, Duration::from_secs(300));
        assert!(o.idle_timeout < Duration::from_secs(30 * 60));
    }
}
