#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use inbox_triage::error::{ConnectionError, OracleError};
use inbox_triage::imap::{Arrival, MailboxConnector, MailboxSession, MessageRef};
use inbox_triage::models::{Account, RawMessage};
use inbox_triage::services::classifier::Classifier;
use inbox_triage::services::gemini::LanguageModel;
use inbox_triage::services::index_service::EmailIndex;
use inbox_triage::services::notification_service::{spawn_dispatcher, Alert, AlertSink};
use inbox_triage::services::pipeline::Pipeline;
use sqlx::SqlitePool;

type Answer = Box<dyn Fn(&str) -> Result<String, OracleError> + Send + Sync>;

/// Oracle whose answers are computed from the prompt.
pub struct FakeModel {
    answer: Answer,
}

impl FakeModel {
    pub fn new(answer: impl Fn(&str) -> Result<String, OracleError> + Send + Sync + 'static) -> Self {
        Self {
            answer: Box::new(answer),
        }
    }

    pub fn always(text: &'static str) -> Self {
        Self::new(move |_| Ok(text.to_string()))
    }

    pub fn down() -> Self {
        Self::new(|_| Err(OracleError::MissingApiKey))
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        (self.answer)(prompt)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, OracleError> {
        Ok(vec![text.len() as f32, 1.0])
    }
}

#[derive(Default)]
pub struct RecordingSink(pub Mutex<Vec<Alert>>);

impl RecordingSink {
    pub fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

pub struct Harness {
    pub pipeline: Pipeline,
    pub index: EmailIndex,
    pub alerts: Arc<RecordingSink>,
    pub pool: SqlitePool,
}

pub async fn harness(model: FakeModel) -> Harness {
    let pool = inbox_triage::db::connect("sqlite::memory:").await.unwrap();
    let index = EmailIndex::new(pool.clone());
    index.create_index().await.unwrap();

    let alerts = Arc::new(RecordingSink::default());
    let (notifier, _dispatcher) = spawn_dispatcher(vec![alerts.clone()]);
    let classifier = Arc::new(Classifier::new(Arc::new(model), Duration::from_secs(2)));
    Harness {
        pipeline: Pipeline::new(classifier, index.clone(), notifier),
        index,
        alerts,
        pool,
    }
}

pub fn account() -> Account {
    Account::new("me@example.com", "app-password")
}

pub fn rfc822(subject: &str, body: &str, date: DateTime<Utc>) -> Vec<u8> {
    format!(
        "From: Lead <lead@acme.test>\r\n\
         To: me@example.com\r\n\
         Subject: {subject}\r\n\
         Date: {}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         {body}\r\n",
        date.to_rfc2822()
    )
    .into_bytes()
}

pub fn raw(uid: u32, subject: &str, body: &str, date: DateTime<Utc>) -> RawMessage {
    RawMessage {
        uid,
        internal_date: Some(date),
        source: rfc822(subject, body, date),
    }
}

#[derive(Default)]
pub struct MailboxState {
    pub messages: Vec<RawMessage>,
    /// Appended to the folder the first time a backfill scan runs.
    pub arrives_during_backfill: Vec<RawMessage>,
    pub reject_auth: bool,
    pub drop_on_next_wait: bool,
    /// 1-based connect attempts that fail as unreachable.
    pub fail_connects: Vec<usize>,
    /// Backfill scans still to fail before one succeeds.
    pub failing_scans: usize,
    pub connects: usize,
    pub backfill_scans: usize,
}

/// In-memory folder shared by every session a `FakeConnector` opens.
#[derive(Clone, Default)]
pub struct FakeMailbox {
    pub state: Arc<Mutex<MailboxState>>,
    pub wake: Arc<Notify>,
}

impl FakeMailbox {
    pub fn with_messages(messages: Vec<RawMessage>) -> Self {
        let mailbox = Self::default();
        mailbox.state.lock().unwrap().messages = messages;
        mailbox
    }

    /// Simulates new mail plus the server's EXISTS push.
    pub fn deliver(&self, messages: Vec<RawMessage>) {
        self.state.lock().unwrap().messages.extend(messages);
        self.wake.notify_one();
    }

    pub fn drop_connection(&self) {
        self.state.lock().unwrap().drop_on_next_wait = true;
        self.wake.notify_one();
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn backfill_scans(&self) -> usize {
        self.state.lock().unwrap().backfill_scans
    }
}

pub struct FakeConnector(pub FakeMailbox);

#[async_trait]
impl MailboxConnector for FakeConnector {
    async fn connect(&self, _account: &Account) -> Result<Box<dyn MailboxSession>, ConnectionError> {
        let mut state = self.0.state.lock().unwrap();
        state.connects += 1;
        if state.reject_auth {
            return Err(ConnectionError::Auth("invalid credentials".into()));
        }
        if state.fail_connects.contains(&state.connects) {
            return Err(ConnectionError::Unreachable("imap.example.com".into()));
        }
        Ok(Box::new(FakeSession(self.0.clone())))
    }
}

pub struct FakeSession(FakeMailbox);

impl FakeSession {
    fn take_drop(&self) -> bool {
        std::mem::take(&mut self.0.state.lock().unwrap().drop_on_next_wait)
    }
}

#[async_trait]
impl MailboxSession for FakeSession {
    async fn fetch_since(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<RawMessage>, ConnectionError> {
        let mut state = self.0.state.lock().unwrap();
        state.backfill_scans += 1;
        if state.failing_scans > 0 {
            state.failing_scans -= 1;
            return Err(ConnectionError::Dropped("connection reset during search".into()));
        }
        let late = std::mem::take(&mut state.arrives_during_backfill);
        state.messages.extend(late);
        Ok(state
            .messages
            .iter()
            .filter(|m| m.internal_date.map_or(true, |d| d >= cutoff))
            .cloned()
            .collect())
    }

    async fn fetch_one(&mut self, reference: MessageRef) -> Result<Option<RawMessage>, ConnectionError> {
        let state = self.0.state.lock().unwrap();
        Ok(match reference {
            MessageRef::Uid(uid) => state.messages.iter().find(|m| m.uid == uid).cloned(),
            MessageRef::Latest => state.messages.iter().max_by_key(|m| m.uid).cloned(),
        })
    }

    async fn fetch_after(&mut self, cursor: u32) -> Result<Vec<RawMessage>, ConnectionError> {
        let state = self.0.state.lock().unwrap();
        let mut fresh: Vec<RawMessage> = state.messages.iter().filter(|m| m.uid > cursor).cloned().collect();
        fresh.sort_by_key(|m| m.uid);
        Ok(fresh)
    }

    async fn highest_uid(&mut self) -> Result<u32, ConnectionError> {
        Ok(self.0.state.lock().unwrap().messages.iter().map(|m| m.uid).max().unwrap_or(0))
    }

    async fn wait_for_arrival(&mut self, max_wait: Duration) -> Result<Arrival, ConnectionError> {
        if self.take_drop() {
            return Err(ConnectionError::Dropped("connection reset by peer".into()));
        }
        let wake = self.0.wake.clone();
        let arrival = match tokio::time::timeout(max_wait, wake.notified()).await {
            Ok(()) => Arrival::NewData,
            Err(_) => Arrival::Timeout,
        };
        if self.take_drop() {
            return Err(ConnectionError::Dropped("connection reset by peer".into()));
        }
        Ok(arrival)
    }

    async fn logout(&mut self) {}
}

/// Polls `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
