/// Lead alerts - queue + background dispatcher fanning out to webhooks
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::models::{Category, ClassifiedMessage};

pub const QUEUE_CAPACITY: usize = 256;

/// One outbound lead notification.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub text: String,
    pub payload: serde_json::Value,
}

impl Alert {
    pub fn from_classified(classified: &ClassifiedMessage) -> Self {
        let m = &classified.message;
        let text = format!(
            "*New Interested Lead!*\n*Subject:* {}\n*From:* {}\n*Date:* {}\nCategory: *{}*",
            m.subject,
            m.from,
            m.received_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            classified.category
        );
        let payload = json!({
            "event": "InterestedLead",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "emailData": {
                "subject": m.subject,
                "body": m.body,
                "from": m.from,
                "aiCategory": classified.category,
                "date": m.received_at,
            }
        });
        Self { text, payload }
    }
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, alert: &Alert) -> Result<()>;
}

pub struct SlackSink {
    http: Client,
    url: String,
}

impl SlackSink {
    pub fn new(http: Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl AlertSink for SlackSink {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        self.http
            .post(&self.url)
            .json(&json!({ "text": alert.text }))
            .send()
            .await
            .context("slack webhook request")?
            .error_for_status()
            .context("slack webhook status")?;
        Ok(())
    }
}

pub struct WebhookSink {
    http: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(http: Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        self.http
            .post(&self.url)
            .json(&alert.payload)
            .send()
            .await
            .context("automation webhook request")?
            .error_for_status()
            .context("automation webhook status")?;
        Ok(())
    }
}

/// Sinks for whichever webhook URLs are configured.
pub fn sinks_from_settings(settings: &Settings) -> Result<Vec<Arc<dyn AlertSink>>> {
    let http = Client::builder()
        .timeout(settings.network_timeout)
        .build()
        .context("build webhook client")?;
    let mut sinks: Vec<Arc<dyn AlertSink>> = Vec::new();
    if let Some(url) = &settings.slack_webhook_url {
        sinks.push(Arc::new(SlackSink::new(http.clone(), url.clone())));
    }
    if let Some(url) = &settings.webhook_site_url {
        sinks.push(Arc::new(WebhookSink::new(http, url.clone())));
    }
    if sinks.is_empty() {
        tracing::info!("no alert webhooks configured, lead alerts will only be logged");
    }
    Ok(sinks)
}

/// Producer half. Cheap to clone, never blocks, never fails.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Alert>,
}

impl Notifier {
    pub fn notify(&self, classified: &ClassifiedMessage) {
        if classified.category != Category::Interested {
            return;
        }
        let alert = Alert::from_classified(classified);
        match self.tx.try_send(alert) {
            Ok(()) => tracing::debug!(subject=%classified.message.subject, "lead alert queued"),
            Err(e) => tracing::warn!(subject=%classified.message.subject, error=%e, "dropping lead alert"),
        }
    }
}

/// Builds the queue and spawns the dispatcher that drains it.
pub fn spawn_dispatcher(sinks: Vec<Arc<dyn AlertSink>>) -> (Notifier, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Alert>(QUEUE_CAPACITY);
    let handle = tokio::spawn(async move {
        while let Some(alert) = rx.recv().await {
            for sink in &sinks {
                if let Err(e) = sink.deliver(&alert).await {
                    tracing::error!(sink = sink.name(), error=%e, "alert delivery failed");
                }
            }
            tracing::info!(text=%alert.text, "lead alert dispatched");
        }
        tracing::debug!("alert queue closed, dispatcher exiting");
    });
    (Notifier { tx }, handle)
}
