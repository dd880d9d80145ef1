use anyhow::Result;
use std::sync::Arc;

use crate::imap::parse;
use crate::models::{Account, Category, ClassifiedMessage, IndexedRecord, RawMessage};
use crate::services::classifier::Classifier;
use crate::services::index_service::EmailIndex;
use crate::services::notification_service::Notifier;

/// normalize → classify → upsert → notify, for one message at a time.
#[derive(Clone)]
pub struct Pipeline {
    pub classifier: Arc<Classifier>,
    pub index: EmailIndex,
    pub notifier: Notifier,
}

impl Pipeline {
    pub fn new(classifier: Arc<Classifier>, index: EmailIndex, notifier: Notifier) -> Self {
        Self {
            classifier,
            index,
            notifier,
        }
    }

    /// Classification never fails; only the store write can. The alert is
    /// only raised once the record is durable.
    pub async fn process(
        &self,
        raw: &RawMessage,
        account: &Account,
        folder: &str,
        fallback: Category,
    ) -> Result<IndexedRecord> {
        let message = parse::normalize(raw, account, folder);
        let category = self
            .classifier
            .classify(&message.subject, &message.body, fallback)
            .await;
        let classified = ClassifiedMessage { message, category };
        let record = self.index.upsert(&classified).await?;
        self.notifier.notify(&classified);
        Ok(record)
    }
}
