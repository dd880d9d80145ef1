/// Deduplicating email index on top of SQLite
use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::models::{Category, ClassifiedMessage, IndexedRecord};

/// Cap on listing/search results served to the UI.
pub const MAX_LISTING: i64 = 50;

#[derive(Clone)]
pub struct EmailIndex {
    pool: SqlitePool,
}

#[derive(Debug, FromRow)]
struct EmailRow {
    id: String,
    subject: String,
    body: String,
    from_addr: String,
    to_addr: String,
    received_at: i64,
    category: String,
    account_id: String,
    folder: String,
}

impl EmailRow {
    fn into_record(self) -> IndexedRecord {
        IndexedRecord {
            received_at: DateTime::from_timestamp(self.received_at, 0).unwrap_or_default(),
            category: Category::from_name(&self.category).unwrap_or(Category::Other),
            id: self.id,
            subject: self.subject,
            body: self.body,
            from: self.from_addr,
            to: self.to_addr,
            account_id: self.account_id,
            folder: self.folder,
        }
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, subject, body, from_addr, to_addr, received_at, category, account_id, folder FROM emails";

/// `{account}-{base64url(subject + RFC 3339 date)}`. Same physical message,
/// same id, whichever path saw it.
pub fn stable_id(account_id: &str, subject: &str, received_at: DateTime<Utc>) -> String {
    let key = format!(
        "{}{}",
        subject,
        received_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    format!(
        "{}-{}",
        account_id,
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(key.as_bytes())
    )
}

impl EmailIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_index(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS emails (
                id TEXT PRIMARY KEY NOT NULL,
                subject TEXT NOT NULL,
                body TEXT NOT NULL,
                from_addr TEXT NOT NULL,
                to_addr TEXT NOT NULL,
                received_at INTEGER NOT NULL,
                category TEXT NOT NULL,
                account_id TEXT NOT NULL,
                folder TEXT NOT NULL,
                indexed_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("create emails table")?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_emails_received_at ON emails(received_at DESC)")
            .execute(&self.pool)
            .await
            .context("create received_at index")?;
        Ok(())
    }

    /// Create-or-replace keyed by the stable id. Idempotent.
    pub async fn upsert(&self, classified: &ClassifiedMessage) -> Result<IndexedRecord> {
        let m = &classified.message;
        let id = stable_id(&m.account_id, &m.subject, m.received_at);

        sqlx::query(
            r#"
            INSERT INTO emails (id, subject, body, from_addr, to_addr, received_at, category, account_id, folder)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                subject = excluded.subject,
                body = excluded.body,
                from_addr = excluded.from_addr,
                to_addr = excluded.to_addr,
                received_at = excluded.received_at,
                category = excluded.category,
                account_id = excluded.account_id,
                folder = excluded.folder,
                indexed_at = strftime('%s','now')
            "#,
        )
        .bind(&id)
        .bind(&m.subject)
        .bind(&m.body)
        .bind(&m.from)
        .bind(&m.to)
        .bind(m.received_at.timestamp())
        .bind(classified.category.as_str())
        .bind(&m.account_id)
        .bind(&m.folder)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert email {id}"))?;

        tracing::debug!(id=%id, subject=%m.subject, category=%classified.category, "indexed email");
        Ok(IndexedRecord::from_classified(id, classified))
    }

    /// Newest first, at most `limit`. Store failures come back as an empty list.
    pub async fn query_recent(&self, limit: i64) -> Vec<IndexedRecord> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY received_at DESC, id ASC LIMIT ?");
        match sqlx::query_as::<_, EmailRow>(&sql)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows.into_iter().map(EmailRow::into_record).collect(),
            Err(e) => {
                tracing::error!(error=%e, "failed to list emails from index");
                Vec::new()
            }
        }
    }

    /// Case-insensitive text match over subject, body and sender, optionally
    /// restricted to one category.
    pub async fn search(&self, text: Option<&str>, category: Option<Category>, limit: i64) -> Vec<IndexedRecord> {
        let pattern = text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| format!("%{}%", escape_like(&t.to_lowercase())));

        let sql = format!(
            "{SELECT_COLUMNS} \
             WHERE (?1 IS NULL OR lower(subject) LIKE ?1 ESCAPE '\\' OR lower(body) LIKE ?1 ESCAPE '\\' OR lower(from_addr) LIKE ?1 ESCAPE '\\') \
             AND (?2 IS NULL OR category = ?2) \
             ORDER BY received_at DESC, id ASC LIMIT ?3"
        );
        match sqlx::query_as::<_, EmailRow>(&sql)
            .bind(pattern)
            .bind(category.map(|c| c.as_str()))
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows.into_iter().map(EmailRow::into_record).collect(),
            Err(e) => {
                tracing::error!(error=%e, "email search failed");
                Vec::new()
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<IndexedRecord>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?");
        let row = sqlx::query_as::<_, EmailRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(EmailRow::into_record))
    }

    pub async fn count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM emails")
            .fetch_one(&self.pool)
            .await?)
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NormalizedMessage;
    use chrono::TimeZone;

    async fn index() -> EmailIndex {
        let pool = crate::db::connect("sqlite::memory:").await.unwrap();
        let index = EmailIndex::new(pool);
        index.create_index().await.unwrap();
        index
    }

    fn classified(subject: &str, day: u32, category: Category) -> ClassifiedMessage {
        ClassifiedMessage {
            message: NormalizedMessage {
                subject: subject.into(),
                body: format!("body of {subject}"),
                from: "Lead <lead@acme.test>".into(),
                to: "me@example.com".into(),
                received_at: Utc.with_ymd_and_hms(2026, 10, day, 9, 0, 0).unwrap(),
                account_id: "me@example.com".into(),
                folder: "INBOX".into(),
            },
            category,
        }
    }

    #[test]
    fn stable_id_is_deterministic_and_account_scoped() {
        let at = Utc.with_ymd_and_hms(2026, 10, 2, 9, 0, 0).unwrap();
        let a = stable_id("me@example.com", "Hello", at);
        assert_eq!(a, stable_id("me@example.com", "Hello", at));
        assert!(a.starts_with("me@example.com-"));
        assert_ne!(a, stable_id("other@example.com", "Hello", at));
        assert_ne!(a, stable_id("me@example.com", "Hello!", at));
        assert_ne!(a, stable_id("me@example.com", "Hello", at + chrono::Duration::seconds(1)));
    }

    #[tokio::test]
    async fn upsert_twice_keeps_one_record() {
        let index = index().await;
        let msg = classified("Pricing", 2, Category::Interested);
        let first = index.upsert(&msg).await.unwrap();
        let second = index.upsert(&msg).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(index.count().await.unwrap(), 1);
        let stored = index.get(&first.id).await.unwrap();
        assert_eq!(stored, Some(first));
    }

    #[tokio::test]
    async fn upsert_replaces_previous_content() {
        let index = index().await;
        let id = index.upsert(&classified("Pricing", 2, Category::Other)).await.unwrap().id;
        index.upsert(&classified("Pricing", 2, Category::Spam)).await.unwrap();
        assert_eq!(index.get(&id).await.unwrap().unwrap().category, Category::Spam);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_recent_is_newest_first_and_bounded() {
        let index = index().await;
        for day in 1..=5 {
            index.upsert(&classified(&format!("m{day}"), day, Category::Other)).await.unwrap();
        }
        let recent = index.query_recent(3).await;
        let subjects: Vec<_> = recent.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(subjects, vec!["m5", "m4", "m3"]);
    }

    #[tokio::test]
    async fn query_recent_swallows_store_errors() {
        let pool = crate::db::connect("sqlite::memory:").await.unwrap();
        let index = EmailIndex::new(pool);
        // table never created
        assert!(index.query_recent(50).await.is_empty());
    }

    #[tokio::test]
    async fn search_filters_by_text_and_category() {
        let index = index().await;
        index.upsert(&classified("Demo next week", 1, Category::MeetingBooked)).await.unwrap();
        index.upsert(&classified("70% off today", 2, Category::Spam)).await.unwrap();
        index.upsert(&classified("Demo follow-up", 3, Category::Interested)).await.unwrap();

        let demos = index.search(Some("DEMO"), None, 50).await;
        assert_eq!(demos.len(), 2);
        assert_eq!(demos[0].subject, "Demo follow-up");

        let booked = index.search(Some("demo"), Some(Category::MeetingBooked), 50).await;
        assert_eq!(booked.len(), 1);

        let literal_percent = index.search(Some("70%"), None, 50).await;
        assert_eq!(literal_percent.len(), 1);

        assert_eq!(index.search(None, None, 50).await.len(), 3);
    }
}
