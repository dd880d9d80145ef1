/// Embedded reply context, searched by cosine similarity
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::services::gemini::LanguageModel;

/// Entries joined into a reply prompt.
pub const CONTEXT_RESULTS: usize = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct ContextEntry {
    pub topic: String,
    pub content: String,
}

struct Embedded {
    entry: ContextEntry,
    vector: Vec<f32>,
}

pub struct KnowledgeBase {
    model: Arc<dyn LanguageModel>,
    entries: RwLock<Vec<Embedded>>,
}

impl KnowledgeBase {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn load_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read knowledge base {}", path.display()))?;
        let entries: Vec<ContextEntry> =
            serde_json::from_str(&raw).with_context(|| format!("parse knowledge base {}", path.display()))?;
        Ok(self.load(entries).await)
    }

    /// Embeds and stores entries, returning how many made it in. Entries the
    /// oracle cannot embed are skipped.
    pub async fn load(&self, entries: Vec<ContextEntry>) -> usize {
        let mut embedded = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.model.embed(&entry.content).await {
                Ok(vector) => {
                    tracing::debug!(topic=%entry.topic, dims = vector.len(), "embedded context entry");
                    embedded.push(Embedded { entry, vector });
                }
                Err(e) => tracing::warn!(topic=%entry.topic, error=%e, "skipping context entry"),
            }
        }
        let count = embedded.len();
        self.entries.write().await.extend(embedded);
        count
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Contents of the nearest entries, blank-line separated. Empty when
    /// nothing is loaded or the query cannot be embedded.
    pub async fn relevant_context(&self, query: &str) -> String {
        if self.is_empty().await {
            return String::new();
        }
        let query_vec = match self.model.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error=%e, "could not embed reply query");
                return String::new();
            }
        };

        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &ContextEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(&query_vec, &e.vector), &e.entry))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored
            .into_iter()
            .take(CONTEXT_RESULTS)
            .map(|(_, e)| e.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// 0.0 for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use async_trait::async_trait;

    /// Embeds by keyword presence: [pricing, meeting, vacation].
    struct Keywords;

    #[async_trait]
    impl LanguageModel for Keywords {
        async fn generate(&self, _prompt: &str) -> Result<String, OracleError> {
            Err(OracleError::EmptyResponse)
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, OracleError> {
            let t = text.to_lowercase();
            if t.contains("unembeddable") {
                return Err(OracleError::EmptyResponse);
            }
            Ok(["price", "meeting", "vacation"]
                .iter()
                .map(|k| if t.contains(k) { 1.0 } else { 0.01 })
                .collect())
        }
    }

    fn entry(topic: &str, content: &str) -> ContextEntry {
        ContextEntry {
            topic: topic.into(),
            content: content.into(),
        }
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn returns_two_nearest_entries() {
        let kb = KnowledgeBase::new(Arc::new(Keywords));
        let loaded = kb
            .load(vec![
                entry("pricing", "Our price is $49."),
                entry("meeting", "Book a meeting at cal.com."),
                entry("ooo", "On vacation until Monday."),
                entry("broken", "unembeddable"),
            ])
            .await;
        assert_eq!(loaded, 3);

        let ctx = kb.relevant_context("What is the price? Can we set up a meeting?").await;
        let parts: Vec<_> = ctx.split("\n\n").collect();
        assert_eq!(parts.len(), 2);
        assert!(parts.contains(&"Our price is $49."));
        assert!(parts.contains(&"Book a meeting at cal.com."));
    }

    #[tokio::test]
    async fn empty_base_yields_empty_context() {
        let kb = KnowledgeBase::new(Arc::new(Keywords));
        assert_eq!(kb.relevant_context("price").await, "");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let kb = KnowledgeBase::new(Arc::new(Keywords));
        assert!(kb.load_file("does/not/exist.json").await.is_err());
    }
}
