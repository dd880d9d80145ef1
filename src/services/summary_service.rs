use std::sync::Arc;

use crate::error::OracleError;
use crate::services::gemini::LanguageModel;

pub const SUMMARY_FAILED: &str = "Failed to generate summary.";
pub const SUMMARY_EMPTY: &str = "No summary available.";

pub struct SummaryService {
    model: Arc<dyn LanguageModel>,
}

impl SummaryService {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Two or three sentences; oracle trouble degrades to a fixed message.
    pub async fn summarize(&self, subject: &str, body: &str) -> String {
        let prompt = format!(
            "You are an AI assistant that summarizes emails clearly and concisely.\n\
             Summarize the following email in 2-3 sentences:\n\
             Subject: {subject}\n\
             Body: {body}\n"
        );
        match self.model.generate(&prompt).await {
            Ok(summary) => summary,
            Err(OracleError::EmptyResponse) => SUMMARY_EMPTY.to_string(),
            Err(e) => {
                tracing::error!(error=%e, "summary generation failed");
                SUMMARY_FAILED.to_string()
            }
        }
    }
}
