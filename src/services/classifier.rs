use std::sync::Arc;
use std::time::Duration;

use crate::error::OracleError;
use crate::models::Category;
use crate::services::gemini::LanguageModel;

/// Label sets the oracle is asked to choose from. `Other` is never offered;
/// it only exists as a fallback.
const PROMPT_CATEGORIES: &str = "[Interested, Meeting Booked, Not Interested, Spam, Out of Office]";

/// Candidate names for substring matching, longest first so that
/// "Not Interested" is tested before "Interested". `Other` goes last since
/// its name is the most likely to turn up inside unrelated words.
const MATCH_ORDER: [Category; 6] = [
    Category::NotInterested,
    Category::MeetingBooked,
    Category::OutOfOffice,
    Category::Interested,
    Category::Spam,
    Category::Other,
];

pub struct Classifier {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl Classifier {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// Always yields a category: oracle failures and unmatched answers both
    /// resolve to `fallback`.
    pub async fn classify(&self, subject: &str, body: &str, fallback: Category) -> Category {
        match self.ask(subject, body).await {
            Ok(answer) => match match_category(&answer) {
                Some(category) => category,
                None => {
                    tracing::warn!(answer=%answer, fallback=%fallback, "oracle answer matched no category");
                    fallback
                }
            },
            Err(e) => {
                tracing::warn!(error=%e, fallback=%fallback, "classification failed");
                fallback
            }
        }
    }

    async fn ask(&self, subject: &str, body: &str) -> Result<String, OracleError> {
        let prompt = classification_prompt(subject, body);
        tokio::time::timeout(self.timeout, self.model.generate(&prompt))
            .await
            .map_err(|_| OracleError::Timeout)?
    }
}

pub fn classification_prompt(subject: &str, body: &str) -> String {
    format!(
        "You are an AI email assistant.\n\
         Classify this email into one of these categories exactly:\n\
         {PROMPT_CATEGORIES}\n\n\
         Subject: {subject}\n\
         Body: {body}\n\n\
         Respond with only one category name from the list above."
    )
}

/// Exact name first, then case-insensitive containment.
pub fn match_category(answer: &str) -> Option<Category> {
    if let Some(exact) = Category::from_name(answer) {
        return Some(exact);
    }
    let lowered = answer.to_lowercase();
    MATCH_ORDER
        .into_iter()
        .find(|c| lowered.contains(&c.as_str().to_lowercase()))
}
