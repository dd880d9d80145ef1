use std::sync::Arc;

use crate::error::OracleError;
use crate::services::gemini::LanguageModel;
use crate::services::knowledge_base::KnowledgeBase;

pub const REPLY_EMPTY: &str = "AI could not generate a response. Try again.";
pub const REPLY_FAILED: &str = "Error generating AI reply.";

pub struct ReplyService {
    model: Arc<dyn LanguageModel>,
    knowledge: Arc<KnowledgeBase>,
}

impl ReplyService {
    pub fn new(model: Arc<dyn LanguageModel>, knowledge: Arc<KnowledgeBase>) -> Self {
        Self { model, knowledge }
    }

    /// `Ok(None)` when the oracle answered with nothing usable.
    pub async fn suggest(&self, subject: &str, body: &str) -> Result<Option<String>, OracleError> {
        let context = self
            .knowledge
            .relevant_context(&format!("{subject} {body}"))
            .await;
        tracing::debug!(subject=%subject, context_len = context.len(), "generating reply");

        match self.model.generate(&reply_prompt(&context, subject, body)).await {
            Ok(reply) => Ok(Some(reply)),
            Err(OracleError::EmptyResponse) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

pub fn reply_prompt(context: &str, subject: &str, body: &str) -> String {
    format!(
        "You are an AI email assistant. Based on this email and context, generate a short, \
         polite, and professional human-like reply.\n\n\
         Context:\n{context}\n\n\
         Email:\n\
         Subject: {subject}\n\
         Body: {body}\n\n\
         Write only the reply text. Do not include greetings like \"Dear\" or signatures.\n"
    )
}
