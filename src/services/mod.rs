pub mod classifier;
pub mod gemini;
pub mod index_service;
pub mod knowledge_base;
pub mod notification_service;
pub mod pipeline;
pub mod reply_service;
pub mod summary_service;
pub mod sync_service;
