use anyhow::{Context, Result};
use std::sync::Arc;

use inbox_triage::config::Settings;
use inbox_triage::imap::ImapConnector;
use inbox_triage::routes::{self, AppState};
use inbox_triage::services::classifier::Classifier;
use inbox_triage::services::gemini::{GeminiClient, LanguageModel};
use inbox_triage::services::index_service::EmailIndex;
use inbox_triage::services::knowledge_base::KnowledgeBase;
use inbox_triage::services::notification_service::{sinks_from_settings, spawn_dispatcher};
use inbox_triage::services::pipeline::Pipeline;
use inbox_triage::services::reply_service::ReplyService;
use inbox_triage::services::summary_service::SummaryService;
use inbox_triage::services::sync_service::{SyncManager, SyncOptions};
use inbox_triage::{db, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let settings = Settings::from_env();
    tracing::info!(accounts = settings.accounts.len(), model=%settings.gemini_model, "configuration loaded");

    let pool = db::connect(&settings.database_url).await?;
    let index = EmailIndex::new(pool);
    index.create_index().await.context("email index setup")?;
    tracing::info!(indexed = index.count().await.unwrap_or(0), "email index ready");

    if settings.gemini_api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY not set, classification will fall back and assists will fail");
    }
    let model: Arc<dyn LanguageModel> = Arc::new(GeminiClient::new(&settings)?);

    // Embedding the knowledge base can take a while; replies use whatever is loaded.
    let knowledge = Arc::new(KnowledgeBase::new(model.clone()));
    {
        let knowledge = knowledge.clone();
        let path = settings.knowledge_base_path.clone();
        tokio::spawn(async move {
            match knowledge.load_file(&path).await {
                Ok(n) => tracing::info!(entries = n, path=%path, "knowledge base loaded"),
                Err(e) => tracing::warn!(error=%format!("{e:#}"), "knowledge base unavailable"),
            }
        });
    }

    let (notifier, dispatcher) = spawn_dispatcher(sinks_from_settings(&settings)?);
    let classifier = Arc::new(Classifier::new(model.clone(), settings.oracle_timeout));
    let pipeline = Pipeline::new(classifier.clone(), index.clone(), notifier.clone());

    let sync = Arc::new(SyncManager::new());
    sync.start(
        settings.accounts.clone(),
        Arc::new(ImapConnector {
            network_timeout: settings.network_timeout,
        }),
        pipeline,
        SyncOptions::from_settings(&settings),
    )
    .await;

    let state = AppState {
        index,
        classifier,
        notifier,
        summaries: Arc::new(SummaryService::new(model.clone())),
        replies: Arc::new(ReplyService::new(model, knowledge)),
        sync: sync.clone(),
        classify_fallback: settings.classify_fallback,
    };
    let app = routes::router(state, &settings.cors_origin);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!("listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sync.shutdown().await;
    dispatcher.abort();
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let term = async {
        if let Ok(mut s) = signal::unix::signal(signal::unix::SignalKind::terminate()) {
            s.recv().await;
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();
    tokio::select! { _ = ctrl_c => {}, _ = term => {} }
    tracing::info!("shutdown signal received");
}
