mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use harmonia_api::state::{AppState, AppStateInner};
use harmonia_core::{
    AuditDispatcher, AuditSink, ContentFilter, ExportEngine, HttpAuditSink, MessageStore,
    StaticMetadata, SystemClock, TracingAuditSink, WordlistFilter, spawn_audit_worker,
};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harmonia=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Moderation
    let filter: Arc<dyn ContentFilter> = match (&config.moderation_terms, &config.moderation_wordlist) {
        (Some(terms), _) => Arc::new(WordlistFilter::new(terms.iter())),
        (None, Some(path)) => Arc::new(WordlistFilter::load(path)?),
        (None, None) => Arc::new(WordlistFilter::default()),
    };

    // Audit
    let sink: Arc<dyn AuditSink> = match &config.audit_url {
        Some(url) => {
            info!("Audit events go to {}", url);
            Arc::new(HttpAuditSink::new(url.as_str(), config.audit_policy.timeout)?)
        }
        None => {
            info!("No audit endpoint configured, audit events go to the log");
            Arc::new(TracingAuditSink)
        }
    };
    let (audit, rx) = AuditDispatcher::channel(config.audit_queue_capacity);
    spawn_audit_worker(rx, sink, config.audit_policy);

    // Store
    let clock = Arc::new(SystemClock);
    let store = match &config.db_path {
        Some(path) => {
            let journal = Arc::new(harmonia_db::Database::open(path)?);
            MessageStore::open(journal, filter, clock.clone(), audit)?
        }
        None => {
            info!("No HARMONIA_DB_PATH set, messages are kept in memory only");
            MessageStore::new(filter, clock.clone(), audit)
        }
    };

    // Export
    let metadata = match &config.threads_path {
        Some(path) => StaticMetadata::load(path)?,
        None => StaticMetadata::new(),
    };
    let export = ExportEngine::new(Arc::new(metadata), clock).with_offset(config.export_offset);

    let state: AppState = Arc::new(AppStateInner { store, export });

    let app = harmonia_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr();
    info!("Harmonia server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
