use std::sync::Arc;

use hrzone_core::{
    audit::AuditLogger, config::Config, dialogue::DialogueEngine,
    session::InMemorySessionStore,
};

#[tokio::main]
async fn main() -> Result<(), hrzone_core::Error> {
    hrzone_core::logging::init("hrzone")?;

    let cfg = Arc::new(Config::load()?);
    tracing::debug!(?cfg, "config loaded");

    let store = Arc::new(InMemorySessionStore::new(cfg.session_ttl));
    let mut engine = DialogueEngine::new(store.clone());
    if let Some(path) = &cfg.audit_log_path {
        tracing::info!("audit log: {}", path.display());
        engine = engine.with_audit(Arc::new(AuditLogger::new(path, cfg.audit_log_json)));
    }

    hrzone_telegram::router::run_polling(cfg, Arc::new(engine), store)
        .await
        .map_err(|e| hrzone_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
