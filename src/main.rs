use std::time::Duration;

use axum::Router;
use pagebase::{
    config,
    db::{ConnectionDescriptor, Database},
    entity::EntityRegistry,
    middleware::SessionStore,
    server::Application,
    state::AppState,
};
use tokio::time;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging (stdout + daily file rotation under ./logs)
    std::fs::create_dir_all("logs").ok();
    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let file_appender = tracing_appender::rolling::daily("logs", "pagebase.log");
    let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info,sqlx=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_nb))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        .init();
    // Keep the guards alive so the non-blocking writers flush on exit
    let _log_guards = (stdout_guard, file_guard);

    if let Err(e) = run().await {
        tracing::error!("Server error {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let app_cfg = config::load()?;

    // Domain modules register their entities here before the connection is opened.
    let registry = EntityRegistry::new();
    let descriptor = ConnectionDescriptor::from_config(&app_cfg.database);
    let db = Database::connect(descriptor, &registry, app_cfg.mode).await?;

    let state = AppState::new(db, app_cfg);
    spawn_session_cleanup(state.sessions.clone());

    Application::new(state).listen(Router::new()).await
}

fn spawn_session_cleanup(store: SessionStore) {
    tokio::spawn(async move {
        let mut ticker = time::interval(Duration::from_secs(300));
        loop {
            ticker.tick().await;
            let removed = store.cleanup_expired().await;
            if removed > 0 {
                tracing::debug!("Removed {} expired sessions", removed);
            }
        }
    });
}
