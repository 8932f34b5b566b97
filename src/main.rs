use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inkpost::core::auth::{AuthApiState, Authenticator, SessionService, auth_api_router};
use inkpost::core::config::Config;
use inkpost::core::metrics;
use inkpost::core::db::{
    CredentialStore, MemoryCredentialStore, MemoryUserDirectory, PgCredentialStore, UserDirectory,
    UserRepository, create_pool,
};

/// How often expired credential store entries are dropped
const PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkpost=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        "Config loaded: database={}, auth={:?}",
        config.has_database(),
        config.auth
    );

    let metrics_handle = metrics::install_recorder()?;

    let (store, users): (Arc<dyn CredentialStore>, Arc<dyn UserDirectory>) =
        match config.db_config() {
            Some(db_config) => {
                let pool = create_pool(&db_config).await?;
                tracing::info!("Using PostgreSQL credential store");
                (
                    Arc::new(PgCredentialStore::new(pool.clone())),
                    Arc::new(UserRepository::new(pool)),
                )
            }
            None => {
                tracing::warn!(
                    "DATABASE_URL not set, using in-memory stores (single process, not persisted)"
                );
                (
                    Arc::new(MemoryCredentialStore::new()),
                    Arc::new(MemoryUserDirectory::default()),
                )
            }
        };

    let auth_config = Arc::new(config.auth.clone());
    let sessions = SessionService::new(auth_config.clone(), store);

    spawn_purge_task(sessions.clone());

    let app = Router::new().merge(auth_api_router(AuthApiState {
        sessions,
        users,
        authenticator: Authenticator::new(auth_config),
    }));
    let app = metrics::observe(app, metrics_handle).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically drop expired refresh credentials
fn spawn_purge_task(sessions: SessionService) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        interval.tick().await;

        loop {
            interval.tick().await;
            match sessions.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired refresh credentials"),
                Err(e) => tracing::error!(error = %e, "Failed to purge refresh credentials"),
            }
        }
    });
}
