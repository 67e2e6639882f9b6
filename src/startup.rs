use crate::config::Config;
use crate::db::{self, DbPool, MemoryDb, PgStore};
use crate::ledger::VoteLedger;
use crate::sync::SyncService;
use crate::{polls, sse, ws};
use axum::{
    Router,
    extract::Extension,
    http::{
        StatusCode,
        header::{ACCEPT, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{get, post, put},
};
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_sessions::{
    Expiry, MemoryStore, SessionManagerLayer,
    cookie::{SameSite, time},
};
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<SyncService>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Postgres when `DATABASE_URL` is set, otherwise process memory.
    pub async fn new(config: Config) -> Result<Self, sqlx::Error> {
        match config.database_url.clone() {
            Some(url) => {
                let pool = db::init_db(&url).await?;
                info!("{}", db::pool_stats(&pool));
                spawn_health_check(pool.clone());

                let store = Arc::new(PgStore::new(pool));
                let sync = SyncService::new(VoteLedger::new(store.clone()), store);
                Ok(Self::with_sync(sync, config))
            }
            None => {
                info!("DATABASE_URL not set, votes are kept in memory only");
                Ok(Self::in_memory(config))
            }
        }
    }

    pub fn in_memory(config: Config) -> Self {
        let store = Arc::new(MemoryDb::new());
        Self::with_sync(SyncService::new(VoteLedger::new(store.clone()), store), config)
    }

    fn with_sync(sync: SyncService, config: Config) -> Self {
        AppState {
            sync: Arc::new(sync),
            config: Arc::new(config.validated()),
        }
    }
}

fn spawn_health_check(pool: DbPool) {
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            match pool.acquire().await {
                Ok(conn) => {
                    drop(conn);
                }
                Err(e) => {
                    error!("Database connection health check failed: {}", e);
                }
            }
        }
    });
}

pub fn build_router(app_state: AppState) -> Router {
    let inactivity = i64::try_from(app_state.config.session_inactivity.as_secs()).unwrap_or(360);

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/poll/create", post(polls::create_poll))
        .route("/api/poll/my-polls", get(polls::my_polls))
        .route("/api/poll/end/:poll_id", put(polls::end_poll))
        .route("/api/poll/:poll_id", get(polls::get_poll))
        .route("/api/poll/:poll_id/stream", get(sse::poll_updates_sse))
        .layer(Extension(app_state))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_credentials(true)
                .allow_methods([
                    axum::http::Method::POST,
                    axum::http::Method::GET,
                    axum::http::Method::PUT,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([CONTENT_TYPE, ACCEPT]),
        )
        .layer(
            SessionManagerLayer::new(MemoryStore::default())
                .with_name("live_poller")
                .with_same_site(SameSite::Lax)
                .with_secure(false)
                .with_expiry(Expiry::OnInactivity(time::Duration::seconds(inactivity))),
        )
        .fallback(handler_404)
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing to see here")
}
