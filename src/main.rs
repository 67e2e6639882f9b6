use live_poller::config::Config;
use live_poller::startup::{AppState, build_router};
use tracing::info;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "INFO");
        }
    }
    // initialize tracing
    tracing_subscriber::fmt::init();

    let config = Config::load();
    let addr = config.bind_addr;

    let app_state = AppState::new(config)
        .await
        .expect("Unable to initialise poll storage");

    let app = build_router(app_state);

    info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Unable to spawn tcp listener");

    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
