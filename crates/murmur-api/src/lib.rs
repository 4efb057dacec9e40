pub mod events;
pub mod handlers;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use events::EventLog;
pub use handlers::ApiState;

const MAX_PUBLISH_BODY: usize = 1024 * 1024;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/keys", post(handlers::handle_keygen))
        .route(
            "/sessions",
            get(handlers::handle_sessions).post(handlers::handle_session_open),
        )
        .route(
            "/sessions/{id}",
            get(handlers::handle_session_inspect).delete(handlers::handle_session_close),
        )
        .route(
            "/sessions/{id}/topics",
            get(handlers::handle_topics).post(handlers::handle_topic_join),
        )
        .route(
            "/sessions/{id}/topics/{topic}",
            get(handlers::handle_topic_name).delete(handlers::handle_topic_leave),
        )
        .route(
            "/sessions/{id}/topics/{topic}/publish",
            post(handlers::handle_publish).layer(DefaultBodyLimit::max(MAX_PUBLISH_BODY)),
        )
        .route("/sessions/{id}/events", get(handlers::handle_events))
        .route("/daemon/shutdown", post(handlers::handle_shutdown))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, app).await?;
    Ok(())
}
