pub mod handlers;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/cameras", get(handlers::handle_cameras))
        .route(
            "/cameras/{camera_id}/streaming",
            post(handlers::handle_streaming_set),
        )
        .route(
            "/cameras/{camera_id}/snapshot",
            get(handlers::handle_snapshot),
        )
        .route(
            "/cameras/{camera_id}/streams/{session_id}/prepare",
            post(handlers::handle_prepare),
        )
        .route(
            "/cameras/{camera_id}/streams/{session_id}/start",
            post(handlers::handle_start),
        )
        .route(
            "/cameras/{camera_id}/streams/{session_id}/reconfigure",
            post(handlers::handle_reconfigure),
        )
        .route(
            "/cameras/{camera_id}/streams/{session_id}",
            delete(handlers::handle_stop),
        )
        .route("/daemon/shutdown", post(handlers::handle_shutdown))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(cors);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, app).await?;
    Ok(())
}
