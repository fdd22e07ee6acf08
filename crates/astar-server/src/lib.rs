pub mod auth;
pub mod error;
pub mod refresh_store;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Routes behind a verified access token.
    let protected = Router::new()
        .route("/api/auth/me", get(routes::auth::me))
        .route("/api/permissions/check", post(routes::permissions::check))
        .route("/api/roles", get(routes::roles::list_roles))
        .route("/api/roles/{name}", get(routes::roles::get_role))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/refresh", post(routes::auth::refresh))
        .route("/api/auth/logout", post(routes::auth::logout))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the auth server on a pre-bound listener.
///
/// The caller binds so it can read the actual port first (`port = 0` lets the
/// OS pick a free one).
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    app_state: AppState,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("astar auth server listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
