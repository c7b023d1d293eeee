//! Web server for the Veilgate gateway.
//!
//! Two route families: the direct API under `/api/v1` (bearer-JWT, chat
//! completions with privacy features) and the web API under `/api` (session
//! lifecycle + generation for the first-party UI).

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

use std::net::SocketAddr;

use axum::http::header::HeaderValue;
use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::middleware::auth::jwt_auth_middleware;
use crate::middleware::monitoring::monitoring_middleware;
use crate::state::AppState;

/// Build the Axum app with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let direct_routes = Router::new()
        .route("/create-session", post(routes::direct::create_session))
        .route("/stateless-query", post(routes::direct::stateless_query))
        .route("/stateful-query", post(routes::direct::stateful_query))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    let web_routes = Router::new()
        .route("/initialize-session", post(routes::sessions::initialize_session))
        .route("/session/models", put(routes::sessions::update_session_models))
        .route(
            "/session/{session_id}/endpoints",
            get(routes::sessions::get_session_endpoints),
        )
        .route(
            "/session/{session_id}/choose-endpoint",
            post(routes::sessions::choose_endpoint),
        )
        .route("/session/{session_id}", get(routes::sessions::session_info))
        .route("/end-session", post(routes::sessions::end_session))
        .route("/connect", post(routes::sessions::connect))
        .route("/generate", post(routes::generate::generate))
        .route("/providers", get(routes::health::providers));

    Router::new()
        .route("/health", get(routes::health::health))
        .nest("/api/v1", direct_routes)
        .nest("/api", web_routes)
        .layer(axum::middleware::from_fn(monitoring_middleware))
        .layer(cors_layer(&state))
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins = state.settings.cors_origins();
    if origins.iter().any(|origin| origin == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        // Wildcards cannot be combined with credentials, so the explicit
        // origin list comes with explicit methods and headers.
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ])
            .allow_credentials(true)
    }
}

/// Bind and serve until shutdown; the router's background decoys are
/// cancelled on the way out.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.settings.host, state.settings.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("web server listening on http://{addr}");

    let router = state.router.clone();
    let app = build_app(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    })
    .await?;

    router.close().await;
    Ok(())
}
