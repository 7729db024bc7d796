//! Development relay for complaint discussions: the comments REST endpoints
//! and the realtime gateway, backed by memory.

pub mod auth;
pub mod comments;
pub mod connection;
pub mod dispatcher;

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::dispatcher::Dispatcher;

pub type AppState = Arc<RelayState>;

pub struct RelayState {
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}

impl RelayState {
    pub fn new(jwt_secret: impl Into<String>) -> AppState {
        Arc::new(Self {
            dispatcher: Dispatcher::new(),
            jwt_secret: jwt_secret.into(),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/token", post(auth::issue_token))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/complaints/{complaint_id}/comments",
            get(comments::get_comments).post(comments::post_comment),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(connection::ws_upgrade))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve the relay on an already bound listener until the process stops.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}
