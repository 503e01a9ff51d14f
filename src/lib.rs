//! User authentication service built with Rust.
//!
//! Session-cookie auth (register/login/logout/session validation) backed by
//! PostgreSQL, plus a background worker pool that notifies users whose
//! passwords have expired.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod notify;
pub mod services;

pub use config::Config;
pub use error::AppError;
pub use handlers::http::AppState;
pub use notify::{PassExpiryWorker, RunOutcome};
pub use services::{SessionsService, UsersService};

use axum::routing::{get, post};
use handlers::http;
use tower_http::trace::TraceLayer;

/// Build the API router (auth, sessions, health). Used by main and by
/// integration tests.
pub fn create_app(state: AppState) -> axum::Router {
    let user_routes = axum::Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/sessions/:key", get(auth::session));

    axum::Router::new()
        .route("/health", get(http::health))
        .nest("/users", user_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
