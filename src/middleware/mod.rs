//! Middleware: session-cookie auth extractor for protected routes.

pub mod auth;

pub use auth::SessionAuth;
