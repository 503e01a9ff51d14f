//! HTTP request handlers and shared state.

pub mod http;

pub use http::*;
