//! Admission Tokens
//!
//! Single-use opaque tokens that gate the signaling connection. A client
//! fetches one from `GET /connect/token` and presents it exactly once on
//! `GET /connect?token=...`.

mod error;
mod handlers;
pub mod tokens;

use axum::{routing::get, Router};

use crate::api::AppState;

pub use error::AdmissionError;
pub use tokens::TokenRegistry;

/// Create the token issuance router.
///
/// - GET /token - Issue a fresh admission token
pub fn router() -> Router<AppState> {
    Router::new().route("/token", get(handlers::issue_token))
}
