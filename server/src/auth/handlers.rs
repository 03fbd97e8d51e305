//! Token HTTP Handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::AppState;

/// Response body of the token issuance endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Opaque single-use admission token.
    pub token: String,
}

/// Issue a new admission token.
///
/// GET /connect/token
pub async fn issue_token(State(state): State<AppState>) -> Json<TokenResponse> {
    let token = state.tokens.issue();
    debug!(outstanding = state.tokens.outstanding(), "Admission token issued");

    Json(TokenResponse { token })
}
