use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::state::AppState;

/// Bearer-secret check in front of the cron endpoints
///
/// A rejected request never reaches the handler, so nothing is read or written.
#[tracing::instrument(skip(state, req, next), fields(path = %req.uri().path()))]
pub async fn cron_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    match state.auth.verify_header(auth_header) {
        Ok(()) => next.run(req).await,
        Err(e) => {
            tracing::warn!(error = %e, "Unauthorized cron request");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "error": "Unauthorized" })),
            )
                .into_response()
        }
    }
}
