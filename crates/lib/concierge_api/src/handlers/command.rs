//! Command dispatch endpoint.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use concierge_core::dispatch::{IntegrationResult, Params};
use serde::Deserialize;
use tracing::debug;

use crate::AppState;

/// Body of `POST /api/command`.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub params: Option<Params>,
}

/// `POST /api/command`: run one registered command.
///
/// Always answers with the `{ ok, result | error }` envelope: 200 on success,
/// 400 for an unknown command, missing parameters or a malformed body, and
/// 500 when the integration itself failed.
pub async fn command_handler(
    State(state): State<AppState>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> (StatusCode, Json<IntegrationResult>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("rejecting malformed command body: {rejection}");
            return (
                StatusCode::BAD_REQUEST,
                Json(IntegrationResult::failure(rejection.body_text())),
            );
        }
    };

    let outcome = state
        .dispatcher
        .dispatch(&request.command, request.params.unwrap_or_default())
        .await;
    let status = match &outcome {
        Ok(_) => StatusCode::OK,
        Err(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(IntegrationResult::from(&outcome)))
}
