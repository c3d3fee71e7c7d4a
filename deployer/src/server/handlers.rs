//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use openapi_server::models::{
    DeployRequestBody, DeployResponse, ErrorResponse, HealthResponse, VersionResponse,
};
use serde_json::Value;
use tracing::{error, warn};

use crate::authn::secret::Authorized;
use crate::errors::{AuthError, ValidationError};
use crate::models::deployment::{DeploymentOutcome, DeploymentRequest};
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Header carrying the shared secret; wins over the body field
pub const SECRET_HEADER: &str = "x-deploy-secret";

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "pagedeploy".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

fn error_response(
    status: StatusCode,
    stage: Option<String>,
    kind: Option<String>,
    reason: String,
) -> Response {
    let body = ErrorResponse {
        status: "error".to_string(),
        stage,
        kind,
        reason,
    };
    (status, Json(body)).into_response()
}

fn unauthorized(err: AuthError) -> Response {
    warn!("Rejected deployment request: {}", err);
    error_response(
        StatusCode::UNAUTHORIZED,
        Some("Verifying".to_string()),
        Some("Unauthorized".to_string()),
        err.to_string(),
    )
}

fn bad_request(err: ValidationError) -> Response {
    warn!("Invalid deployment request: {}", err);
    error_response(
        StatusCode::BAD_REQUEST,
        None,
        Some("InvalidRequest".to_string()),
        err.to_string(),
    )
}

/// Map a workflow outcome to the caller's response
pub fn outcome_response(outcome: DeploymentOutcome) -> Response {
    match outcome {
        DeploymentOutcome::Success {
            published_url,
            revision,
            repo_url,
            commit_sha,
        } => (
            StatusCode::OK,
            Json(DeployResponse {
                status: "success".to_string(),
                url: published_url,
                revision,
                repo_url,
                commit_sha,
            }),
        )
            .into_response(),
        DeploymentOutcome::Failure {
            stage,
            kind,
            reason,
        } => {
            let status = if kind == "Timeout" {
                StatusCode::GATEWAY_TIMEOUT
            } else {
                StatusCode::BAD_GATEWAY
            };
            error_response(status, Some(stage.to_string()), Some(kind), reason)
        }
    }
}

/// Deployment handler.
///
/// The secret is checked before the body is validated. The workflow runs in
/// its own task so it completes even if the caller disconnects.
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header_secret = headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    // A header secret is checked before the body is even parsed
    let mut authorized: Option<Authorized> = None;
    if let Some(secret) = header_secret.as_deref() {
        match state.controller.authorize(Some(secret)) {
            Ok(token) => authorized = Some(token),
            Err(e) => return unauthorized(e),
        }
    }

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => return bad_request(ValidationError::MalformedBody(e.to_string())),
    };

    let authorized = match authorized {
        Some(token) => token,
        None => {
            let body_secret = value.get("secret").and_then(Value::as_str);
            match state.controller.authorize(body_secret) {
                Ok(token) => token,
                Err(e) => return unauthorized(e),
            }
        }
    };

    let request = match serde_json::from_value::<DeployRequestBody>(value)
        .map_err(|e| ValidationError::MalformedBody(e.to_string()))
        .and_then(DeploymentRequest::from_body)
    {
        Ok(request) => request,
        Err(e) => return bad_request(e),
    };

    let controller = state.controller.clone();
    let workflow =
        tokio::spawn(async move { controller.execute(authorized, request).await });

    match workflow.await {
        // The notification handle is dropped; delivery continues in the background
        Ok(report) => outcome_response(report.outcome),
        Err(e) => {
            error!("Workflow task failed: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                Some("Internal".to_string()),
                "workflow task failed".to_string(),
            )
        }
    }
}
