//! Error taxonomy shared by the balancer, the shard manager and the replicas.
//!
//! Every failure is classified as one of: client input error (never retried),
//! transient peer failure (retried by the caller), storage failure (surfaced as
//! `500`, not retried) or a local I/O failure.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("shard {0} not found")]
    UnknownShard(String),

    #[error("server {0} not found")]
    UnknownServer(String),

    #[error("replica is not configured")]
    NotConfigured,

    #[error("no primary elected for shard {0}")]
    NoPrimary(String),

    #[error("server {server} is unreachable: {reason}")]
    Unreachable { server: String, reason: String },

    #[error("server {server} responded with {status}: {message}")]
    Remote {
        server: String,
        status: u16,
        message: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("write-ahead log i/o: {0}")]
    Log(#[from] std::io::Error),

    #[error("corrupt write-ahead log entry {index}: {reason}")]
    CorruptLog { index: usize, reason: String },

    #[error("corrupt replay cursor for shard {shard}: {reason}")]
    CorruptCursor { shard: String, reason: String },

    #[error("provisioning {server} failed: {reason}")]
    Provision { server: String, reason: String },

    #[error("retry cancelled by shutdown")]
    Cancelled,

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        last: Box<ClusterError>,
    },
}

pub type Result<T> = std::result::Result<T, ClusterError>;

impl ClusterError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Transient failures worth another attempt, possibly against a different
    /// primary.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable { .. } | Self::NoPrimary(_) | Self::NotConfigured => true,
            Self::Remote { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::UnknownShard(_) | Self::UnknownServer(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Remote { status: 400, .. } => StatusCode::BAD_REQUEST,
            Self::Exhausted { last, .. } => last.status_code(),
            err if err.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ClusterError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = if status == StatusCode::BAD_REQUEST {
            json!({ "message": self.to_string(), "status": "failure" })
        } else {
            json!({ "error": self.to_string() })
        };
        (status, Json(body)).into_response()
    }
}

/// `200` with the JSON body on success, the error's mapped response otherwise.
pub fn json_reply<T: serde::Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => {
            tracing::error!("Request failed: {}", e);
            e.into_response()
        }
    }
}

/// The `400` body returned when a request body is not valid JSON.
pub fn malformed_json(rejection: axum::extract::rejection::JsonRejection) -> Response {
    tracing::warn!("Error decoding JSON: {}", rejection.body_text());
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "message": "Error decoding JSON", "status": "failure" })),
    )
        .into_response()
}
