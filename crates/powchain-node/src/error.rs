use crate::peers::PeerError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use powchain_core::{ChainError, RejectReason};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    /// Malformed or missing fields in a submitted transaction or block.
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("block rejected: {0}")]
    Rejected(#[from] RejectReason),
    #[error("peer {peer} unreachable: {source}")]
    PeerUnreachable {
        peer: String,
        #[source]
        source: PeerError,
    },
    #[error("stored chain is invalid: {0}")]
    Chain(#[from] ChainError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),
    #[error("miner setup failed: {0}")]
    Mining(String),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl NodeError {
    pub fn status(&self) -> StatusCode {
        match self {
            NodeError::Validation(_) => StatusCode::BAD_REQUEST,
            NodeError::Rejected(RejectReason::WrongHeight { .. }) => StatusCode::CONFLICT,
            NodeError::Rejected(_) => StatusCode::BAD_REQUEST,
            NodeError::PeerUnreachable { .. } => StatusCode::BAD_GATEWAY,
            NodeError::Chain(_)
            | NodeError::Persistence(_)
            | NodeError::Mining(_)
            | NodeError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            NodeError::Rejected(reason) => json!({ "error": self.to_string(), "rejection": reason }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
