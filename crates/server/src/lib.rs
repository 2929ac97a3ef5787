//! Contact Agent Server
//!
//! Hosts the message pipeline behind an HTTP webhook, plus health, network
//! graph and Prometheus endpoints.

pub mod http;
pub mod messenger;
pub mod metrics;
pub mod services;
pub mod state;

pub use http::create_router;
pub use messenger::{OutboundMessage, SimulatedMessenger};
pub use metrics::{
    init_metrics, record_error, record_intent, record_latency, record_message,
    record_registration_completed, record_reply,
};
pub use services::{Collaborators, Services};
pub use state::AppState;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use contact_agent_agent::AgentError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Startup error: {0}")]
    Startup(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AgentError> for ServerError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::InvalidInput(msg) => ServerError::InvalidRequest(msg),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Startup(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_mapping() {
        let err = ServerError::from(AgentError::InvalidInput("no digits".into()));
        assert_eq!(StatusCode::from(&err), StatusCode::BAD_REQUEST);

        let err = ServerError::from(AgentError::Storage("down".into()));
        assert_eq!(StatusCode::from(&err), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
