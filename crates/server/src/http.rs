//! HTTP Endpoints
//!
//! Inbound messages arrive on a webhook; replies go out through the
//! messaging client and are echoed in the response body.

use std::time::{Duration, Instant};

use axum::{
    extract::{Json, Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use contact_agent_agent::{InboundMessage, NetworkGraph, PipelineReply, ReplyKind};

use crate::metrics::{
    metrics_handler, record_error, record_intent, record_latency, record_message,
    record_registration_completed, record_reply,
};
use crate::state::AppState;
use crate::ServerError;

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.config.server.cors_origins,
        state.config.server.cors_enabled,
    );
    let timeout = Duration::from_secs(state.config.server.timeout_seconds);

    Router::new()
        .route("/webhook/messages", post(receive_message))
        .route("/network/:owner_id", get(network))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - disabled: permissive (development only)
/// - no valid origins: localhost:3000
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin = %origin, "Invalid CORS origin");
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::info!("No valid CORS origins configured, defaulting to {}", DEFAULT_CORS_ORIGIN);
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static(DEFAULT_CORS_ORIGIN))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Webhook payload: sender phone (any format) and message text
#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    pub from: String,
    pub text: String,
}

async fn receive_message(
    State(state): State<AppState>,
    Json(message): Json<WebhookMessage>,
) -> Result<Json<PipelineReply>, ServerError> {
    if message.text.trim().is_empty() {
        return Err(ServerError::InvalidRequest("text is empty".to_string()));
    }

    let started = Instant::now();
    let result = state
        .pipeline
        .handle(&InboundMessage::new(message.from, message.text))
        .await;
    record_latency(started.elapsed());

    match result {
        Ok(reply) => {
            let route = if reply.kind == ReplyKind::Registration {
                "registration"
            } else {
                "user"
            };
            record_message(route);
            if let Some(intent) = reply.intent.as_ref() {
                record_intent(intent.as_str());
            }
            record_reply(reply.kind.as_str());
            if reply.registration_completed {
                record_registration_completed();
            }
            Ok(Json(reply))
        },
        Err(e) => {
            record_error("pipeline");
            tracing::error!(error = %e, "Webhook message failed");
            Err(e.into())
        },
    }
}

#[derive(Debug, Deserialize)]
struct NetworkQuery {
    depth: Option<usize>,
}

/// Owner's contact graph; depth is capped at the configured maximum
async fn network(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
    Query(query): Query<NetworkQuery>,
) -> Result<Json<NetworkGraph>, ServerError> {
    let max_depth = state.config.resolver.graph_depth.max(1);
    let depth = query.depth.unwrap_or(max_depth).clamp(1, max_depth);

    let graph = state
        .pipeline
        .resolver()
        .network(owner_id, depth)
        .await
        .map_err(|e| {
            record_error("network");
            ServerError::from(e)
        })?;
    Ok(Json(graph))
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let config = &state.config;
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "checks": {
                "inference": { "provider": config.inference.provider, "model": config.inference.model },
                "embeddings": { "enabled": config.embeddings.enabled },
                "persistence": { "scylla": config.persistence.enabled },
                "flow": { "mode": config.flow.mode },
                "metrics": { "installed": state.metrics.is_some() },
            }
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use contact_agent_agent::testing::{RecordingMessenger, ScriptedInference};
    use contact_agent_config::Settings;
    use contact_agent_persistence::{
        InMemoryContactStore, InMemoryRegistrationFlowStore, InMemoryUserStore,
    };

    use crate::services::{Collaborators, Services};

    struct TestApp {
        router: Router,
        inference: Arc<ScriptedInference>,
        messenger: Arc<RecordingMessenger>,
    }

    fn test_app() -> TestApp {
        let settings = Settings::default();
        let inference = Arc::new(ScriptedInference::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let services = Services::assemble(
            &settings,
            Collaborators {
                inference: inference.clone(),
                embeddings: None,
                contacts: Arc::new(InMemoryContactStore::new()),
                users: Arc::new(InMemoryUserStore::new()),
                flows: Arc::new(InMemoryRegistrationFlowStore::new()),
                messenger: messenger.clone(),
            },
        )
        .unwrap();
        let state = AppState::new(settings, services.pipeline.clone());
        TestApp {
            router: create_router(state),
            inference,
            messenger,
        }
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let response = app
            .router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["checks"]["metrics"]["installed"], false);
    }

    #[tokio::test]
    async fn test_webhook_starts_registration() {
        let app = test_app();
        app.inference.push(
            r#"{"name": null, "email": null, "phone_confirmed": null, "reply": "Oi! Como você se chama?"}"#,
        );

        let response = app
            .router
            .oneshot(post_json(
                "/webhook/messages",
                serde_json::json!({ "from": "+55 (21) 98765-4321", "text": "olá, quero me cadastrar" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["to"], "5521987654321");
        assert_eq!(json["kind"], "registration");
        assert_eq!(json["message"], "Oi! Como você se chama?");
        assert_eq!(app.messenger.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_webhook_rejects_empty_text() {
        let app = test_app();
        let response = app
            .router
            .oneshot(post_json(
                "/webhook/messages",
                serde_json::json!({ "from": "5521987654321", "text": "   " }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.inference.call_count(), 0);
    }

    #[tokio::test]
    async fn test_webhook_rejects_sender_without_digits() {
        let app = test_app();
        let response = app
            .router
            .oneshot(post_json(
                "/webhook/messages",
                serde_json::json!({ "from": "unknown", "text": "olá, tudo bem com você?" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("no phone digits"));
    }

    #[tokio::test]
    async fn test_network_for_unknown_owner_has_only_root() {
        let app = test_app();
        let uri = format!("/network/{}?depth=5", Uuid::new_v4());
        let response = app
            .router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["nodes"].as_array().unwrap().len(), 1);
        assert!(json["edges"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let app = test_app();
        let response = app
            .router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
