use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;
use voicequote_agent::broker::{BrokerError, ClientSecret, TokenBroker};
use voicequote_core::errors::{ApplicationError, InterfaceError};

#[derive(Clone)]
pub struct EphemeralState {
    broker: Arc<TokenBroker>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EphemeralResponse {
    pub client_secret: ClientSecret,
}

pub fn router(broker: Arc<TokenBroker>) -> Router {
    Router::new().route("/api/ephemeral", get(issue_ephemeral)).with_state(EphemeralState { broker })
}

pub async fn issue_ephemeral(State(state): State<EphemeralState>) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    match state.broker.issue_token().await {
        Ok(client_secret) => {
            info!(
                event_name = "ingress.ephemeral.issued",
                correlation_id = %correlation_id,
                "ephemeral realtime credential handed to client"
            );
            Json(EphemeralResponse { client_secret }).into_response()
        }
        Err(failure) => {
            log_failure(&failure, &correlation_id);
            error_response(ApplicationError::from(failure).into_interface(correlation_id))
        }
    }
}

fn log_failure(failure: &BrokerError, correlation_id: &str) {
    match failure {
        BrokerError::MissingApiKey => error!(
            event_name = "ingress.ephemeral.misconfigured",
            correlation_id = %correlation_id,
            "realtime api key is not configured"
        ),
        BrokerError::Upstream { status, .. } => warn!(
            event_name = "ingress.ephemeral.upstream_rejected",
            correlation_id = %correlation_id,
            upstream_status = *status,
            "upstream rejected session issuance"
        ),
        BrokerError::Transport(message) => error!(
            event_name = "ingress.ephemeral.transport_failed",
            correlation_id = %correlation_id,
            error = %message,
            "session issuance failed before a response arrived"
        ),
    }
}

/// Upstream rejections keep their status and body; everything else is a
/// plain-text 500.
fn error_response(error: InterfaceError) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    let body = error.body().to_string();
    let content_type = match &error {
        InterfaceError::Upstream { .. } if serde_json::from_str::<Value>(&body).is_ok() => {
            "application/json"
        }
        _ => "text/plain; charset=utf-8",
    };
    (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::to_bytes, extract::State, http::StatusCode, response::Response};
    use serde_json::{json, Value};

    use crate::ephemeral::{issue_ephemeral, EphemeralState};
    use crate::test_support::{broker, FakeIssuer};

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    #[tokio::test]
    async fn returns_only_client_secret_on_success() {
        let issuer = FakeIssuer::responding(
            200,
            json!({ "id": "sess_1", "client_secret": { "value": "ek_123", "expires_at": 1700000000 } }),
        );
        let state = EphemeralState { broker: Arc::new(broker(Some("sk-test"), issuer.clone())) };

        let response = issue_ephemeral(State(state)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).expect("json body");
        assert_eq!(body, json!({ "client_secret": { "value": "ek_123", "expires_at": 1700000000 } }));
        assert_eq!(issuer.calls(), 1);
    }

    #[tokio::test]
    async fn missing_key_is_500_without_upstream_call() {
        let issuer = FakeIssuer::responding(200, json!({ "client_secret": { "value": "never" } }));
        let state = EphemeralState { broker: Arc::new(broker(None, issuer.clone())) };

        let response = issue_ephemeral(State(state)).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Missing OPENAI_API_KEY");
        assert_eq!(issuer.calls(), 0);
    }

    #[tokio::test]
    async fn upstream_status_and_body_pass_through() {
        let upstream = json!({ "error": { "message": "rate limited", "type": "requests" } });
        let issuer = FakeIssuer::responding(429, upstream.clone());
        let state = EphemeralState { broker: Arc::new(broker(Some("sk-test"), issuer)) };

        let response = issue_ephemeral(State(state)).await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("content-type").and_then(|value| value.to_str().ok()),
            Some("application/json")
        );
        assert_eq!(body_text(response).await, upstream.to_string());
    }

    #[tokio::test]
    async fn transport_failure_reports_realtime_init_failed() {
        let issuer = FakeIssuer::failing("connection refused");
        let state = EphemeralState { broker: Arc::new(broker(Some("sk-test"), issuer)) };

        let response = issue_ephemeral(State(state)).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "realtime init failed: connection refused");
    }
}
