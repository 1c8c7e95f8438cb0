use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};
use voicequote_core::config::RealtimeConfig;
use voicequote_core::errors::ApplicationError;

use crate::session::SessionRequest;

/// Short-lived credential for one realtime session. Fields other than
/// `value` (such as `expires_at`) are passed through untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientSecret {
    pub value: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Missing OPENAI_API_KEY")]
    MissingApiKey,
    #[error("upstream responded with status {status}")]
    Upstream { status: u16, body: String },
    #[error("{0}")]
    Transport(String),
}

impl From<BrokerError> for ApplicationError {
    fn from(error: BrokerError) -> Self {
        match error {
            BrokerError::MissingApiKey => Self::Configuration(error.to_string()),
            BrokerError::Upstream { status, body } => Self::Upstream { status, body },
            BrokerError::Transport(message) => Self::Transport(message),
        }
    }
}

/// The one outbound call the broker makes.
#[async_trait]
pub trait SessionIssuer: Send + Sync {
    async fn create_session(
        &self,
        api_key: &SecretString,
        request: &SessionRequest,
    ) -> Result<UpstreamResponse, BrokerError>;
}

pub struct HttpSessionIssuer {
    client: Client,
    sessions_url: String,
}

impl HttpSessionIssuer {
    pub fn new(config: &RealtimeConfig) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| BrokerError::Transport(error.to_string()))?;
        Ok(Self { client, sessions_url: config.sessions_url() })
    }
}

#[async_trait]
impl SessionIssuer for HttpSessionIssuer {
    async fn create_session(
        &self,
        api_key: &SecretString,
        request: &SessionRequest,
    ) -> Result<UpstreamResponse, BrokerError> {
        let response = self
            .client
            .post(&self.sessions_url)
            .bearer_auth(api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|error| BrokerError::Transport(error.to_string()))?;

        let status = response.status().as_u16();
        let body =
            response.text().await.map_err(|error| BrokerError::Transport(error.to_string()))?;
        Ok(UpstreamResponse { status, body })
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    client_secret: Option<ClientSecret>,
}

/// Mints a fresh ephemeral credential per call. Nothing is cached or retried.
pub struct TokenBroker {
    api_key: Option<SecretString>,
    request: SessionRequest,
    issuer: Arc<dyn SessionIssuer>,
}

impl TokenBroker {
    pub fn new(
        api_key: Option<SecretString>,
        request: SessionRequest,
        issuer: Arc<dyn SessionIssuer>,
    ) -> Self {
        Self { api_key, request, issuer }
    }

    pub fn from_config(config: &RealtimeConfig) -> Result<Self, BrokerError> {
        let issuer = HttpSessionIssuer::new(config)?;
        Ok(Self::new(config.api_key.clone(), SessionRequest::from_config(config), Arc::new(issuer)))
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref().filter(|key| !key.expose_secret().trim().is_empty())
    }

    pub async fn issue_token(&self) -> Result<ClientSecret, BrokerError> {
        let api_key = self.api_key().ok_or(BrokerError::MissingApiKey)?;

        let response = self.issuer.create_session(api_key, &self.request).await?;
        if !response.is_success() {
            warn!(
                event_name = "broker.session.upstream_rejected",
                status = response.status,
                "realtime session issuance rejected upstream"
            );
            return Err(BrokerError::Upstream { status: response.status, body: response.body });
        }

        let session: SessionResponse = serde_json::from_str(&response.body).map_err(|error| {
            BrokerError::Transport(format!("invalid session response: {error}"))
        })?;
        let secret = session.client_secret.ok_or_else(|| {
            BrokerError::Transport("session response did not include client_secret".to_string())
        })?;

        info!(
            event_name = "broker.session.issued",
            model = %self.request.model,
            voice = %self.request.voice,
            "ephemeral realtime credential issued"
        );
        Ok(secret)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use secrecy::{ExposeSecret, SecretString};
    use serde_json::json;
    use voicequote_core::errors::ApplicationError;

    use super::{BrokerError, SessionIssuer, TokenBroker, UpstreamResponse};
    use crate::session::SessionRequest;

    struct FakeIssuer {
        calls: AtomicUsize,
        seen_keys: Mutex<Vec<String>>,
        response: Result<UpstreamResponse, BrokerError>,
    }

    impl FakeIssuer {
        fn responding(status: u16, body: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen_keys: Mutex::new(Vec::new()),
                response: Ok(UpstreamResponse { status, body: body.to_string() }),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen_keys: Mutex::new(Vec::new()),
                response: Err(BrokerError::Transport(message.to_string())),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionIssuer for FakeIssuer {
        async fn create_session(
            &self,
            api_key: &SecretString,
            _request: &SessionRequest,
        ) -> Result<UpstreamResponse, BrokerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut keys) = self.seen_keys.lock() {
                keys.push(api_key.expose_secret().to_string());
            }
            self.response.clone()
        }
    }

    fn broker(api_key: Option<&str>, issuer: Arc<FakeIssuer>) -> TokenBroker {
        TokenBroker::new(
            api_key.map(|key| SecretString::from(key.to_string())),
            SessionRequest::intake("gpt-4o-realtime-preview", "alloy"),
            issuer,
        )
    }

    #[tokio::test]
    async fn missing_secret_fails_before_any_outbound_call() {
        let issuer = FakeIssuer::responding(200, json!({}));

        let error = broker(None, issuer.clone()).issue_token().await.expect_err("no key");
        assert_eq!(error, BrokerError::MissingApiKey);
        assert_eq!(error.to_string(), "Missing OPENAI_API_KEY");

        let blank = broker(Some("  "), issuer.clone()).issue_token().await.expect_err("blank key");
        assert_eq!(blank, BrokerError::MissingApiKey);
        assert_eq!(issuer.calls(), 0);
    }

    #[tokio::test]
    async fn success_returns_only_the_client_secret() {
        let issuer = FakeIssuer::responding(
            200,
            json!({
                "id": "sess_001",
                "object": "realtime.session",
                "model": "gpt-4o-realtime-preview",
                "client_secret": { "value": "ek_abc123", "expires_at": 1_735_689_600 }
            }),
        );

        let secret = broker(Some("sk-live"), issuer.clone()).issue_token().await.expect("token");

        assert_eq!(secret.value, "ek_abc123");
        assert_eq!(secret.extra.get("expires_at"), Some(&json!(1_735_689_600)));
        assert_eq!(
            serde_json::to_value(&secret).expect("serialize"),
            json!({ "value": "ek_abc123", "expires_at": 1_735_689_600 })
        );
        assert_eq!(issuer.calls(), 1);
        assert_eq!(issuer.seen_keys.lock().expect("lock").as_slice(), ["sk-live".to_string()]);
    }

    #[tokio::test]
    async fn every_call_mints_a_fresh_credential() {
        let issuer = FakeIssuer::responding(200, json!({ "client_secret": { "value": "ek_1" } }));
        let broker = broker(Some("sk-live"), issuer.clone());

        broker.issue_token().await.expect("first");
        broker.issue_token().await.expect("second");
        assert_eq!(issuer.calls(), 2);
    }

    #[tokio::test]
    async fn upstream_failure_is_passed_through_verbatim() {
        let body = json!({ "error": { "message": "Incorrect API key provided", "code": "invalid_api_key" } });
        let issuer = FakeIssuer::responding(401, body.clone());

        let error = broker(Some("sk-bad"), issuer).issue_token().await.expect_err("401");
        assert_eq!(error, BrokerError::Upstream { status: 401, body: body.to_string() });

        let mapped = ApplicationError::from(error).into_interface("req-1");
        assert_eq!(mapped.status_code(), 401);
        assert_eq!(mapped.body(), body.to_string());
    }

    #[tokio::test]
    async fn transport_failures_carry_the_underlying_message() {
        let issuer = FakeIssuer::failing("dns error: no such host");

        let error = broker(Some("sk-live"), issuer).issue_token().await.expect_err("transport");
        assert_eq!(error, BrokerError::Transport("dns error: no such host".to_string()));

        let mapped = ApplicationError::from(error).into_interface("req-2");
        assert_eq!(mapped.status_code(), 500);
        assert_eq!(mapped.body(), "realtime init failed: dns error: no such host");
    }

    #[tokio::test]
    async fn success_without_client_secret_is_a_transport_failure() {
        let issuer = FakeIssuer::responding(200, json!({ "id": "sess_002" }));

        let error = broker(Some("sk-live"), issuer).issue_token().await.expect_err("no secret");
        assert!(matches!(error, BrokerError::Transport(ref message) if message.contains("client_secret")));
    }
}
