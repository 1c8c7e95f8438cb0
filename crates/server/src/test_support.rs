use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use voicequote_agent::broker::{BrokerError, SessionIssuer, TokenBroker, UpstreamResponse};
use voicequote_agent::session::SessionRequest;

pub struct FakeIssuer {
    calls: AtomicUsize,
    response: Result<UpstreamResponse, BrokerError>,
}

impl FakeIssuer {
    pub fn responding(status: u16, body: serde_json::Value) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: Ok(UpstreamResponse { status, body: body.to_string() }),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: Err(BrokerError::Transport(message.to_string())),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionIssuer for FakeIssuer {
    async fn create_session(
        &self,
        _api_key: &SecretString,
        _request: &SessionRequest,
    ) -> Result<UpstreamResponse, BrokerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

pub fn broker(api_key: Option<&str>, issuer: Arc<FakeIssuer>) -> TokenBroker {
    TokenBroker::new(
        api_key.map(|key| SecretString::from(key.to_string())),
        SessionRequest::intake("gpt-4o-realtime-preview", "alloy"),
        issuer,
    )
}
