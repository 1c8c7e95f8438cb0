use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use voicequote_agent::broker::{BrokerError, TokenBroker};
use voicequote_core::config::{AppConfig, ConfigError, LoadOptions};

use crate::{ephemeral, health, quote};

pub struct Application {
    pub config: AppConfig,
    pub broker: Arc<TokenBroker>,
    pub router: Router,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("realtime client initialization failed: {0}")]
    RealtimeClient(#[source] BrokerError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    config.validate()?;

    let broker =
        Arc::new(TokenBroker::from_config(&config.realtime).map_err(BootstrapError::RealtimeClient)?);
    if broker.has_api_key() {
        info!(
            event_name = "system.bootstrap.realtime_configured",
            correlation_id = "bootstrap",
            model = %config.realtime.model,
            voice = %config.realtime.voice,
            "realtime credential configured"
        );
    } else {
        warn!(
            event_name = "system.bootstrap.realtime_missing",
            correlation_id = "bootstrap",
            "OPENAI_API_KEY is not set; /api/ephemeral will fail until it is configured"
        );
    }

    let router = app_router(&config, broker.clone());
    Ok(Application { config, broker, router })
}

pub fn app_router(config: &AppConfig, broker: Arc<TokenBroker>) -> Router {
    let health_state = health::HealthState::new(broker.has_api_key(), config.realtime.model.clone());

    Router::new()
        .merge(ephemeral::router(broker))
        .merge(quote::router())
        .merge(health::router(health_state))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use voicequote_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use crate::bootstrap::{app_router, bootstrap, bootstrap_with_config};
    use crate::test_support::{broker, FakeIssuer};

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[test]
    fn bootstrap_fails_fast_on_invalid_configuration() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                base_url: Some("ftp://api.example.com".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let message = result.err().expect("invalid base url").to_string();
        assert!(message.contains("realtime.base_url"));
    }

    #[test]
    fn bootstrap_succeeds_without_api_key() {
        let app = bootstrap_with_config(AppConfig::default()).expect("bootstrap without key");

        assert!(!app.broker.has_api_key());
        assert_eq!(app.config.server.port, 8788);
    }

    #[tokio::test]
    async fn router_serves_ephemeral_quote_and_health() {
        let issuer =
            FakeIssuer::responding(200, json!({ "client_secret": { "value": "ek_router" } }));
        let router =
            app_router(&AppConfig::default(), Arc::new(broker(Some("sk-test"), issuer.clone())));

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/api/ephemeral").body(Body::empty()).expect("request"))
            .await
            .expect("ephemeral response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["client_secret"]["value"], "ek_router");

        let quote = json!({
            "vehicleDetails": { "make": "Honda", "model": "Civic", "year": 2019 },
            "previousClaims": { "claimMadeInLast3Years": false, "claimAtFault": false },
            "postalCode": "K1A0B1"
        });
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/quote")
                    .header("content-type", "application/json")
                    .body(Body::from(quote.to_string()))
                    .expect("request"),
            )
            .await
            .expect("quote response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await["status"], "accepted");

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("health response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["realtime_credential"], "configured");
        assert_eq!(issuer.calls(), 1);
    }

    #[tokio::test]
    async fn router_without_key_never_calls_upstream() {
        let issuer = FakeIssuer::responding(200, json!({ "client_secret": { "value": "unused" } }));
        let router = app_router(&AppConfig::default(), Arc::new(broker(None, issuer.clone())));

        let response = router
            .oneshot(Request::builder().uri("/api/ephemeral").body(Body::empty()).expect("request"))
            .await
            .expect("ephemeral response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&bytes[..], b"Missing OPENAI_API_KEY");
        assert_eq!(issuer.calls(), 0);
    }
}
