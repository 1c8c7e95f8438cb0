use axum::{http::StatusCode, response::Json, routing::post, Router};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;
use voicequote_core::domain::payload::{FieldPath, FinalizedQuote, QuotePayload};
use voicequote_core::errors::{DomainError, ValidationError};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuoteAccepted {
    pub status: &'static str,
    pub quote: FinalizedQuote,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuoteRejected {
    pub error: String,
    pub missing_fields: Vec<FieldPath>,
    pub invalid_fields: Vec<FieldPath>,
}

pub fn router() -> Router {
    Router::new().route("/api/quote", post(submit_quote))
}

/// Accepts a finalized payload from the client. Nothing is persisted.
pub async fn submit_quote(
    Json(candidate): Json<Value>,
) -> Result<(StatusCode, Json<QuoteAccepted>), (StatusCode, Json<QuoteRejected>)> {
    let correlation_id = Uuid::new_v4().to_string();

    let quote = QuotePayload::from_candidate(&candidate)
        .and_then(|payload| payload.finalize())
        .map_err(|error| {
            warn!(
                event_name = "ingress.quote.rejected",
                correlation_id = %correlation_id,
                error = %error,
                "quote submission rejected"
            );
            rejection(error)
        })?;

    info!(
        event_name = "ingress.quote.accepted",
        correlation_id = %correlation_id,
        make = %quote.vehicle.make,
        model = %quote.vehicle.model,
        year = quote.vehicle.year,
        postal_code = %quote.postal_code.as_str(),
        claim_made = quote.claims.claim_made_in_last_3_years,
        claim_at_fault = quote.claims.claim_at_fault,
        "quote accepted"
    );

    Ok((StatusCode::ACCEPTED, Json(QuoteAccepted { status: "accepted", quote })))
}

fn rejection(error: DomainError) -> (StatusCode, Json<QuoteRejected>) {
    let (missing_fields, invalid_fields) = match &error {
        DomainError::CompletionValidation { missing, invalid } => {
            (missing.clone(), invalid.iter().filter_map(ValidationError::path).collect())
        }
        DomainError::Validation(validation) => (Vec::new(), validation.path().into_iter().collect()),
    };
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(QuoteRejected { error: error.to_string(), missing_fields, invalid_fields }),
    )
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, Json};
    use serde_json::json;

    use crate::quote::submit_quote;

    #[tokio::test]
    async fn complete_payload_is_accepted() {
        let payload = json!({
            "vehicleDetails": { "make": " Honda ", "model": "Civic", "year": 2019 },
            "previousClaims": { "claimMadeInLast3Years": false },
            "postalCode": "k1a-0b1"
        });

        let (status, Json(accepted)) = submit_quote(Json(payload)).await.expect("accepted");

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(accepted.status, "accepted");
        assert_eq!(
            serde_json::to_value(&accepted.quote).expect("serialize"),
            json!({
                "vehicleDetails": { "make": "Honda", "model": "Civic", "year": 2019 },
                "previousClaims": { "claimMadeInLast3Years": false, "claimAtFault": false },
                "postalCode": "K1A0B1"
            })
        );
    }

    #[tokio::test]
    async fn incomplete_payload_lists_missing_fields() {
        let payload = json!({
            "vehicleDetails": { "make": "Honda", "year": 2019 },
            "previousClaims": { "claimMadeInLast3Years": true },
            "postalCode": "K1A0B1"
        });

        let (status, Json(rejected)) = submit_quote(Json(payload)).await.expect_err("rejected");

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            serde_json::to_value(&rejected.missing_fields).expect("serialize"),
            json!(["vehicleDetails.model", "previousClaims.claimAtFault"])
        );
        assert!(rejected.invalid_fields.is_empty());
    }

    #[tokio::test]
    async fn invalid_values_are_reported_separately() {
        let payload = json!({
            "vehicleDetails": { "make": "Honda", "model": "Civic", "year": "2019" },
            "previousClaims": { "claimMadeInLast3Years": false },
            "postalCode": "90210"
        });

        let (status, Json(rejected)) = submit_quote(Json(payload)).await.expect_err("rejected");

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(rejected.missing_fields.is_empty());
        assert_eq!(
            serde_json::to_value(&rejected.invalid_fields).expect("serialize"),
            json!(["vehicleDetails.year", "postalCode"])
        );
    }
}
