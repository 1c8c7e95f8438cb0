use std::sync::Arc;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::payload::{FieldPath, FieldUpdate, FinalizedQuote, QuotePayload};
use crate::errors::DomainError;
use crate::intake::states::{IntakeEffect, IntakeEvent, IntakeState, Snapshot, TransitionOutcome};

/// Owns the session's payload and applies agent events one at a time.
#[derive(Clone, Debug, Default)]
pub struct PayloadReducer {
    snapshot: Snapshot,
    finalized: Option<FinalizedQuote>,
}

impl PayloadReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> IntakeState {
        self.snapshot.state
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn finalized(&self) -> Option<&FinalizedQuote> {
        self.finalized.as_ref()
    }

    pub fn missing_fields(&self) -> Vec<FieldPath> {
        self.snapshot.payload.missing_fields()
    }

    /// Rejected events leave the reducer exactly as it was.
    pub fn apply(&mut self, event: &IntakeEvent) -> Result<TransitionOutcome, DomainError> {
        let outcome = transition(&self.snapshot, event)?;
        if let IntakeEffect::Finalized(quote) = &outcome.effect {
            self.finalized = Some(quote.clone());
        }
        self.snapshot = outcome.snapshot.clone();
        Ok(outcome)
    }

    pub fn apply_with_audit<S>(
        &mut self,
        event: &IntakeEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(event);
        let audit_event = match &result {
            Ok(outcome) => {
                let applied = match &outcome.effect {
                    IntakeEffect::FieldApplied(update) => AuditEvent::new(
                        audit,
                        "intake.field_applied",
                        AuditCategory::Intake,
                        AuditOutcome::Success,
                    )
                    .with_metadata("path", update.path().as_str())
                    .with_metadata("value", update.value().to_string()),
                    IntakeEffect::Finalized(quote) => AuditEvent::new(
                        audit,
                        "intake.finalized",
                        AuditCategory::Intake,
                        AuditOutcome::Success,
                    )
                    .with_metadata("postal_code", quote.postal_code.as_str()),
                    IntakeEffect::Ignored => AuditEvent::new(
                        audit,
                        "intake.event_ignored",
                        AuditCategory::Intake,
                        AuditOutcome::Ignored,
                    )
                    .with_metadata("tool", outcome.event),
                };
                applied
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("version", outcome.snapshot.version.to_string())
            }
            Err(error) => {
                let event_type = match event {
                    IntakeEvent::PayloadUpsert { .. } => "intake.update_rejected",
                    IntakeEvent::ManagerReady { .. } => "intake.finalize_rejected",
                };
                AuditEvent::new(audit, event_type, AuditCategory::Intake, AuditOutcome::Rejected)
                    .with_metadata("tool", event.tool_name())
                    .with_metadata("error", error.to_string())
            }
        };
        sink.emit(audit_event);
        result
    }
}

/// Pure transition function: the next snapshot for `event`, or the reason it
/// was rejected.
pub fn transition(current: &Snapshot, event: &IntakeEvent) -> Result<TransitionOutcome, DomainError> {
    use IntakeState::{Collecting, Finalized};

    let (snapshot, effect) = match (current.state, event) {
        (Finalized, _) => (current.clone(), IntakeEffect::Ignored),
        (Collecting, IntakeEvent::PayloadUpsert { path, value }) => {
            let update = FieldUpdate::decode(path, value)?;
            let next = Snapshot {
                version: current.version + 1,
                state: Collecting,
                payload: Arc::new(current.payload.with_update(&update)),
            };
            (next, IntakeEffect::FieldApplied(update))
        }
        (Collecting, IntakeEvent::ManagerReady { payload }) => {
            let quote = QuotePayload::from_candidate(payload)?.finalize()?;
            let next = Snapshot {
                version: current.version + 1,
                state: Finalized,
                payload: Arc::new(QuotePayload::from(&quote)),
            };
            (next, IntakeEffect::Finalized(quote))
        }
    };

    Ok(TransitionOutcome {
        from: current.state,
        to: snapshot.state,
        event: event.tool_name(),
        effect,
        snapshot,
    })
}
