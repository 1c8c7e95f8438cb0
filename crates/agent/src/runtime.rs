use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use voicequote_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use voicequote_core::domain::payload::{FieldPath, FinalizedQuote};
use voicequote_core::errors::{DomainError, ValidationError};
use voicequote_core::intake::{IntakeEffect, PayloadReducer, Snapshot};

use crate::observer::{PayloadObserver, SnapshotPublisher};
use crate::tools::{parse_server_event, ToolCall, ToolCallError, ToolOutcome, ToolRegistry};

const ACTOR: &str = "intake-runtime";

/// Forwards audit events to the structured log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        match event.outcome {
            AuditOutcome::Success | AuditOutcome::Ignored => info!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                session_id = event.session_id.as_deref().unwrap_or("-"),
                call_id = event.call_id.as_deref().unwrap_or("-"),
                outcome = ?event.outcome,
                metadata = %metadata,
                "intake audit event"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => warn!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                session_id = event.session_id.as_deref().unwrap_or("-"),
                call_id = event.call_id.as_deref().unwrap_or("-"),
                outcome = ?event.outcome,
                metadata = %metadata,
                "intake audit event"
            ),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub processed: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub ignored: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub stats: SessionStats,
    pub snapshot: Snapshot,
    pub finalized: Option<FinalizedQuote>,
}

/// Owns one session's reducer. Calls are applied strictly one at a time.
pub struct IntakeRuntime {
    session_id: String,
    reducer: PayloadReducer,
    registry: ToolRegistry,
    publisher: SnapshotPublisher,
    audit: Arc<dyn AuditSink>,
    stats: SessionStats,
}

impl Default for IntakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl IntakeRuntime {
    pub fn new() -> Self {
        Self::with_audit_sink(Arc::new(TracingAuditSink))
    }

    pub fn with_audit_sink(audit: Arc<dyn AuditSink>) -> Self {
        let reducer = PayloadReducer::new();
        let publisher = SnapshotPublisher::new(reducer.snapshot().clone());
        Self {
            session_id: Uuid::new_v4().to_string(),
            reducer,
            registry: ToolRegistry::intake(),
            publisher,
            audit,
            stats: SessionStats::default(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn observer(&self) -> PayloadObserver {
        self.publisher.observer()
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.reducer.snapshot()
    }

    pub fn finalized(&self) -> Option<&FinalizedQuote> {
        self.reducer.finalized()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Handles one realtime server event. Events that are not completed
    /// function calls produce no outcome.
    pub fn handle_server_event(&mut self, text: &str) -> Option<ToolOutcome> {
        match parse_server_event(text) {
            Ok(Some(call)) => Some(self.handle_call(&call)),
            Ok(None) => None,
            Err(error) => {
                warn!(
                    event_name = "intake.server_event.unparseable",
                    session_id = %self.session_id,
                    error = %error,
                    "skipping realtime server event that cannot be answered"
                );
                None
            }
        }
    }

    pub fn handle_call(&mut self, call: &ToolCall) -> ToolOutcome {
        self.stats.processed += 1;
        let context = AuditContext::new(
            Some(self.session_id.clone()),
            Some(call.call_id.clone()),
            call.call_id.clone(),
            ACTOR,
        );

        let event = match self.registry.decode(call) {
            Ok(event) => event,
            Err(error) => {
                self.stats.rejected += 1;
                self.audit.emit(
                    AuditEvent::new(
                        &context,
                        "intake.call_rejected",
                        AuditCategory::Session,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("tool", call.name.clone())
                    .with_metadata("error", error.to_string()),
                );
                return self.outcome(call, self.call_rejection(&error));
            }
        };

        let output = match self.reducer.apply_with_audit(&event, self.audit.as_ref(), &context) {
            Ok(transition) => {
                match &transition.effect {
                    IntakeEffect::FieldApplied(update) => {
                        self.stats.accepted += 1;
                        self.publisher.publish(transition.snapshot.clone());
                        let missing = self.reducer.missing_fields();
                        json!({
                            "ok": true,
                            "path": update.path(),
                            "value": update.value(),
                            "missing_fields": missing,
                            "next_field_prompt": missing.first().map(FieldPath::prompt),
                        })
                    }
                    IntakeEffect::Finalized(quote) => {
                        self.stats.accepted += 1;
                        self.publisher.publish(transition.snapshot.clone());
                        json!({ "ok": true, "finalized": true, "quote": quote })
                    }
                    IntakeEffect::Ignored => {
                        self.stats.ignored += 1;
                        json!({
                            "ok": true,
                            "ignored": true,
                            "reason": "the quote is already finalized",
                        })
                    }
                }
            }
            Err(error) => {
                self.stats.rejected += 1;
                self.domain_rejection(&error)
            }
        };

        self.outcome(call, output)
    }

    /// Consumes calls in arrival order until the sender side closes. The
    /// finalized quote, if any, is handed over exactly once.
    pub async fn run(
        mut self,
        mut calls: mpsc::Receiver<ToolCall>,
        outcomes: mpsc::Sender<ToolOutcome>,
        finalized: oneshot::Sender<FinalizedQuote>,
    ) -> SessionSummary {
        let mut finalized = Some(finalized);
        info!(event_name = "intake.session.started", session_id = %self.session_id, "intake session started");

        while let Some(call) = calls.recv().await {
            let outcome = self.handle_call(&call);
            if outcomes.send(outcome).await.is_err() {
                debug!(
                    event_name = "intake.outcome.dropped",
                    session_id = %self.session_id,
                    call_id = %call.call_id,
                    "outcome receiver closed"
                );
            }

            if let Some(quote) = self.reducer.finalized() {
                if let Some(sender) = finalized.take() {
                    if sender.send(quote.clone()).is_err() {
                        debug!(
                            event_name = "intake.finalized.unclaimed",
                            session_id = %self.session_id,
                            "finalized quote receiver closed"
                        );
                    }
                }
            }
        }

        info!(
            event_name = "intake.session.ended",
            session_id = %self.session_id,
            processed = self.stats.processed,
            accepted = self.stats.accepted,
            rejected = self.stats.rejected,
            finalized = self.reducer.finalized().is_some(),
            "intake session ended"
        );
        self.into_summary()
    }

    pub fn spawn(self, capacity: usize) -> SessionHandle {
        let capacity = capacity.max(1);
        let (calls_tx, calls_rx) = mpsc::channel(capacity);
        let (outcomes_tx, outcomes_rx) = mpsc::channel(capacity);
        let (finalized_tx, finalized_rx) = oneshot::channel();
        let observer = self.observer();
        let session_id = self.session_id.clone();

        let task = tokio::spawn(self.run(calls_rx, outcomes_tx, finalized_tx));
        SessionHandle {
            session_id,
            calls: calls_tx,
            outcomes: outcomes_rx,
            finalized: finalized_rx,
            observer,
            task,
        }
    }

    pub fn into_summary(self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id,
            stats: self.stats,
            snapshot: self.reducer.snapshot().clone(),
            finalized: self.reducer.finalized().cloned(),
        }
    }

    fn outcome(&self, call: &ToolCall, output: Value) -> ToolOutcome {
        ToolOutcome { call_id: call.call_id.clone(), output }
    }

    fn next_prompt(&self) -> Option<&'static str> {
        self.reducer.missing_fields().first().map(FieldPath::prompt)
    }

    fn call_rejection(&self, error: &ToolCallError) -> Value {
        json!({
            "ok": false,
            "error": error.to_string(),
            "re_ask": self.next_prompt(),
        })
    }

    fn domain_rejection(&self, error: &DomainError) -> Value {
        match error {
            DomainError::Validation(validation) => {
                let re_ask = validation.path().map(|path| path.prompt()).or_else(|| self.next_prompt());
                json!({
                    "ok": false,
                    "error": validation.to_string(),
                    "path": validation.path(),
                    "re_ask": re_ask,
                })
            }
            DomainError::CompletionValidation { missing, invalid } => {
                let invalid_fields: Vec<FieldPath> =
                    invalid.iter().filter_map(ValidationError::path).collect();
                let re_ask = invalid_fields
                    .first()
                    .or_else(|| missing.first())
                    .map(FieldPath::prompt)
                    .or_else(|| self.next_prompt());
                json!({
                    "ok": false,
                    "error": error.to_string(),
                    "missing_fields": missing,
                    "invalid_fields": invalid_fields,
                    "re_ask": re_ask,
                })
            }
        }
    }
}

/// Transport-facing ends of a spawned session.
///
/// `calls` and `outcomes` are both bounded by the spawn capacity and the
/// session waits for each outcome to be taken before reading the next call.
/// Drain `outcomes` concurrently with sending calls; a transport that only
/// sends stalls once both channels are full. Dropping `outcomes` is fine,
/// later outcomes are then discarded.
pub struct SessionHandle {
    pub session_id: String,
    pub calls: mpsc::Sender<ToolCall>,
    pub outcomes: mpsc::Receiver<ToolOutcome>,
    pub finalized: oneshot::Receiver<FinalizedQuote>,
    pub observer: PayloadObserver,
    pub task: JoinHandle<SessionSummary>,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use voicequote_core::audit::{AuditOutcome, InMemoryAuditSink};
    use voicequote_core::intake::IntakeState;

    use super::IntakeRuntime;
    use crate::tools::ToolCall;

    fn upsert(call_id: &str, path: &str, value: serde_json::Value) -> ToolCall {
        ToolCall::new(call_id, "payload_upsert", &json!({ "path": path, "value": value }))
    }

    fn complete_payload() -> serde_json::Value {
        json!({
            "vehicleDetails": { "make": "Honda", "model": "Civic", "year": 2019 },
            "previousClaims": { "claimMadeInLast3Years": false, "claimAtFault": false },
            "postalCode": "K1A0B1"
        })
    }

    #[test]
    fn accepted_upsert_reports_next_missing_field() {
        let mut runtime = IntakeRuntime::new();

        let outcome = runtime.handle_call(&upsert("call_1", "vehicleDetails.make", json!("Honda")));

        assert!(outcome.accepted());
        assert_eq!(outcome.call_id, "call_1");
        assert_eq!(outcome.output["path"], "vehicleDetails.make");
        assert_eq!(outcome.output["next_field_prompt"], "What model is it?");
        assert_eq!(runtime.observer().current().version, 1);
    }

    #[test]
    fn retracting_a_claim_re_asks_fault_instead_of_signalling_ready() {
        let mut runtime = IntakeRuntime::new();
        let calls = [
            upsert("c1", "vehicleDetails.make", json!("Honda")),
            upsert("c2", "vehicleDetails.model", json!("Civic")),
            upsert("c3", "vehicleDetails.year", json!(2019)),
            upsert("c4", "postalCode", json!("K1A0B1")),
            upsert("c5", "previousClaims.claimMadeInLast3Years", json!(true)),
            upsert("c6", "previousClaims.claimAtFault", json!(true)),
        ];
        for call in &calls {
            assert!(runtime.handle_call(call).accepted());
        }

        let outcome =
            runtime.handle_call(&upsert("c7", "previousClaims.claimMadeInLast3Years", json!(false)));

        assert!(outcome.accepted());
        assert_eq!(outcome.output["missing_fields"], json!(["previousClaims.claimAtFault"]));
        assert_eq!(outcome.output["next_field_prompt"], "Was the claim at fault?");
    }

    #[test]
    fn rejected_upsert_carries_reason_and_re_ask_prompt() {
        let mut runtime = IntakeRuntime::new();

        let outcome = runtime.handle_call(&upsert("call_1", "postalCode", json!("12345")));

        assert!(!outcome.accepted());
        assert_eq!(outcome.output["path"], "postalCode");
        assert_eq!(outcome.output["re_ask"], "What's your postal code (A1A1A1)?");
        assert!(outcome.output["error"].as_str().expect("error text").contains("A1A1A1"));
        assert_eq!(runtime.snapshot().version, 0);
        assert_eq!(runtime.stats().rejected, 1);
    }

    #[test]
    fn malformed_arguments_become_a_rejected_outcome() {
        let mut runtime = IntakeRuntime::new();
        let call = ToolCall {
            call_id: "call_7".to_string(),
            name: "payload_upsert".to_string(),
            arguments: "{\"path\":".to_string(),
        };

        let outcome = runtime.handle_call(&call);

        assert!(!outcome.accepted());
        assert_eq!(outcome.output["re_ask"], "What's your vehicle make?");
        assert_eq!(runtime.snapshot().state, IntakeState::Collecting);
    }

    #[test]
    fn incomplete_ready_lists_missing_fields() {
        let mut runtime = IntakeRuntime::new();
        let payload = json!({
            "vehicleDetails": { "make": "Honda", "model": "Civic", "year": 2019 },
            "previousClaims": { "claimMadeInLast3Years": true },
            "postalCode": "K1A0B1"
        });

        let outcome = runtime
            .handle_call(&ToolCall::new("call_9", "manager_ready", &json!({ "payload": payload })));

        assert!(!outcome.accepted());
        assert_eq!(outcome.output["missing_fields"], json!(["previousClaims.claimAtFault"]));
        assert_eq!(outcome.output["re_ask"], "Was the claim at fault?");
        assert_eq!(runtime.snapshot().state, IntakeState::Collecting);
    }

    #[test]
    fn server_events_drive_the_reducer_and_skip_other_types() {
        let mut runtime = IntakeRuntime::new();
        let done = json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_1",
            "name": "payload_upsert",
            "arguments": "{\"path\":\"vehicleDetails.year\",\"value\":2019}"
        });

        assert!(runtime.handle_server_event(&json!({ "type": "session.created" }).to_string()).is_none());
        assert!(runtime.handle_server_event("garbage").is_none());
        let outcome = runtime.handle_server_event(&done.to_string()).expect("tool call outcome");

        assert!(outcome.accepted());
        assert_eq!(runtime.snapshot().payload.vehicle_details.year, Some(2019));
    }

    #[test]
    fn function_call_without_a_name_still_gets_a_reply() {
        let mut runtime = IntakeRuntime::new();
        let nameless = json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_2",
            "arguments": "{}"
        });

        let outcome = runtime.handle_server_event(&nameless.to_string()).expect("rejection outcome");

        assert_eq!(outcome.call_id, "call_2");
        assert!(!outcome.accepted());
        assert_eq!(outcome.output["re_ask"], "What's your vehicle make?");
        assert_eq!(runtime.stats().rejected, 1);

        let anonymous = json!({ "type": "response.function_call_arguments.done", "name": "payload_upsert" });
        assert!(runtime.handle_server_event(&anonymous.to_string()).is_none());
        assert_eq!(runtime.stats().processed, 1);
    }

    #[test]
    fn audit_sink_sees_rejections_and_finalize() {
        let sink = InMemoryAuditSink::default();
        let mut runtime = IntakeRuntime::with_audit_sink(Arc::new(sink.clone()));

        runtime.handle_call(&ToolCall::new("call_1", "quote_now", &json!({})));
        runtime.handle_call(&ToolCall::new(
            "call_2",
            "manager_ready",
            &json!({ "payload": complete_payload() }),
        ));

        let events = sink.events();
        let types: Vec<&str> = events.iter().map(|event| event.event_type.as_str()).collect();
        assert_eq!(types, vec!["intake.call_rejected", "intake.finalized"]);
        assert_eq!(events[0].outcome, AuditOutcome::Rejected);
        assert_eq!(events[1].call_id.as_deref(), Some("call_2"));
        assert_eq!(events[1].session_id.as_deref(), Some(runtime.session_id()));
    }

    #[tokio::test]
    async fn small_capacity_session_keeps_up_when_outcomes_are_drained() {
        let mut handle = IntakeRuntime::new().spawn(1);
        let calls = handle.calls;

        let sender = tokio::spawn(async move {
            for index in 0..16 {
                let call = upsert(&format!("c{index}"), "vehicleDetails.make", json!("Honda"));
                calls.send(call).await.expect("runtime accepts calls");
            }
        });

        let mut received = 0;
        while let Some(outcome) = handle.outcomes.recv().await {
            assert_eq!(outcome.call_id, format!("c{received}"));
            received += 1;
        }
        sender.await.expect("sender finishes");

        assert_eq!(received, 16);
        let summary = handle.task.await.expect("session task completes");
        assert_eq!(summary.stats.accepted, 16);
    }

    #[tokio::test]
    async fn spawned_session_preserves_order_and_hands_over_quote() {
        let runtime = IntakeRuntime::new();
        let mut handle = runtime.spawn(8);

        let calls = vec![
            upsert("c1", "vehicleDetails.make", json!("Honda")),
            upsert("c2", "vehicleDetails.model", json!("Civic")),
            upsert("c3", "vehicleDetails.year", json!("nineteen")),
            upsert("c4", "vehicleDetails.year", json!(2019)),
            upsert("c5", "postalCode", json!("k1a 0b1")),
            upsert("c6", "previousClaims.claimMadeInLast3Years", json!(false)),
            ToolCall::new("c7", "manager_ready", &json!({ "payload": complete_payload() })),
            upsert("c8", "vehicleDetails.make", json!("Toyota")),
        ];
        for call in calls {
            handle.calls.send(call).await.expect("runtime accepts calls");
        }
        drop(handle.calls);

        let mut received = Vec::new();
        while let Some(outcome) = handle.outcomes.recv().await {
            received.push((outcome.call_id.clone(), outcome.accepted()));
        }
        assert_eq!(
            received,
            vec![
                ("c1".to_string(), true),
                ("c2".to_string(), true),
                ("c3".to_string(), false),
                ("c4".to_string(), true),
                ("c5".to_string(), true),
                ("c6".to_string(), true),
                ("c7".to_string(), true),
                ("c8".to_string(), true),
            ]
        );

        let quote = handle.finalized.await.expect("quote handed over");
        assert_eq!(quote.vehicle.make, "Honda");
        assert_eq!(quote.postal_code.as_str(), "K1A0B1");

        let summary = handle.task.await.expect("session task completes");
        assert_eq!(summary.stats.processed, 8);
        assert_eq!(summary.stats.rejected, 1);
        assert_eq!(summary.stats.ignored, 1);
        assert_eq!(summary.snapshot.state, IntakeState::Finalized);
        assert_eq!(handle.observer.current().version, 6);
    }
}
