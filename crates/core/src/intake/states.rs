use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::payload::{FieldUpdate, FinalizedQuote, QuotePayload};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeState {
    Collecting,
    Finalized,
}

/// A tool call as emitted by the agent, arguments still untyped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum IntakeEvent {
    PayloadUpsert { path: String, value: Value },
    ManagerReady { payload: Value },
}

impl IntakeEvent {
    pub const PAYLOAD_UPSERT: &'static str = "payload_upsert";
    pub const MANAGER_READY: &'static str = "manager_ready";

    pub fn upsert(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::PayloadUpsert { path: path.into(), value: value.into() }
    }

    pub fn manager_ready(payload: Value) -> Self {
        Self::ManagerReady { payload }
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::PayloadUpsert { .. } => Self::PAYLOAD_UPSERT,
            Self::ManagerReady { .. } => Self::MANAGER_READY,
        }
    }
}

/// Immutable view of the payload. Cloning shares the payload allocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub version: u64,
    pub state: IntakeState,
    pub payload: Arc<QuotePayload>,
}

impl Snapshot {
    pub fn initial() -> Self {
        Self { version: 0, state: IntakeState::Collecting, payload: Arc::new(QuotePayload::default()) }
    }

    pub fn is_finalized(&self) -> bool {
        self.state == IntakeState::Finalized
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::initial()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntakeEffect {
    FieldApplied(FieldUpdate),
    Finalized(FinalizedQuote),
    /// The session was already finalized; nothing changed.
    Ignored,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: IntakeState,
    pub to: IntakeState,
    pub event: &'static str,
    pub effect: IntakeEffect,
    pub snapshot: Snapshot,
}

impl TransitionOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self.effect, IntakeEffect::Ignored)
    }
}
