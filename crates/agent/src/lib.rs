//! Agent runtime - realtime session negotiation and tool-call mediation
//!
//! This crate sits between the upstream realtime voice agent and the
//! deterministic payload reducer in `voicequote-core`:
//! - Declares the fixed realtime session (voice, turn detection, tools,
//!   instructions) that the agent runs under
//! - Mints ephemeral client credentials through the token broker
//! - Decodes the agent's tool calls into reducer events
//! - Republishes every accepted snapshot to observers
//!
//! # Architecture
//!
//! 1. **Negotiation** (`session`) - fixed `POST /v1/realtime/sessions` body
//! 2. **Credentials** (`broker`) - one outbound call per token, no caching
//! 3. **Decoding** (`tools`) - realtime server events → `IntakeEvent`
//! 4. **Reduction** (`runtime`) - ordered event queue feeding the reducer
//! 5. **Fan-out** (`observer`) - current-value snapshot delivery
//!
//! # Safety Principle
//!
//! The agent is strictly a parser of natural language. It never writes the
//! payload directly: every field it reports is validated by the reducer, and
//! rejections are fed back so the agent re-asks.

pub mod broker;
pub mod observer;
pub mod runtime;
pub mod session;
pub mod tools;
