use serde::Serialize;
use voicequote_core::config::RealtimeConfig;
use voicequote_core::domain::payload::FieldPath;

use crate::tools::{ToolDeclaration, ToolRegistry};

pub const OFF_TOPIC_REFUSAL_TEMPLATE: &str =
    "Let's stay focused on your auto-insurance quote. I can't discuss that right now. ${NEXT_FIELD_PROMPT}";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub threshold: f64,
    pub silence_duration_ms: u32,
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self { kind: "server_vad", threshold: 0.6, silence_duration_ms: 900 }
    }
}

/// Body of the upstream session-issuance call. Everything except model and
/// voice is fixed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionRequest {
    pub model: String,
    pub voice: String,
    pub turn_detection: TurnDetection,
    pub tools: Vec<ToolDeclaration>,
    pub instructions: String,
}

impl SessionRequest {
    pub fn intake(model: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            voice: voice.into(),
            turn_detection: TurnDetection::default(),
            tools: ToolRegistry::intake().declarations().to_vec(),
            instructions: intake_instructions(),
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::intake(config.model.clone(), config.voice.clone())
    }
}

pub fn intake_instructions() -> String {
    let mut next_field_prompts = String::new();
    for path in FieldPath::ALL {
        let line = match path {
            FieldPath::ClaimMadeInLast3Years => {
                format!("• \"{}\" (If the answer is no, skip asking about fault)\n", path.prompt())
            }
            FieldPath::ClaimAtFault => format!("• \"If yes: {}\"\n", path.prompt()),
            _ => format!("• \"{}\" OR\n", path.prompt()),
        };
        next_field_prompts.push_str(&line);
    }

    format!(
        r#"You are a friendly, casual auto-insurance intake assistant. Stay strictly on auto insurance; ignore topics like mileage, commute, etc.

TARGET PAYLOAD:
{{
  "vehicleDetails": {{ "make": string, "model": string, "year": number }},
  "previousClaims": {{ "claimMadeInLast3Years": boolean, "claimAtFault": boolean }},
  "postalCode": "string"
}}

VALIDATION:
• Postal → uppercase A1A1A1 with no spaces. • Year is 4 digits (e.g., 2017).

CRITICAL RULES:
1) Scope guard: Before answering, first decide if the user message helps complete the TARGET PAYLOAD.
  • If YES → proceed.
  • If NO → reply with the OFF-TOPIC REFUSAL TEMPLATE and immediately ask exactly one missing field.
2) Use the tools exclusively to record fields (payload_upsert for each field, then manager_ready when complete). Never reveal or describe tool calls.
3) Ask exactly ONE missing field at a time. Keep replies short, warm, and human, with no interrogation vibe.
4) Only acknowledge/thank if you actually recorded a field via tool call in this turn. If unclear/noise, apologize briefly and re-ask the SAME missing field.
5) Do NOT proactively speak before the user says anything.
6) No promises: Do not say you will chat later or after completion. If off-topic persists, repeat the OFF-TOPIC REFUSAL TEMPLATE verbatim and re-ask the same missing field.
7) Never go outside the schema above or ask about miles, usage, etc.
8) If a tool call result reports ok=false, apologize briefly and re-ask that field using the re_ask question it returns.

OFF-TOPIC REFUSAL TEMPLATE
"{OFF_TOPIC_REFUSAL_TEMPLATE}"

NEXT_FIELD_PROMPT should be a single short question for the next missing field, e.g.:
{next_field_prompts}"#
    )
}
