use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use voicequote_core::domain::payload::FieldPath;
use voicequote_core::intake::IntakeEvent;

/// Realtime server event carrying a completed function call.
pub const FUNCTION_CALL_DONE: &str = "response.function_call_arguments.done";

/// Function tool as declared in the realtime session request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDeclaration {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// A function call emitted by the agent, arguments still a JSON string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: &Value) -> Self {
        Self { call_id: call_id.into(), name: name.into(), arguments: arguments.to_string() }
    }
}

/// Result of one tool call, sent back to the agent as a
/// `function_call_output` item.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolOutcome {
    pub call_id: String,
    pub output: Value,
}

impl ToolOutcome {
    pub fn accepted(&self) -> bool {
        self.output.get("ok").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn to_conversation_item(&self) -> Value {
        json!({
            "type": "conversation.item.create",
            "item": {
                "type": "function_call_output",
                "call_id": self.call_id,
                "output": self.output.to_string(),
            }
        })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolCallError {
    #[error("unknown tool `{name}`")]
    UnknownTool { name: String },
    #[error("malformed arguments for `{tool}`: {reason}")]
    MalformedArguments { tool: &'static str, reason: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpsertArguments {
    path: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadyArguments {
    payload: Value,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDeclaration>,
}

impl ToolRegistry {
    /// The two tools the intake agent may call.
    pub fn intake() -> Self {
        let mut registry = Self::default();
        registry.register(payload_upsert_declaration());
        registry.register(manager_ready_declaration());
        registry
    }

    pub fn register(&mut self, tool: ToolDeclaration) {
        self.tools.retain(|existing| existing.name != tool.name);
        self.tools.push(tool);
    }

    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Turns a raw call into a reducer event. Only the argument envelope is
    /// checked here; field paths and values are the reducer's job.
    pub fn decode(&self, call: &ToolCall) -> Result<IntakeEvent, ToolCallError> {
        let declared = self.tools.iter().find(|tool| tool.name == call.name).ok_or_else(|| {
            ToolCallError::UnknownTool { name: call.name.clone() }
        })?;
        let tool = declared.name;

        let malformed =
            |error: serde_json::Error| ToolCallError::MalformedArguments { tool, reason: error.to_string() };

        match tool {
            IntakeEvent::PAYLOAD_UPSERT => {
                let args: UpsertArguments =
                    serde_json::from_str(&call.arguments).map_err(malformed)?;
                Ok(IntakeEvent::PayloadUpsert { path: args.path, value: args.value })
            }
            IntakeEvent::MANAGER_READY => {
                let args: ReadyArguments =
                    serde_json::from_str(&call.arguments).map_err(malformed)?;
                Ok(IntakeEvent::ManagerReady { payload: args.payload })
            }
            other => Err(ToolCallError::UnknownTool { name: other.to_string() }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerEventError {
    #[error("server event is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("function call event has no call_id to reply to")]
    MissingCallId,
}

/// Extracts a tool call from one realtime server event. Events of any other
/// type yield `None`. A missing name or arguments still yields a call, so
/// the decoder can reject it and the agent gets a reply.
pub fn parse_server_event(text: &str) -> Result<Option<ToolCall>, ServerEventError> {
    let event: Value = serde_json::from_str(text)?;
    if event.get("type").and_then(Value::as_str) != Some(FUNCTION_CALL_DONE) {
        return Ok(None);
    }

    let field = |key: &str| event.get(key).and_then(Value::as_str);
    let call_id = field("call_id")
        .filter(|id| !id.trim().is_empty())
        .ok_or(ServerEventError::MissingCallId)?;
    Ok(Some(ToolCall {
        call_id: call_id.to_string(),
        name: field("name").unwrap_or_default().to_string(),
        arguments: field("arguments").unwrap_or_default().to_string(),
    }))
}

fn payload_upsert_declaration() -> ToolDeclaration {
    let paths: Vec<&str> = FieldPath::ALL.iter().map(FieldPath::as_str).collect();
    ToolDeclaration {
        kind: "function",
        name: IntakeEvent::PAYLOAD_UPSERT,
        description: "Update exactly one field in the quote payload.",
        parameters: json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "enum": paths },
                "value": {}
            },
            "required": ["path", "value"],
            "additionalProperties": false
        }),
    }
}

fn manager_ready_declaration() -> ToolDeclaration {
    ToolDeclaration {
        kind: "function",
        name: IntakeEvent::MANAGER_READY,
        description: "All required fields captured and validated. Return the final payload.",
        parameters: json!({
            "type": "object",
            "properties": {
                "payload": {
                    "type": "object",
                    "properties": {
                        "vehicleDetails": {
                            "type": "object",
                            "properties": {
                                "make": { "type": "string" },
                                "model": { "type": "string" },
                                "year": { "type": "number" }
                            },
                            "required": ["make", "model", "year"]
                        },
                        "previousClaims": {
                            "type": "object",
                            "properties": {
                                "claimMadeInLast3Years": { "type": "boolean" },
                                "claimAtFault": { "type": "boolean" }
                            },
                            "required": ["claimMadeInLast3Years", "claimAtFault"]
                        },
                        "postalCode": { "type": "string" }
                    },
                    "required": ["vehicleDetails", "previousClaims", "postalCode"]
                }
            },
            "required": ["payload"],
            "additionalProperties": false
        }),
    }
}
