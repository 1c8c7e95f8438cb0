use thiserror::Error;

use crate::domain::payload::FieldPath;

/// Rejection of a single tool-call argument.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown field path `{path}`")]
    UnknownPath { path: String },
    #[error("{path} expects a {expected} value, got {found}")]
    TypeMismatch { path: FieldPath, expected: &'static str, found: &'static str },
    #[error("{path} {reason}")]
    InvalidValue { path: FieldPath, reason: String },
    #[error("{path} value `{value}` does not match the {pattern} format")]
    PatternMismatch { path: FieldPath, value: String, pattern: &'static str },
}

impl ValidationError {
    pub fn path(&self) -> Option<FieldPath> {
        match self {
            Self::UnknownPath { .. } => None,
            Self::TypeMismatch { path, .. }
            | Self::InvalidValue { path, .. }
            | Self::PatternMismatch { path, .. } => Some(*path),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("payload is not complete: {}", describe_incomplete(.missing, .invalid))]
    CompletionValidation { missing: Vec<FieldPath>, invalid: Vec<ValidationError> },
}

fn describe_incomplete(missing: &[FieldPath], invalid: &[ValidationError]) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        let paths: Vec<&str> = missing.iter().map(FieldPath::as_str).collect();
        parts.push(format!("missing {}", paths.join(", ")));
    }
    if !invalid.is_empty() {
        let reasons: Vec<String> = invalid.iter().map(ToString::to_string).collect();
        parts.push(format!("invalid {}", reasons.join("; ")));
    }
    if parts.is_empty() {
        return "no fields supplied".to_string();
    }
    parts.join("; ")
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("upstream responded with status {status}")]
    Upstream { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("upstream status {status}")]
    Upstream { status: u16, body: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Upstream { status, .. } => *status,
            Self::Internal { .. } => 500,
        }
    }

    /// Response body text. Upstream failures are passed through verbatim.
    pub fn body(&self) -> &str {
        match self {
            Self::BadRequest { message, .. } | Self::Internal { message, .. } => message,
            Self::Upstream { body, .. } => body,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Upstream { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Upstream { status, body } => {
                Self::Upstream { status, body, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Transport(message) => Self::Internal {
                message: format!("realtime init failed: {message}"),
                correlation_id: "unassigned".to_owned(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::payload::FieldPath;
    use crate::errors::{ApplicationError, DomainError, InterfaceError, ValidationError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::CompletionValidation {
            missing: vec![FieldPath::PostalCode],
            invalid: Vec::new(),
        })
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(interface.status_code(), 400);
        assert!(interface.body().contains("missing postalCode"));
    }

    #[test]
    fn upstream_error_passes_status_and_body_through() {
        let interface = ApplicationError::Upstream {
            status: 401,
            body: "{\"error\":\"invalid_api_key\"}".to_owned(),
        }
        .into_interface("req-2");

        assert_eq!(interface.status_code(), 401);
        assert_eq!(interface.body(), "{\"error\":\"invalid_api_key\"}");
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("Missing OPENAI_API_KEY".to_owned())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.status_code(), 500);
        assert_eq!(interface.body(), "Missing OPENAI_API_KEY");
    }

    #[test]
    fn transport_error_carries_underlying_message() {
        let interface =
            ApplicationError::Transport("connection refused".to_owned()).into_interface("req-4");

        assert_eq!(interface.status_code(), 500);
        assert_eq!(interface.body(), "realtime init failed: connection refused");
    }

    #[test]
    fn incomplete_payload_message_lists_paths_and_reasons() {
        let error = DomainError::CompletionValidation {
            missing: vec![FieldPath::VehicleMake, FieldPath::ClaimAtFault],
            invalid: vec![ValidationError::UnknownPath { path: "color".to_owned() }],
        };

        assert_eq!(
            error.to_string(),
            "payload is not complete: missing vehicleDetails.make, previousClaims.claimAtFault; \
             invalid unknown field path `color`"
        );
    }
}
