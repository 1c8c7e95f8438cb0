use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::{DomainError, ValidationError};

pub const POSTAL_CODE_PATTERN: &str = "A1A1A1";
const YEAR_RANGE: std::ops::RangeInclusive<u64> = 1000..=9999;

/// One of the six dotted paths the agent is allowed to write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldPath {
    #[serde(rename = "vehicleDetails.make")]
    VehicleMake,
    #[serde(rename = "vehicleDetails.model")]
    VehicleModel,
    #[serde(rename = "vehicleDetails.year")]
    VehicleYear,
    #[serde(rename = "postalCode")]
    PostalCode,
    #[serde(rename = "previousClaims.claimMadeInLast3Years")]
    ClaimMadeInLast3Years,
    #[serde(rename = "previousClaims.claimAtFault")]
    ClaimAtFault,
}

impl FieldPath {
    /// Asking order: vehicle, postal code, then claim history.
    pub const ALL: [FieldPath; 6] = [
        FieldPath::VehicleMake,
        FieldPath::VehicleModel,
        FieldPath::VehicleYear,
        FieldPath::PostalCode,
        FieldPath::ClaimMadeInLast3Years,
        FieldPath::ClaimAtFault,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VehicleMake => "vehicleDetails.make",
            Self::VehicleModel => "vehicleDetails.model",
            Self::VehicleYear => "vehicleDetails.year",
            Self::ClaimMadeInLast3Years => "previousClaims.claimMadeInLast3Years",
            Self::ClaimAtFault => "previousClaims.claimAtFault",
            Self::PostalCode => "postalCode",
        }
    }

    /// Location of the field inside a full payload object.
    pub fn json_pointer(&self) -> &'static str {
        match self {
            Self::VehicleMake => "/vehicleDetails/make",
            Self::VehicleModel => "/vehicleDetails/model",
            Self::VehicleYear => "/vehicleDetails/year",
            Self::ClaimMadeInLast3Years => "/previousClaims/claimMadeInLast3Years",
            Self::ClaimAtFault => "/previousClaims/claimAtFault",
            Self::PostalCode => "/postalCode",
        }
    }

    /// The short question used to ask the caller for this field.
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::VehicleMake => "What's your vehicle make?",
            Self::VehicleModel => "What model is it?",
            Self::VehicleYear => "What year is the vehicle?",
            Self::ClaimMadeInLast3Years => "In the last 3 years, did you file any claims?",
            Self::ClaimAtFault => "Was the claim at fault?",
            Self::PostalCode => "What's your postal code (A1A1A1)?",
        }
    }

    pub fn expected_type(&self) -> &'static str {
        match self {
            Self::VehicleMake | Self::VehicleModel | Self::PostalCode => "string",
            Self::VehicleYear => "integer",
            Self::ClaimMadeInLast3Years | Self::ClaimAtFault => "boolean",
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldPath {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|path| path.as_str() == value.trim())
            .ok_or_else(|| ValidationError::UnknownPath { path: value.to_string() })
    }
}

/// Postal code in canonical `A1A1A1` form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PostalCode(String);

impl PostalCode {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalized = normalize_postal_code(raw);
        if matches_postal_pattern(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(ValidationError::PatternMismatch {
                path: FieldPath::PostalCode,
                value: raw.to_string(),
                pattern: POSTAL_CODE_PATTERN,
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PostalCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Uppercases and drops whitespace and hyphens. Applying it twice is a no-op.
pub fn normalize_postal_code(raw: &str) -> String {
    raw.chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '-')
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

fn matches_postal_pattern(candidate: &str) -> bool {
    let bytes = candidate.as_bytes();
    bytes.len() == POSTAL_CODE_PATTERN.len()
        && bytes.iter().enumerate().all(|(index, byte)| {
            if index % 2 == 0 {
                byte.is_ascii_uppercase()
            } else {
                byte.is_ascii_digit()
            }
        })
}

/// A single typed field write. Decoding the agent's untyped `(path, value)`
/// pair is the only way to build one from the outside.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldUpdate {
    Make(String),
    Model(String),
    Year(u16),
    ClaimMadeInLast3Years(bool),
    ClaimAtFault(bool),
    PostalCode(PostalCode),
}

impl FieldUpdate {
    pub fn decode(path: &str, value: &Value) -> Result<Self, ValidationError> {
        Self::decode_at(path.parse()?, value)
    }

    pub fn decode_at(path: FieldPath, value: &Value) -> Result<Self, ValidationError> {
        match path {
            FieldPath::VehicleMake => non_empty_string(path, value).map(Self::Make),
            FieldPath::VehicleModel => non_empty_string(path, value).map(Self::Model),
            FieldPath::VehicleYear => decode_year(value).map(Self::Year),
            FieldPath::ClaimMadeInLast3Years => {
                boolean(path, value).map(Self::ClaimMadeInLast3Years)
            }
            FieldPath::ClaimAtFault => boolean(path, value).map(Self::ClaimAtFault),
            FieldPath::PostalCode => {
                let raw = value.as_str().ok_or_else(|| type_mismatch(path, value))?;
                PostalCode::parse(raw).map(Self::PostalCode)
            }
        }
    }

    pub fn path(&self) -> FieldPath {
        match self {
            Self::Make(_) => FieldPath::VehicleMake,
            Self::Model(_) => FieldPath::VehicleModel,
            Self::Year(_) => FieldPath::VehicleYear,
            Self::ClaimMadeInLast3Years(_) => FieldPath::ClaimMadeInLast3Years,
            Self::ClaimAtFault(_) => FieldPath::ClaimAtFault,
            Self::PostalCode(_) => FieldPath::PostalCode,
        }
    }

    pub fn value(&self) -> Value {
        match self {
            Self::Make(value) | Self::Model(value) => Value::from(value.as_str()),
            Self::Year(year) => Value::from(*year),
            Self::ClaimMadeInLast3Years(flag) | Self::ClaimAtFault(flag) => Value::from(*flag),
            Self::PostalCode(code) => Value::from(code.as_str()),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_mismatch(path: FieldPath, value: &Value) -> ValidationError {
    ValidationError::TypeMismatch { path, expected: path.expected_type(), found: json_kind(value) }
}

fn non_empty_string(path: FieldPath, value: &Value) -> Result<String, ValidationError> {
    let raw = value.as_str().ok_or_else(|| type_mismatch(path, value))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidValue {
            path,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn boolean(path: FieldPath, value: &Value) -> Result<bool, ValidationError> {
    value.as_bool().ok_or_else(|| type_mismatch(path, value))
}

fn decode_year(value: &Value) -> Result<u16, ValidationError> {
    let path = FieldPath::VehicleYear;
    let number = match value {
        Value::Number(number) => number,
        other => return Err(type_mismatch(path, other)),
    };

    // Schema-level type is `number`, so `2019.0` arrives for some turns.
    let whole = match (number.as_u64(), number.as_f64()) {
        (Some(whole), _) => Some(whole),
        (None, Some(float)) if float.fract() == 0.0 && float >= 0.0 => Some(float as u64),
        _ => None,
    };

    match whole {
        Some(year) if YEAR_RANGE.contains(&year) => Ok(year as u16),
        _ => Err(ValidationError::InvalidValue {
            path,
            reason: format!("must be a 4-digit year, got {number}"),
        }),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousClaims {
    #[serde(
        rename = "claimMadeInLast3Years",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub claim_made_in_last_3_years: Option<bool>,
    #[serde(rename = "claimAtFault", default, skip_serializing_if = "Option::is_none")]
    pub claim_at_fault: Option<bool>,
}

/// The quote as collected so far. Every field stays optional until finalize.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePayload {
    #[serde(rename = "vehicleDetails", default)]
    pub vehicle_details: VehicleDetails,
    #[serde(rename = "previousClaims", default)]
    pub previous_claims: PreviousClaims,
    #[serde(rename = "postalCode", default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<PostalCode>,
}

impl QuotePayload {
    /// Returns a new payload with exactly one field replaced.
    pub fn with_update(&self, update: &FieldUpdate) -> Self {
        let mut next = self.clone();
        match update {
            FieldUpdate::Make(make) => next.vehicle_details.make = Some(make.clone()),
            FieldUpdate::Model(model) => next.vehicle_details.model = Some(model.clone()),
            FieldUpdate::Year(year) => next.vehicle_details.year = Some(*year),
            FieldUpdate::ClaimMadeInLast3Years(flag) => {
                next.previous_claims.claim_made_in_last_3_years = Some(*flag)
            }
            FieldUpdate::ClaimAtFault(flag) => next.previous_claims.claim_at_fault = Some(*flag),
            FieldUpdate::PostalCode(code) => next.postal_code = Some(code.clone()),
        }
        next
    }

    pub fn is_set(&self, path: FieldPath) -> bool {
        match path {
            FieldPath::VehicleMake => self.vehicle_details.make.is_some(),
            FieldPath::VehicleModel => self.vehicle_details.model.is_some(),
            FieldPath::VehicleYear => self.vehicle_details.year.is_some(),
            FieldPath::ClaimMadeInLast3Years => {
                self.previous_claims.claim_made_in_last_3_years.is_some()
            }
            FieldPath::ClaimAtFault => self.previous_claims.claim_at_fault.is_some(),
            FieldPath::PostalCode => self.postal_code.is_some(),
        }
    }

    /// Fields still required, in asking order. Fault is only required once a
    /// claim has been reported, and stays outstanding while it contradicts a
    /// "no claim" answer.
    pub fn missing_fields(&self) -> Vec<FieldPath> {
        let claim_reported = self.previous_claims.claim_made_in_last_3_years == Some(true);
        let contradictory = self.has_contradictory_fault();
        FieldPath::ALL
            .into_iter()
            .filter(|path| *path != FieldPath::ClaimAtFault || claim_reported || contradictory)
            .filter(|path| !self.is_set(*path) || (*path == FieldPath::ClaimAtFault && contradictory))
            .collect()
    }

    /// At fault while no claim was made in the last 3 years.
    pub fn has_contradictory_fault(&self) -> bool {
        self.previous_claims.claim_made_in_last_3_years == Some(false)
            && self.previous_claims.claim_at_fault == Some(true)
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Decodes a candidate payload field by field, collecting every problem
    /// instead of stopping at the first one.
    pub fn from_candidate(candidate: &Value) -> Result<Self, DomainError> {
        if !candidate.is_object() {
            return Err(DomainError::CompletionValidation {
                missing: FieldPath::ALL.to_vec(),
                invalid: Vec::new(),
            });
        }

        let mut payload = Self::default();
        let mut invalid = Vec::new();
        for path in FieldPath::ALL {
            match candidate.pointer(path.json_pointer()) {
                None | Some(Value::Null) => {}
                Some(value) => match FieldUpdate::decode_at(path, value) {
                    Ok(update) => payload = payload.with_update(&update),
                    Err(error) => invalid.push(error),
                },
            }
        }

        if invalid.is_empty() {
            Ok(payload)
        } else {
            let missing = payload
                .missing_fields()
                .into_iter()
                .filter(|path| !invalid.iter().any(|error| error.path() == Some(*path)))
                .collect();
            Err(DomainError::CompletionValidation { missing, invalid })
        }
    }

    pub fn finalize(&self) -> Result<FinalizedQuote, DomainError> {
        let mut missing = self.missing_fields();
        if self.has_contradictory_fault() {
            missing.retain(|path| *path != FieldPath::ClaimAtFault);
            return Err(DomainError::CompletionValidation {
                missing,
                invalid: vec![ValidationError::InvalidValue {
                    path: FieldPath::ClaimAtFault,
                    reason: "cannot be true when no claim was made in the last 3 years"
                        .to_string(),
                }],
            });
        }
        if !missing.is_empty() {
            return Err(DomainError::CompletionValidation { missing, invalid: Vec::new() });
        }

        let claim_made = self.previous_claims.claim_made_in_last_3_years.unwrap_or(false);
        let claim_at_fault = self.previous_claims.claim_at_fault.unwrap_or(false);

        match (
            &self.vehicle_details.make,
            &self.vehicle_details.model,
            self.vehicle_details.year,
            &self.postal_code,
        ) {
            (Some(make), Some(model), Some(year), Some(postal_code)) => Ok(FinalizedQuote {
                vehicle: Vehicle { make: make.clone(), model: model.clone(), year },
                claims: ClaimHistory { claim_made_in_last_3_years: claim_made, claim_at_fault },
                postal_code: postal_code.clone(),
            }),
            _ => Err(DomainError::CompletionValidation {
                missing: self.missing_fields(),
                invalid: Vec::new(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub make: String,
    pub model: String,
    pub year: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimHistory {
    #[serde(rename = "claimMadeInLast3Years")]
    pub claim_made_in_last_3_years: bool,
    #[serde(rename = "claimAtFault")]
    pub claim_at_fault: bool,
}

/// A complete quote, frozen at finalize and handed to the owning application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedQuote {
    #[serde(rename = "vehicleDetails")]
    pub vehicle: Vehicle,
    #[serde(rename = "previousClaims")]
    pub claims: ClaimHistory,
    #[serde(rename = "postalCode")]
    pub postal_code: PostalCode,
}

impl From<&FinalizedQuote> for QuotePayload {
    fn from(quote: &FinalizedQuote) -> Self {
        Self {
            vehicle_details: VehicleDetails {
                make: Some(quote.vehicle.make.clone()),
                model: Some(quote.vehicle.model.clone()),
                year: Some(quote.vehicle.year),
            },
            previous_claims: PreviousClaims {
                claim_made_in_last_3_years: Some(quote.claims.claim_made_in_last_3_years),
                claim_at_fault: Some(quote.claims.claim_at_fault),
            },
            postal_code: Some(quote.postal_code.clone()),
        }
    }
}
