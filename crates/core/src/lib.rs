pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod intake;

pub use domain::payload::{
    ClaimHistory, FieldPath, FieldUpdate, FinalizedQuote, PostalCode, PreviousClaims,
    QuotePayload, Vehicle, VehicleDetails,
};
pub use errors::{ApplicationError, DomainError, InterfaceError, ValidationError};
pub use intake::{IntakeEffect, IntakeEvent, IntakeState, PayloadReducer, Snapshot, TransitionOutcome};
