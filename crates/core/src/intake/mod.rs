pub mod reducer;
pub mod states;

pub use reducer::{transition, PayloadReducer};
pub use states::{IntakeEffect, IntakeEvent, IntakeState, Snapshot, TransitionOutcome};
