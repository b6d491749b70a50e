pub mod failure_state;
pub mod reporter;

pub use failure_state::{FailureState, FailureStateSnapshot, HealthClass};
pub use reporter::UsageReporter;
