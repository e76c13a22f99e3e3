pub mod error;
pub mod event;
pub mod machine;
pub mod model;
mod orchestrator;
pub mod policy;

pub use error::{StateError, StateResult, SubmitError, ValidationError};
pub use event::{EnhancementEvent, StatusTransition};
pub use machine::EnhancementMachine;
pub use model::{EnhancementOutcome, EnhancementRequest, EnhancementSnapshot, EnhancementStatus, Submission};
pub use orchestrator::EnhancementOrchestrator;
pub use policy::RetryPolicy;
