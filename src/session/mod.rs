mod binder;
mod coordinator;

pub use binder::{BindError, ContainerTicket, PrepareOutcome, SessionBinder};
pub use coordinator::{Completed, ExecutionCoordinator, ExecutionResult, ExecutionStatus, SaveError};
