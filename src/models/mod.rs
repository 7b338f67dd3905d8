pub mod failure;
pub mod run_id;
pub mod run_state;
pub mod stage;

pub use failure::FailureInfo;
pub use run_id::RunIdentifier;
pub use run_state::{Provenance, RunState};
pub use stage::{StageId, StagePhase};
