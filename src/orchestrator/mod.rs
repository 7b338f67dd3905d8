//! Stage orchestration
//!
//! Sequences one stage invocation: locate the upstream run, build typed
//! parameters, call the external stage function, commit the new run state.

pub mod invocation;
pub mod pipeline;
pub mod request;
pub mod skip;
pub mod stage_fn;

pub use invocation::{Orchestrator, StageFailure, StageOutcome};
pub use pipeline::{Pipeline, PipelineFailure};
pub use request::StageRequest;
pub use skip::resolve_skipped_steps;
pub use stage_fn::{StageContext, StageFunction};
