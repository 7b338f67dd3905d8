//! Run resolution and persistence

pub mod locator;
pub mod manager;

pub use locator::locate_prior_run;
pub use manager::{CommittedRun, RunStateManager, StagedRun, SCHEMA_VERSION};
