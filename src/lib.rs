pub mod commands;
pub mod control;
pub mod error;
pub mod fs;
pub mod models;
pub mod orchestrator;
pub mod params;
pub mod runs;
pub mod utils;
pub mod validation;

pub use error::{ErrorClass, PipelineError, Result};
