pub mod project;
pub mod run_dirs;
pub mod run_log;

pub use project::{load_config, load_config_or_default, ProjectConfig, ProjectLayout, CONFIG_FILE};
pub use run_dirs::{list_runs, RunDirectory};
pub use run_log::RunLog;
