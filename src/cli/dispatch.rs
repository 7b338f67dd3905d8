use anyhow::Result;
use stagehand::commands::{params, runs, show};

use super::types::Commands;

pub fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Params {
            control_file,
            stage,
            root,
        } => params::execute(&control_file, stage, root.as_deref()),
        Commands::Runs { root, stage } => runs::list(&root, stage),
        Commands::Locate {
            root,
            stage,
            hint,
            suffix,
        } => runs::locate(&root, stage, hint.as_deref(), suffix.as_deref()),
        Commands::Show { run_dir } => show::execute(&run_dir),
    }
}
