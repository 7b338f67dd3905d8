use clap::{Parser, Subcommand};
use stagehand::models::stage::StageId;
use stagehand::validation::clap_hint_validator;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Inspect control files and run directories of a staged reduction", long_about = None)]
#[command(version)]
#[command(subcommand_help_heading = "Commands")]
pub struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a control file and show the typed parameters a stage would receive
    Params {
        /// Path to the control file
        control_file: PathBuf,

        /// Stage the control file drives (1-6, S1-S6, Stage1-Stage6)
        #[arg(short, long)]
        stage: StageId,

        /// Project root (defaults to the control file's directory)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// List the committed runs of a stage
    Runs {
        /// Project root holding the stage subtrees
        #[arg(long, default_value = ".")]
        root: PathBuf,

        #[arg(short, long)]
        stage: StageId,
    },

    /// Show which upstream run a stage would resume from
    Locate {
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Stage about to run (its predecessor is searched)
        #[arg(short, long)]
        stage: StageId,

        /// Run identifier, run directory name or identifier prefix
        #[arg(long, value_parser = clap_hint_validator)]
        hint: Option<String>,

        /// Expected input suffix (defaults to the stage's usual input product)
        #[arg(long)]
        suffix: Option<String>,
    },

    /// Print the committed run state of a run directory
    Show {
        run_dir: PathBuf,
    },
}
