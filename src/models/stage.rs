use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// One of the six ordered pipeline stages.
///
/// Stage 1 turns raw detector ramps into rate images and has no upstream run;
/// every later stage consumes the committed output of its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageId {
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
}

impl StageId {
    pub const ALL: [StageId; 6] = [
        StageId::S1,
        StageId::S2,
        StageId::S3,
        StageId::S4,
        StageId::S5,
        StageId::S6,
    ];

    /// 1-based stage number.
    pub fn index(self) -> u8 {
        match self {
            StageId::S1 => 1,
            StageId::S2 => 2,
            StageId::S3 => 3,
            StageId::S4 => 4,
            StageId::S5 => 5,
            StageId::S6 => 6,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index).checked_sub(1)?).copied()
    }

    /// The stage whose output this stage consumes.
    pub fn predecessor(self) -> Option<Self> {
        Self::from_index(self.index() - 1)
    }

    pub fn successor(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    /// Root stages read raw data and never resume from a prior run.
    pub fn is_root(self) -> bool {
        self == StageId::S1
    }

    /// Name of the stage subtree under the output directory, e.g. `Stage3`.
    pub fn dir_name(self, prefix: &str) -> String {
        format!("{prefix}{}", self.index())
    }

    /// File-name token of the data product this stage expects as input.
    pub fn default_input_suffix(self) -> &'static str {
        match self {
            StageId::S1 => "uncal",
            StageId::S2 => "rateints",
            StageId::S3 => "calints",
            StageId::S4 => "SpecData",
            StageId::S5 => "LCData",
            StageId::S6 => "Table",
        }
    }

    /// Optional processing steps that can be turned off with `skip_<step>`.
    pub fn default_skip_steps(self) -> &'static [&'static str] {
        match self {
            StageId::S1 => &[
                "group_scale",
                "dq_init",
                "saturation",
                "superbias",
                "refpix",
                "linearity",
                "dark_current",
                "jump",
                "ramp_fit",
            ],
            StageId::S2 => &[
                "bkg_subtract",
                "assign_wcs",
                "srctype",
                "flat_field",
                "straylight",
                "fringe",
                "pathloss",
                "photom",
                "extract_1d",
            ],
            _ => &[],
        }
    }

    /// Name of this stage's diagnostic-mode flag, e.g. `testing_S4`.
    pub fn testing_key(self) -> String {
        format!("testing_{self}")
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.index())
    }
}

impl std::str::FromStr for StageId {
    type Err = anyhow::Error;

    /// Accepts `3`, `S3`, `s3` and `Stage3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let digits = lower
            .strip_prefix("stage")
            .or_else(|| lower.strip_prefix('s'))
            .unwrap_or(&lower);
        match digits.parse::<u8>().ok().and_then(StageId::from_index) {
            Some(stage) => Ok(stage),
            None => bail!("Invalid stage: {s}. Valid values: 1-6, S1-S6, Stage1-Stage6"),
        }
    }
}

/// Phase of one stage invocation.
///
/// State machine transitions:
/// - `Pending` → `LoadingInput` → `BuildingParams` → `RunningStage` → `Persisting` → `Done`
/// - any non-terminal phase → `Failed`
/// - `Done` and `Failed` are terminal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StagePhase {
    Pending,
    LoadingInput,
    BuildingParams,
    RunningStage,
    Persisting,
    Done,
    Failed,
}

impl std::fmt::Display for StagePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StagePhase::Pending => write!(f, "PENDING"),
            StagePhase::LoadingInput => write!(f, "LOADING_INPUT"),
            StagePhase::BuildingParams => write!(f, "BUILDING_PARAMS"),
            StagePhase::RunningStage => write!(f, "RUNNING_STAGE"),
            StagePhase::Persisting => write!(f, "PERSISTING"),
            StagePhase::Done => write!(f, "DONE"),
            StagePhase::Failed => write!(f, "FAILED"),
        }
    }
}

impl StagePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StagePhase::Done | StagePhase::Failed)
    }

    /// Check if transitioning from the current phase to `next` is valid.
    pub fn can_transition_to(&self, next: &StagePhase) -> bool {
        if *next == StagePhase::Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (StagePhase::Pending, StagePhase::LoadingInput)
                | (StagePhase::LoadingInput, StagePhase::BuildingParams)
                | (StagePhase::BuildingParams, StagePhase::RunningStage)
                | (StagePhase::RunningStage, StagePhase::Persisting)
                | (StagePhase::Persisting, StagePhase::Done)
        )
    }

    /// Attempt to transition to `next`, returning an error if invalid.
    pub fn try_transition(&self, next: StagePhase) -> Result<StagePhase> {
        if self.can_transition_to(&next) {
            Ok(next)
        } else {
            bail!("Invalid stage phase transition: {self} -> {next}")
        }
    }

    /// Returns the phases this phase can move to.
    pub fn valid_transitions(&self) -> Vec<StagePhase> {
        match self {
            StagePhase::Pending => vec![StagePhase::LoadingInput, StagePhase::Failed],
            StagePhase::LoadingInput => vec![StagePhase::BuildingParams, StagePhase::Failed],
            StagePhase::BuildingParams => vec![StagePhase::RunningStage, StagePhase::Failed],
            StagePhase::RunningStage => vec![StagePhase::Persisting, StagePhase::Failed],
            StagePhase::Persisting => vec![StagePhase::Done, StagePhase::Failed],
            StagePhase::Done | StagePhase::Failed => vec![],
        }
    }
}
