//! Tests for the stage-invocation phase machine
//!
//! Covers the allowed transitions, terminal phases, and the phase history an
//! orchestrator reports for successful and failed invocations.

use stagehand::models::run_state::RunState;
use stagehand::models::stage::{StageId, StagePhase};
use stagehand::orchestrator::{Orchestrator, StageContext, StageRequest};
use std::fs;
use tempfile::TempDir;

const ALL_PHASES: [StagePhase; 7] = [
    StagePhase::Pending,
    StagePhase::LoadingInput,
    StagePhase::BuildingParams,
    StagePhase::RunningStage,
    StagePhase::Persisting,
    StagePhase::Done,
    StagePhase::Failed,
];

#[test]
fn test_happy_path_transitions() {
    let path = [
        StagePhase::Pending,
        StagePhase::LoadingInput,
        StagePhase::BuildingParams,
        StagePhase::RunningStage,
        StagePhase::Persisting,
        StagePhase::Done,
    ];
    for pair in path.windows(2) {
        assert!(pair[0].can_transition_to(&pair[1]), "{} -> {}", pair[0], pair[1]);
        assert_eq!(pair[0].try_transition(pair[1]).unwrap(), pair[1]);
    }
}

#[test]
fn test_every_non_terminal_phase_can_fail() {
    for phase in ALL_PHASES {
        assert_eq!(
            phase.can_transition_to(&StagePhase::Failed),
            !phase.is_terminal(),
            "{phase}"
        );
    }
}

#[test]
fn test_terminal_phases_are_final() {
    for terminal in [StagePhase::Done, StagePhase::Failed] {
        assert!(terminal.valid_transitions().is_empty());
        for next in ALL_PHASES {
            assert!(terminal.try_transition(next).is_err());
        }
    }
}

#[test]
fn test_phases_cannot_be_skipped() {
    assert!(!StagePhase::Pending.can_transition_to(&StagePhase::RunningStage));
    assert!(!StagePhase::BuildingParams.can_transition_to(&StagePhase::Persisting));
    assert!(!StagePhase::RunningStage.can_transition_to(&StagePhase::Done));

    let err = StagePhase::LoadingInput
        .try_transition(StagePhase::Done)
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("Invalid stage phase transition: LOADING_INPUT -> DONE"));
}

#[test]
fn test_valid_transitions_agree_with_can_transition_to() {
    for from in ALL_PHASES {
        for to in ALL_PHASES {
            assert_eq!(
                from.valid_transitions().contains(&to),
                from.can_transition_to(&to),
                "{from} -> {to}"
            );
        }
    }
}

#[test]
fn test_orchestrator_reports_history() {
    let temp = TempDir::new().unwrap();
    let control = temp.path().join("S1.ecf");
    fs::write(&control, "inputdir raw\n").unwrap();

    let orchestrator = Orchestrator::new(StageRequest::new(StageId::S1, &control)).unwrap();
    assert_eq!(orchestrator.phase(), StagePhase::Pending);

    let stage = |_ctx: &StageContext<'_>, state: RunState| -> anyhow::Result<RunState> { Ok(state) };
    let outcome = orchestrator.run(&stage).unwrap();
    assert_eq!(outcome.phase(), StagePhase::Done);
    assert_eq!(outcome.history.first(), Some(&StagePhase::Pending));
    assert_eq!(outcome.history.last(), Some(&StagePhase::Done));
    assert_eq!(outcome.history.len(), 6);
}

#[test]
fn test_failed_history_stops_at_failing_phase() {
    let temp = TempDir::new().unwrap();
    let control = temp.path().join("S2.ecf");
    fs::write(&control, "ncpu 4\n").unwrap();

    let stage = |_ctx: &StageContext<'_>, state: RunState| -> anyhow::Result<RunState> { Ok(state) };
    let failure = Orchestrator::new(StageRequest::new(StageId::S2, &control))
        .unwrap()
        .run(&stage)
        .unwrap_err();
    assert_eq!(
        failure.history,
        vec![
            StagePhase::Pending,
            StagePhase::LoadingInput,
            StagePhase::Failed
        ]
    );
}
