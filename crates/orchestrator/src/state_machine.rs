use cnb_core::RunState;

use crate::error::{OrchestratorError, Result};

/// Legal moves between [`RunState`]s for a plan of `total` phases.
pub struct RunStateMachine;

impl RunStateMachine {
    pub fn validate_transition(from: &RunState, to: &RunState, total: usize) -> Result<()> {
        if Self::is_allowed(from, to, total) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    fn is_allowed(from: &RunState, to: &RunState, total: usize) -> bool {
        if from.is_terminal() {
            return false;
        }
        match (from, to) {
            (RunState::Pending, RunState::Running { index: 0, .. }) => total > 0,
            (RunState::Pending, RunState::Cancelled { index: 0 }) => true,
            (RunState::Running { index: i, .. }, RunState::Running { index: j, .. }) => {
                *j == *i + 1 && *j < total
            }
            (RunState::Running { index, .. }, RunState::Succeeded) => *index + 1 == total,
            (RunState::Running { index: i, phase: p }, RunState::Failed { index: j, phase: q }) => {
                i == j && p == q
            }
            (RunState::Running { index: i, .. }, RunState::Cancelled { index: j }) => {
                j == i || *j == *i + 1
            }
            _ => false,
        }
    }

    pub fn can_transition(from: &RunState, to: &RunState, total: usize) -> bool {
        Self::validate_transition(from, to, total).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(index: usize, phase: &str) -> RunState {
        RunState::Running {
            index,
            phase: phase.to_string(),
        }
    }

    #[test]
    fn test_valid_transitions() {
        assert!(RunStateMachine::can_transition(
            &RunState::Pending,
            &running(0, "detector"),
            5
        ));
        assert!(RunStateMachine::can_transition(
            &running(0, "detector"),
            &running(1, "analyzer"),
            5
        ));
        assert!(RunStateMachine::can_transition(
            &running(4, "exporter"),
            &RunState::Succeeded,
            5
        ));
        assert!(RunStateMachine::can_transition(
            &running(3, "builder"),
            &RunState::Failed {
                index: 3,
                phase: "builder".to_string()
            },
            5
        ));
    }

    #[test]
    fn test_no_skipping_or_reordering() {
        assert!(!RunStateMachine::can_transition(
            &RunState::Pending,
            &running(1, "analyzer"),
            5
        ));
        assert!(!RunStateMachine::can_transition(
            &running(1, "analyzer"),
            &running(3, "builder"),
            5
        ));
        assert!(!RunStateMachine::can_transition(
            &running(2, "restorer"),
            &running(1, "analyzer"),
            5
        ));
        assert!(!RunStateMachine::can_transition(
            &running(2, "restorer"),
            &RunState::Succeeded,
            5
        ));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            RunState::Succeeded,
            RunState::Failed {
                index: 1,
                phase: "analyzer".to_string(),
            },
            RunState::Cancelled { index: 1 },
        ] {
            assert!(!RunStateMachine::can_transition(
                &terminal,
                &running(2, "restorer"),
                5
            ));
            assert!(!RunStateMachine::can_transition(
                &terminal,
                &RunState::Pending,
                5
            ));
        }
    }

    #[test]
    fn test_failure_names_running_phase() {
        assert!(!RunStateMachine::can_transition(
            &running(3, "builder"),
            &RunState::Failed {
                index: 4,
                phase: "exporter".to_string()
            },
            5
        ));
    }

    #[test]
    fn test_cancel_between_phases() {
        assert!(RunStateMachine::can_transition(
            &RunState::Pending,
            &RunState::Cancelled { index: 0 },
            5
        ));
        assert!(RunStateMachine::can_transition(
            &running(1, "analyzer"),
            &RunState::Cancelled { index: 2 },
            5
        ));
    }

    #[test]
    fn test_single_phase_plan() {
        assert!(RunStateMachine::can_transition(
            &running(0, "creator"),
            &RunState::Succeeded,
            1
        ));
        assert!(!RunStateMachine::can_transition(
            &running(0, "creator"),
            &running(1, "exporter"),
            1
        ));
    }
}
