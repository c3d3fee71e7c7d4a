//! Finite State Machine for a deployment workflow

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::deployment::Stage;

/// Workflow state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowState {
    Verifying,
    Resolving,
    Generating,
    Committing,
    Publishing,
    Notifying,

    /// Terminal: deployed and notification dispatched
    Done,

    /// Terminal: the named stage failed
    Failed(Stage),
}

impl WorkflowState {
    /// The stage this state performs, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            WorkflowState::Verifying => Some(Stage::Verifying),
            WorkflowState::Resolving => Some(Stage::Resolving),
            WorkflowState::Generating => Some(Stage::Generating),
            WorkflowState::Committing => Some(Stage::Committing),
            WorkflowState::Publishing => Some(Stage::Publishing),
            WorkflowState::Notifying => Some(Stage::Notifying),
            WorkflowState::Done | WorkflowState::Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Done | WorkflowState::Failed(_))
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Done => f.write_str("Done"),
            WorkflowState::Failed(stage) => write!(f, "Failed({})", stage),
            other => match other.stage() {
                Some(stage) => f.write_str(stage.as_str()),
                None => Ok(()),
            },
        }
    }
}

/// Workflow event
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// Current stage completed
    Advance,

    /// Current stage failed
    Fail { kind: String, reason: String },
}

/// Workflow FSM
#[derive(Debug, Clone)]
pub struct WorkflowFsm {
    state: WorkflowState,
    error: Option<(String, String)>,
}

impl WorkflowFsm {
    /// Create a new FSM in the verifying state
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Verifying,
            error: None,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Kind and reason of the failure, if any
    pub fn error(&self) -> Option<(&str, &str)> {
        self.error
            .as_ref()
            .map(|(kind, reason)| (kind.as_str(), reason.as_str()))
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: WorkflowEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (WorkflowState::Verifying, WorkflowEvent::Advance) => WorkflowState::Resolving,
            (WorkflowState::Resolving, WorkflowEvent::Advance) => WorkflowState::Generating,
            (WorkflowState::Generating, WorkflowEvent::Advance) => WorkflowState::Committing,
            (WorkflowState::Committing, WorkflowEvent::Advance) => WorkflowState::Publishing,
            (WorkflowState::Publishing, WorkflowEvent::Advance) => WorkflowState::Notifying,
            (WorkflowState::Notifying, WorkflowEvent::Advance) => WorkflowState::Done,

            (state, WorkflowEvent::Fail { kind, reason }) if !state.is_terminal() => {
                self.error = Some((kind.clone(), reason.clone()));
                match state.stage() {
                    Some(stage) => WorkflowState::Failed(stage),
                    None => return Err(format!("No stage to fail in {}", state)),
                }
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }

    pub fn advance(&mut self) -> Result<(), String> {
        self.process(WorkflowEvent::Advance)
    }

    pub fn fail(&mut self, kind: impl Into<String>, reason: impl Into<String>) -> Result<(), String> {
        self.process(WorkflowEvent::Fail {
            kind: kind.into(),
            reason: reason.into(),
        })
    }
}

impl Default for WorkflowFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsm_happy_path() {
        let mut fsm = WorkflowFsm::new();
        assert_eq!(fsm.state(), &WorkflowState::Verifying);

        let expected = [
            WorkflowState::Resolving,
            WorkflowState::Generating,
            WorkflowState::Committing,
            WorkflowState::Publishing,
            WorkflowState::Notifying,
            WorkflowState::Done,
        ];
        for state in expected {
            fsm.advance().unwrap();
            assert_eq!(fsm.state(), &state);
        }
        assert!(fsm.error().is_none());
    }

    #[test]
    fn test_fsm_failure_records_stage() {
        let mut fsm = WorkflowFsm::new();
        fsm.advance().unwrap();
        fsm.advance().unwrap();

        fsm.fail("BackendUnavailable", "connection refused").unwrap();
        assert_eq!(fsm.state(), &WorkflowState::Failed(Stage::Generating));
        assert_eq!(fsm.error(), Some(("BackendUnavailable", "connection refused")));
    }

    #[test]
    fn test_fsm_terminal_states_absorb() {
        let mut fsm = WorkflowFsm::new();
        fsm.fail("Mismatch", "bad secret").unwrap();
        assert!(fsm.advance().is_err());
        assert!(fsm.fail("Other", "again").is_err());
        assert_eq!(fsm.state(), &WorkflowState::Failed(Stage::Verifying));

        let mut done = WorkflowFsm::new();
        for _ in 0..6 {
            done.advance().unwrap();
        }
        assert!(done.advance().is_err());
        assert!(done.fail("Late", "too late").is_err());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(WorkflowState::Committing.to_string(), "Committing");
        assert_eq!(
            WorkflowState::Failed(Stage::Publishing).to_string(),
            "Failed(Publishing)"
        );
    }
}
