//! Deployment models

use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

/// The states accepted by the deployment status API
pub const VALID_DEPLOYMENT_STATES: &[&str] = &[
    "error",
    "failure",
    "in_progress",
    "queued",
    "pending",
    "success",
];

/// Deployment status state, the closed set the code-hosting API accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Error,
    Failure,
    InProgress,
    Queued,
    Pending,
    Success,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Error => "error",
            DeploymentState::Failure => "failure",
            DeploymentState::InProgress => "in_progress",
            DeploymentState::Queued => "queued",
            DeploymentState::Pending => "pending",
            DeploymentState::Success => "success",
        }
    }

    /// Whether this state ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentState::Success | DeploymentState::Failure | DeploymentState::Error
        )
    }

    /// Position in the pending -> queued -> in_progress -> terminal order
    fn rank(&self) -> u8 {
        match self {
            DeploymentState::Pending => 0,
            DeploymentState::Queued => 1,
            DeploymentState::InProgress => 2,
            DeploymentState::Success | DeploymentState::Failure | DeploymentState::Error => 3,
        }
    }
}

impl std::str::FromStr for DeploymentState {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(DeploymentState::Error),
            "failure" => Ok(DeploymentState::Failure),
            "in_progress" => Ok(DeploymentState::InProgress),
            "queued" => Ok(DeploymentState::Queued),
            "pending" => Ok(DeploymentState::Pending),
            "success" => Ok(DeploymentState::Success),
            _ => Err(RelayError::InvalidState(format!(
                "{}, must be one of {}",
                s,
                VALID_DEPLOYMENT_STATES.join(", ")
            ))),
        }
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remote deployment status resource. The state only moves forward;
/// a backward transition is rejected.
#[derive(Debug, Clone)]
pub struct DeploymentRecord {
    /// Deployment id assigned by the code-hosting API
    pub id: u64,

    /// Last state posted, none until the first transition
    pub state: Option<DeploymentState>,

    /// URL the environment will be reachable at
    pub environment_url: Option<String>,
}

impl DeploymentRecord {
    pub fn new(id: u64, environment_url: Option<String>) -> Self {
        Self {
            id,
            state: None,
            environment_url,
        }
    }

    /// Move the record to `next`, enforcing strictly forward ordering:
    /// backward transitions, repeats and anything after a terminal state
    /// are rejected
    pub fn transition(&mut self, next: DeploymentState) -> Result<(), RelayError> {
        if let Some(current) = self.state {
            if current.is_terminal() || next.rank() <= current.rank() {
                return Err(RelayError::InvalidState(format!(
                    "cannot transition from {} to {}",
                    current, next
                )));
            }
        }
        self.state = Some(next);
        Ok(())
    }
}

/// One message from the deployment platform's lifecycle stream, consumed
/// in arrival order. The stream is finite and ends on `ready`, `error`,
/// or exhaustion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum LifecycleEvent {
    Created,
    BuildStateChanged,
    Ready(serde_json::Value),
    Warning(serde_json::Value),
    Error(serde_json::Value),

    /// Anything the platform emits that this relay does not know about;
    /// logged and skipped, never a crash
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_valid_states_parse() {
        for state in VALID_DEPLOYMENT_STATES {
            let parsed: DeploymentState = state.parse().unwrap();
            assert_eq!(parsed.as_str(), *state);
        }
    }

    #[test]
    fn test_invalid_state_is_rejected() {
        for state in ["deployed", "PENDING", "done", ""] {
            let result: Result<DeploymentState, _> = state.parse();
            assert!(matches!(result, Err(RelayError::InvalidState(_))));
        }
    }

    #[test]
    fn test_record_forward_transitions() {
        let mut record = DeploymentRecord::new(42, None);

        record.transition(DeploymentState::Pending).unwrap();
        record.transition(DeploymentState::Queued).unwrap();
        record.transition(DeploymentState::InProgress).unwrap();
        record.transition(DeploymentState::Success).unwrap();

        assert_eq!(record.state, Some(DeploymentState::Success));
    }

    #[test]
    fn test_record_rejects_backward_transition() {
        let mut record = DeploymentRecord::new(42, None);

        record.transition(DeploymentState::Pending).unwrap();
        record.transition(DeploymentState::InProgress).unwrap();

        let result = record.transition(DeploymentState::Queued);
        assert!(matches!(result, Err(RelayError::InvalidState(_))));
    }

    #[test]
    fn test_record_rejects_repeated_state() {
        let mut record = DeploymentRecord::new(42, None);

        record.transition(DeploymentState::Pending).unwrap();
        record.transition(DeploymentState::Queued).unwrap();

        // A duplicated platform event must not post the same status twice
        let result = record.transition(DeploymentState::Queued);
        assert!(matches!(result, Err(RelayError::InvalidState(_))));
        assert_eq!(record.state, Some(DeploymentState::Queued));
    }

    #[test]
    fn test_record_rejects_transition_out_of_terminal() {
        let mut record = DeploymentRecord::new(42, None);

        record.transition(DeploymentState::Pending).unwrap();
        record.transition(DeploymentState::Failure).unwrap();

        let result = record.transition(DeploymentState::Success);
        assert!(matches!(result, Err(RelayError::InvalidState(_))));
    }

    #[test]
    fn test_lifecycle_event_tags() {
        let event: LifecycleEvent =
            serde_json::from_str(r#"{"type": "created"}"#).unwrap();
        assert!(matches!(event, LifecycleEvent::Created));

        let event: LifecycleEvent =
            serde_json::from_str(r#"{"type": "build-state-changed"}"#).unwrap();
        assert!(matches!(event, LifecycleEvent::BuildStateChanged));

        let event: LifecycleEvent =
            serde_json::from_str(r#"{"type": "ready", "payload": {"url": "x.now.sh"}}"#)
                .unwrap();
        match event {
            LifecycleEvent::Ready(payload) => {
                assert_eq!(payload["url"], "x.now.sh");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_lifecycle_event_is_tolerated() {
        let event: LifecycleEvent =
            serde_json::from_str(r#"{"type": "something-new"}"#).unwrap();
        assert!(matches!(event, LifecycleEvent::Unknown));
    }
}
