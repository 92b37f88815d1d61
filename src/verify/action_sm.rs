use crate::model::{ActionStatus, AgentAction};

/// Lifecycle inputs for a recorded action.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Routing-policy commit confirmed by the bridge.
    CommitConfirmed,
    /// Commit refused by the bridge.
    CommitRejected { reason: String },
}

#[derive(Debug, Clone)]
pub struct TransitionError {
    pub msg: String,
}

/// Status only moves forward: `DRAFT → EXECUTED`. A rejected commit leaves the
/// draft in place so an operator can retry it.
pub fn apply_event(action: &mut AgentAction, event: Event) -> Result<(), TransitionError> {
    match (action.status, event) {
        (ActionStatus::Draft, Event::CommitConfirmed) => {
            action.status = ActionStatus::Executed;
            Ok(())
        }
        (ActionStatus::Draft, Event::CommitRejected { .. }) => Ok(()),
        (ActionStatus::Executed, Event::CommitConfirmed) => Ok(()),
        (ActionStatus::Executed, Event::CommitRejected { reason }) => Err(TransitionError {
            msg: format!("executed action cannot be rejected: {}", reason),
        }),
        (ActionStatus::Failed, _) => Err(TransitionError {
            msg: "failed action is terminal".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::predict;
    use crate::model::*;

    fn draft() -> AgentAction {
        AgentAction {
            id: "ACT-TEST1".to_string(),
            timestamp: 0,
            decision: AgentDecision {
                action_type: ActionType::Reroute,
                parameters: DecisionParams {
                    target: "HDFC".to_string(),
                    method: "UPI".to_string(),
                    weight: 0.0,
                },
                rationale: String::new(),
                is_autonomous: true,
            },
            prediction: predict(0.75),
            reasoning: AgentReasoning {
                cluster_id: "LOC-TEST".to_string(),
                hypothesis: String::new(),
                confidence: 0.75,
                variance: 0.12,
                detected_pattern: DetectedPattern::SteadyDegradation,
            },
            status: ActionStatus::Draft,
        }
    }

    #[test]
    fn test_commit_promotes_draft() {
        let mut a = draft();
        apply_event(&mut a, Event::CommitConfirmed).unwrap();
        assert_eq!(a.status, ActionStatus::Executed);
        // idempotent
        apply_event(&mut a, Event::CommitConfirmed).unwrap();
        assert_eq!(a.status, ActionStatus::Executed);
    }

    #[test]
    fn test_rejection_keeps_draft() {
        let mut a = draft();
        apply_event(&mut a, Event::CommitRejected { reason: "503".into() }).unwrap();
        assert_eq!(a.status, ActionStatus::Draft);
    }

    #[test]
    fn test_status_never_reverses() {
        let mut a = draft();
        apply_event(&mut a, Event::CommitConfirmed).unwrap();
        assert!(apply_event(&mut a, Event::CommitRejected { reason: "late".into() }).is_err());
        assert_eq!(a.status, ActionStatus::Executed);
    }
}
