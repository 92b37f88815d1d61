use crate::model::{round_to, AgentPrediction};

const SAVED_SCALE: f64 = 180.0;
const FRICTION_SCALE: f64 = 25.0;
const FRICTION_FLOOR: f64 = 5.0;
const PREDICTION_VARIANCE: f64 = 0.08;
const RECOVERY_ETA: &str = "T + 30s";

/// Expected impact of acting on a diagnosis with the given confidence.
/// Pure: the same confidence always yields the same estimate.
pub fn predict(confidence: f64) -> AgentPrediction {
    let saved = (confidence * SAVED_SCALE).round().max(0.0);
    let friction = (FRICTION_SCALE * (1.0 - confidence) + FRICTION_FLOOR).round().max(0.0);
    AgentPrediction {
        expected_saved_transactions: saved as u32,
        projected_user_friction: friction as u32,
        impact_score: saved / friction.max(1.0),
        uncertainty: round_to(1.0 - confidence, 2),
        variance: PREDICTION_VARIANCE,
        recovery_eta: RECOVERY_ETA.to_string(),
    }
}
