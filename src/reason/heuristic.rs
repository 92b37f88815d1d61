use anyhow::Result;
use async_trait::async_trait;

use super::{Analyst, Brain};
use crate::cluster::ClusterSummary;
use crate::model::{
    ActionType, AgentDecision, AgentReasoning, DecisionParams, DetectedPattern, RouteMetric,
};
use crate::telemetry::generator::random_tag;

pub const HEURISTIC_CONFIDENCE: f64 = 0.75;
pub const HEURISTIC_VARIANCE: f64 = 0.12;

/// Deterministic local rulebook: reroute the worst-failing suspect route away.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicAnalyst;

impl HeuristicAnalyst {
    /// Highest fail rate; the earliest route wins a tie.
    pub fn worst(suspects: &[RouteMetric]) -> Option<&RouteMetric> {
        suspects.iter().fold(None, |best: Option<&RouteMetric>, m| match best {
            Some(b) if m.fail_rate <= b.fail_rate => Some(b),
            _ => Some(m),
        })
    }

    pub fn decide(suspects: &[RouteMetric]) -> Option<Brain> {
        let worst = Self::worst(suspects)?;
        let pct = (worst.fail_rate * 100.0).round();
        let cluster_id = format!("LOC-{}", random_tag(&mut rand::thread_rng(), 4));
        Some(Brain {
            reasoning: AgentReasoning {
                cluster_id,
                hypothesis: format!(
                    "Heuristic: {}% failure on {} {}. Local rulebook engaged while the reasoning oracle is unavailable.",
                    pct, worst.issuer, worst.method
                ),
                confidence: HEURISTIC_CONFIDENCE,
                variance: HEURISTIC_VARIANCE,
                detected_pattern: DetectedPattern::SteadyDegradation,
            },
            decision: AgentDecision {
                action_type: ActionType::Reroute,
                parameters: DecisionParams {
                    target: worst.issuer.as_str().to_string(),
                    method: worst.method.as_str().to_string(),
                    weight: 0.0,
                },
                rationale: format!(
                    "Safety fallback: failure density on {} {} exceeds tolerance. Shifting its traffic to healthy routes.",
                    worst.issuer, worst.method
                ),
                is_autonomous: true,
            },
        })
    }
}

#[async_trait]
impl Analyst for HeuristicAnalyst {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn analyze(&self, suspects: &[RouteMetric], _clusters: &ClusterSummary) -> Result<Option<Brain>> {
        Ok(Self::decide(suspects))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ErrorCode, Issuer, Method};

    fn metric(issuer: Issuer, method: Method, fail_rate: f64) -> RouteMetric {
        RouteMetric {
            route: format!("{}:{}", issuer, method),
            issuer,
            method,
            fail_rate,
            avg_latency: 300.0,
            avg_retries: 0.0,
            total_count: 10,
            top_error: ErrorCode::None,
        }
    }

    #[test]
    fn test_worst_route_first_wins_tie() {
        let m = vec![
            metric(Issuer::Sbi, Method::Card, 0.2),
            metric(Issuer::Hdfc, Method::Upi, 0.4),
            metric(Issuer::Axis, Method::Upi, 0.4),
        ];
        let worst = HeuristicAnalyst::worst(&m).unwrap();
        assert_eq!(worst.issuer, Issuer::Hdfc);
    }

    #[test]
    fn test_fixed_outputs() {
        let brain = HeuristicAnalyst::decide(&[metric(Issuer::Icici, Method::Netbanking, 0.37)]).unwrap();
        assert_eq!(brain.reasoning.confidence, 0.75);
        assert_eq!(brain.reasoning.variance, 0.12);
        assert_eq!(brain.reasoning.detected_pattern, DetectedPattern::SteadyDegradation);
        assert!(brain.reasoning.cluster_id.starts_with("LOC-"));
        assert!(brain.reasoning.hypothesis.contains("37% failure on ICICI"));
        assert_eq!(brain.decision.action_type, ActionType::Reroute);
        assert_eq!(brain.decision.parameters.target, "ICICI");
        assert_eq!(brain.decision.parameters.method, "NETBANKING");
        assert_eq!(brain.decision.parameters.weight, 0.0);
        assert!(brain.decision.is_autonomous);
    }

    #[test]
    fn test_no_suspects_no_decision() {
        assert!(HeuristicAnalyst::decide(&[]).is_none());
    }
}
