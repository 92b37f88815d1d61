//! Shared records flowing through the remediation pipeline.
//!
//! Field names serialize in camelCase so the same types can be exchanged with
//! the reasoning oracle and any external viewer without a second schema.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Issuer {
    Hdfc,
    Icici,
    Sbi,
    Axis,
}

impl Issuer {
    pub const ALL: [Issuer; 4] = [Issuer::Hdfc, Issuer::Icici, Issuer::Sbi, Issuer::Axis];

    pub fn as_str(&self) -> &'static str {
        match self {
            Issuer::Hdfc => "HDFC",
            Issuer::Icici => "ICICI",
            Issuer::Sbi => "SBI",
            Issuer::Axis => "AXIS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "HDFC" => Some(Issuer::Hdfc),
            "ICICI" => Some(Issuer::Icici),
            "SBI" => Some(Issuer::Sbi),
            "AXIS" => Some(Issuer::Axis),
            _ => None,
        }
    }
}

impl fmt::Display for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Upi,
    Card,
    Netbanking,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Upi, Method::Card, Method::Netbanking];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Upi => "UPI",
            Method::Card => "CARD",
            Method::Netbanking => "NETBANKING",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Success,
    Failed,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BankDowntime,
    IssuerThrottling,
    NetworkLatency,
    InsufficientFunds,
    None,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BankDowntime => "BANK_DOWNTIME",
            ErrorCode::IssuerThrottling => "ISSUER_THROTTLING",
            ErrorCode::NetworkLatency => "NETWORK_LATENCY",
            ErrorCode::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorCode::None => "NONE",
        }
    }
}

/// One synthetic payment outcome. Never mutated after generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    /// Epoch milliseconds
    pub timestamp: u64,
    pub amount: u64,
    pub method: Method,
    pub issuer: Issuer,
    pub status: PaymentStatus,
    pub error_code: ErrorCode,
    /// Milliseconds
    pub latency: f64,
    pub retries: u32,
}

impl Transaction {
    pub fn is_failed(&self) -> bool {
        self.status == PaymentStatus::Failed
    }
}

/// Per-route statistics derived from a window slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMetric {
    pub route: String,
    pub issuer: Issuer,
    pub method: Method,
    pub fail_rate: f64,
    pub avg_latency: f64,
    pub avg_retries: f64,
    pub total_count: usize,
    pub top_error: ErrorCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectedPattern {
    OutlierCluster,
    SteadyDegradation,
    Noise,
}

impl DetectedPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectedPattern::OutlierCluster => "OUTLIER_CLUSTER",
            DetectedPattern::SteadyDegradation => "STEADY_DEGRADATION",
            DetectedPattern::Noise => "NOISE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReasoning {
    pub cluster_id: String,
    pub hypothesis: String,
    pub confidence: f64,
    pub variance: f64,
    pub detected_pattern: DetectedPattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Reroute,
    AdjustRetry,
    Throttle,
    None,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Reroute => "REROUTE",
            ActionType::AdjustRetry => "ADJUST_RETRY",
            ActionType::Throttle => "THROTTLE",
            ActionType::None => "NONE",
        }
    }
}

/// Routing target. Kept as free text since the oracle may name routes verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionParams {
    pub target: String,
    pub method: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDecision {
    pub action_type: ActionType,
    pub parameters: DecisionParams,
    pub rationale: String,
    pub is_autonomous: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPrediction {
    pub expected_saved_transactions: u32,
    pub projected_user_friction: u32,
    pub impact_score: f64,
    pub uncertainty: f64,
    pub variance: f64,
    #[serde(rename = "recoveryETA")]
    pub recovery_eta: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionStatus {
    Draft,
    Executed,
    Failed,
}

/// Unit of record for one remediation decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAction {
    pub id: String,
    pub timestamp: u64,
    pub decision: AgentDecision,
    pub prediction: AgentPrediction,
    pub reasoning: AgentReasoning,
    pub status: ActionStatus,
}

/// Observable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentMode {
    Idle,
    Consuming,
    Reasoning,
    Predicting,
    Acting,
    Learning,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Idle => "IDLE",
            AgentMode::Consuming => "CONSUMING",
            AgentMode::Reasoning => "REASONING",
            AgentMode::Predicting => "PREDICTING",
            AgentMode::Acting => "ACTING",
            AgentMode::Learning => "LEARNING",
        }
    }
}

pub fn route_key(issuer: Issuer, method: Method) -> String {
    format!("{}:{}", issuer, method)
}

/// Round to `places` decimals, half away from zero.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issuer_parse_is_case_insensitive() {
        assert_eq!(Issuer::parse("hdfc"), Some(Issuer::Hdfc));
        assert_eq!(Issuer::parse(" AXIS "), Some(Issuer::Axis));
        assert_eq!(Issuer::parse("CITI"), None);
    }

    #[test]
    fn test_decision_wire_format() {
        let decision = AgentDecision {
            action_type: ActionType::Reroute,
            parameters: DecisionParams {
                target: "HDFC".to_string(),
                method: "UPI".to_string(),
                weight: 0.0,
            },
            rationale: "divert".to_string(),
            is_autonomous: true,
        };
        let v = serde_json::to_value(&decision).unwrap();
        assert_eq!(v["actionType"], "REROUTE");
        assert_eq!(v["isAutonomous"], true);
        assert_eq!(v["parameters"]["target"], "HDFC");
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.404, 2), 0.4);
        assert_eq!(round_to(0.125, 2), 0.13);
        assert_eq!(round_to(1499.5, 0), 1500.0);
    }
}
