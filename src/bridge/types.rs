use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::model::AgentAction;

/// Body of `GET /chaos_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChaosStatus {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub bank: Option<String>,
    #[serde(default)]
    pub level: f64,
}

impl ChaosStatus {
    pub fn inactive() -> Self {
        Self {
            active: false,
            bank: None,
            level: 0.0,
        }
    }
}

/// Body of `POST /routing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    pub bank: String,
    pub method: String,
    pub new_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedPair {
    pub bank: String,
    pub method: String,
}

/// Incident notification sent to the webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub cluster_id: String,
    pub affected_pairs: Vec<AffectedPair>,
    pub action: String,
    pub expected_saved_txns: u32,
    pub user_friction: u32,
    pub confidence: f64,
    /// ISO-8601
    pub timestamp: String,
    pub email_report: String,
}

const DEFAULT_REPORT: &str = "Default incident summary: Route rerouted autonomously.";

impl NotificationPayload {
    pub fn from_action(action: &AgentAction, email_report: Option<&str>) -> Self {
        let timestamp = Utc
            .timestamp_millis_opt(action.timestamp as i64)
            .single()
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let report = email_report
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(DEFAULT_REPORT);
        Self {
            cluster_id: action.reasoning.cluster_id.clone(),
            affected_pairs: vec![AffectedPair {
                bank: action.decision.parameters.target.clone(),
                method: action.decision.parameters.method.clone(),
            }],
            action: action.decision.action_type.as_str().to_string(),
            expected_saved_txns: action.prediction.expected_saved_transactions,
            user_friction: action.prediction.projected_user_friction,
            confidence: action.reasoning.confidence,
            timestamp,
            email_report: report.to_string(),
        }
    }
}
