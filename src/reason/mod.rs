//! Diagnosis and remediation decisions.
//!
//! Two `Analyst` strategies sit behind one engine: the remote oracle and the
//! local heuristic. The caller picks per call through `skip_oracle` (driven by
//! the cooldown); any oracle failure degrades to the heuristic in the same call.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub mod heuristic;
pub mod oracle;

use crate::cluster::ClusterSummary;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::model::{AgentAction, AgentDecision, AgentReasoning, RouteMetric};
use crate::reliability::cooldown::is_rate_limit_message;
use heuristic::HeuristicAnalyst;
use oracle::{Oracle, OracleAnalyst};

pub const SUSPECT_FAIL_RATE: f64 = 0.04;
pub const SUSPECT_LATENCY_MS: f64 = 1500.0;

/// Diagnosis plus the decision it leads to.
#[derive(Debug, Clone, PartialEq)]
pub struct Brain {
    pub reasoning: AgentReasoning,
    pub decision: AgentDecision,
}

#[async_trait]
pub trait Analyst: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the analyst sees no actionable anomaly.
    async fn analyze(&self, suspects: &[RouteMetric], clusters: &ClusterSummary) -> Result<Option<Brain>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// No suspect routes; nothing was consulted.
    Quiet,
    Oracle,
    Heuristic,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Quiet => "quiet",
            Source::Oracle => "oracle",
            Source::Heuristic => "heuristic",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReasoningOutcome {
    pub brain: Option<Brain>,
    pub source: Source,
    /// Message of the oracle failure that forced the fallback, if any.
    pub oracle_error: Option<String>,
}

impl ReasoningOutcome {
    pub fn rate_limited(&self) -> bool {
        self.oracle_error.as_deref().map(is_rate_limit_message).unwrap_or(false)
    }
}

pub fn suspects(metrics: &[RouteMetric]) -> Vec<RouteMetric> {
    metrics
        .iter()
        .filter(|m| m.fail_rate > SUSPECT_FAIL_RATE || m.avg_latency > SUSPECT_LATENCY_MS)
        .cloned()
        .collect()
}

pub struct ReasoningEngine {
    heuristic: HeuristicAnalyst,
    oracle: Option<Arc<dyn Oracle>>,
    analyst: Option<OracleAnalyst>,
}

impl ReasoningEngine {
    /// Heuristic-only engine.
    pub fn local() -> Self {
        Self {
            heuristic: HeuristicAnalyst,
            oracle: None,
            analyst: None,
        }
    }

    pub fn with_oracle(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            heuristic: HeuristicAnalyst,
            analyst: Some(OracleAnalyst::new(oracle.clone())),
            oracle: Some(oracle),
        }
    }

    pub fn has_oracle(&self) -> bool {
        self.oracle.is_some()
    }

    pub async fn analyze_and_decide(
        &self,
        metrics: &[RouteMetric],
        clusters: &ClusterSummary,
        skip_oracle: bool,
    ) -> ReasoningOutcome {
        let suspects = suspects(metrics);
        if suspects.is_empty() {
            return ReasoningOutcome {
                brain: None,
                source: Source::Quiet,
                oracle_error: None,
            };
        }

        let analyst = match &self.analyst {
            Some(a) if !skip_oracle => a,
            _ => return self.fallback(&suspects, clusters, None).await,
        };

        match analyst.analyze(&suspects, clusters).await {
            Ok(brain) => ReasoningOutcome {
                brain,
                source: Source::Oracle,
                oracle_error: None,
            },
            Err(e) => {
                let msg = format!("{:#}", e);
                log(
                    Level::Warn,
                    Domain::Reason,
                    "oracle_failed",
                    obj(&[("analyst", v_str(analyst.name())), ("error", v_str(&msg))]),
                );
                self.fallback(&suspects, clusters, Some(msg)).await
            }
        }
    }

    async fn fallback(
        &self,
        suspects: &[RouteMetric],
        clusters: &ClusterSummary,
        oracle_error: Option<String>,
    ) -> ReasoningOutcome {
        // The heuristic cannot fail; treat an impossible error as no decision.
        let brain = self.heuristic.analyze(suspects, clusters).await.unwrap_or(None);
        ReasoningOutcome {
            brain,
            source: Source::Heuristic,
            oracle_error,
        }
    }

    /// Short post-mortem for a committed action. Never fails: any oracle
    /// problem (or a cooled-down oracle) yields the fixed alert sentence.
    pub async fn craft_incident_report(&self, action: &AgentAction, skip_oracle: bool) -> String {
        let fallback = fallback_report(action);
        let oracle = match &self.oracle {
            Some(o) if !skip_oracle => o,
            _ => return fallback,
        };
        match oracle.narrate(&incident_prompt(action)).await {
            Ok(text) => text,
            Err(e) => {
                log(
                    Level::Warn,
                    Domain::Reason,
                    "narrative_failed",
                    obj(&[("action_id", v_str(&action.id)), ("error", v_str(&format!("{:#}", e)))]),
                );
                fallback
            }
        }
    }
}

pub fn fallback_report(action: &AgentAction) -> String {
    format!(
        "PayAgent System Alert: Traffic to {} has been rerouted to prevent cascading failures. Recovery is in progress.",
        action.decision.parameters.target
    )
}

fn incident_prompt(action: &AgentAction) -> String {
    let tone = if action.reasoning.confidence >= 0.8 {
        "assertive"
    } else {
        "cautious"
    };
    format!(
        "Write a short incident post-mortem email (under 100 words, {tone} tone, no template phrasing) for the CTO.\n\
         Incident: {id}\n\
         Cluster: {cluster}\n\
         Route: {target} ({method})\n\
         Pattern: {pattern}\n\
         Hypothesis: {hypothesis}\n\
         Remediation: {action} to weight {weight}\n\
         Impact: ~{saved} transactions saved, {friction} friction points.",
        tone = tone,
        id = action.id,
        cluster = action.reasoning.cluster_id,
        target = action.decision.parameters.target,
        method = action.decision.parameters.method,
        pattern = action.reasoning.detected_pattern.as_str(),
        hypothesis = action.reasoning.hypothesis,
        action = action.decision.action_type.as_str(),
        weight = action.decision.parameters.weight,
        saved = action.prediction.expected_saved_transactions,
        friction = action.prediction.projected_user_friction,
    )
}
