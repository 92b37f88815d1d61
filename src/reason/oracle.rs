//! Remote reasoning oracle: request/response shapes, the HTTP client and the
//! `Analyst` that adopts oracle verdicts.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{Analyst, Brain};
use crate::cluster::ClusterSummary;
use crate::model::{AgentDecision, AgentReasoning, DetectedPattern, RouteMetric};

pub const ORACLE_VARIANCE: f64 = 0.1;

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub telemetry: Vec<RouteMetric>,
    pub clusters: ClusterSummary,
    pub instruction: String,
    pub schema: Value,
}

impl AnalysisRequest {
    pub fn new(suspects: &[RouteMetric], clusters: &ClusterSummary) -> Self {
        Self {
            telemetry: suspects.to_vec(),
            clusters: clusters.clone(),
            instruction: "SRE analysis of payment-route telemetry. Identify the root cause and the best reroute."
                .to_string(),
            schema: response_schema(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleReasoning {
    pub cluster_id: String,
    pub hypothesis: String,
    pub confidence: f64,
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Structured oracle answer. Missing sections on an anomaly make it malformed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleVerdict {
    #[serde(default)]
    pub has_anomaly: bool,
    #[serde(default)]
    pub reasoning: Option<OracleReasoning>,
    #[serde(default)]
    pub decision: Option<AgentDecision>,
}

impl OracleVerdict {
    /// `None` for "no anomaly". The oracle's own pattern is discarded and the
    /// variance pinned, so every oracle-driven diagnosis reads as steady degradation.
    pub fn into_brain(self) -> Result<Option<Brain>> {
        if !self.has_anomaly {
            return Ok(None);
        }
        let reasoning = self.reasoning.ok_or_else(|| anyhow!("oracle verdict missing reasoning"))?;
        let decision = self.decision.ok_or_else(|| anyhow!("oracle verdict missing decision"))?;
        if !reasoning.confidence.is_finite() {
            bail!("oracle confidence is not a number");
        }
        Ok(Some(Brain {
            reasoning: AgentReasoning {
                cluster_id: reasoning.cluster_id,
                hypothesis: reasoning.hypothesis,
                confidence: reasoning.confidence.clamp(0.0, 1.0),
                variance: ORACLE_VARIANCE,
                detected_pattern: DetectedPattern::SteadyDegradation,
            },
            decision,
        }))
    }
}

/// JSON schema the oracle is asked to answer in.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "hasAnomaly": {"type": "boolean"},
            "reasoning": {
                "type": "object",
                "properties": {
                    "clusterId": {"type": "string"},
                    "hypothesis": {"type": "string"},
                    "confidence": {"type": "number"},
                    "pattern": {"type": "string"}
                },
                "required": ["clusterId", "hypothesis", "confidence", "pattern"]
            },
            "decision": {
                "type": "object",
                "properties": {
                    "actionType": {"type": "string", "enum": ["REROUTE", "ADJUST_RETRY", "THROTTLE", "NONE"]},
                    "rationale": {"type": "string"},
                    "isAutonomous": {"type": "boolean"},
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "target": {"type": "string"},
                            "method": {"type": "string"},
                            "weight": {"type": "number"}
                        },
                        "required": ["target", "method", "weight"]
                    }
                },
                "required": ["actionType", "rationale", "isAutonomous", "parameters"]
            }
        }
    })
}

/// An external reasoning service. Errors carry the remote's message so the
/// caller can spot rate-limit and quota signals.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<OracleVerdict>;
    async fn narrate(&self, prompt: &str) -> Result<String>;
}

/// JSON-over-HTTP oracle. Provider-specific translation lives behind the endpoint.
pub struct HttpOracle {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct NarrativeResponse {
    #[serde(default)]
    text: String,
}

/// Flat analysis body: `{task, model, telemetry, clusters, instruction, schema}`.
pub fn analysis_body(model: &str, request: &AnalysisRequest) -> Value {
    json!({
        "task": "analyze",
        "model": model,
        "telemetry": request.telemetry,
        "clusters": request.clusters,
        "instruction": request.instruction,
        "schema": request.schema,
    })
}

const EMPTY_NARRATIVE: &str = "Autonomous mitigation successful.";

impl HttpOracle {
    pub fn new(url: &str, api_key: Option<String>, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    async fn post(&self, body: Value) -> Result<reqwest::Response> {
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.context("oracle unreachable")?;
        match resp.status() {
            StatusCode::TOO_MANY_REQUESTS => bail!("oracle rate limited: HTTP 429"),
            s if !s.is_success() => {
                let text = resp.text().await.unwrap_or_default();
                bail!("oracle HTTP {}: {}", s.as_u16(), text)
            }
            _ => Ok(resp),
        }
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<OracleVerdict> {
        let resp = self.post(analysis_body(&self.model, request)).await?;
        resp.json::<OracleVerdict>().await.context("malformed oracle verdict")
    }

    async fn narrate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "task": "narrate",
            "model": self.model,
            "prompt": prompt,
        });
        let resp = self.post(body).await?;
        let parsed: NarrativeResponse = resp.json().await.context("malformed narrative")?;
        if parsed.text.trim().is_empty() {
            Ok(EMPTY_NARRATIVE.to_string())
        } else {
            Ok(parsed.text)
        }
    }
}

/// `Analyst` that delegates diagnosis to an `Oracle`.
pub struct OracleAnalyst {
    oracle: Arc<dyn Oracle>,
}

impl OracleAnalyst {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl Analyst for OracleAnalyst {
    fn name(&self) -> &'static str {
        "oracle"
    }

    async fn analyze(&self, suspects: &[RouteMetric], clusters: &ClusterSummary) -> Result<Option<Brain>> {
        let request = AnalysisRequest::new(suspects, clusters);
        let verdict = self.oracle.analyze(&request).await?;
        verdict.into_brain()
    }
}
