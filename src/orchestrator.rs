//! Observe → reason → predict → act → learn, one run per tick.
//!
//! The orchestrator is the only stateful coordinator. A boolean in-flight flag
//! makes runs single-flight: a tick that arrives mid-run is dropped, never
//! queued. Action history, the oracle cooldown and the learner sit behind one
//! short-lived lock that is never held across an await.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::bridge::{NotificationPayload, PolicyBridge, RoutingPolicy};
use crate::cluster::{cluster_window, Dbscan};
use crate::config::Config;
use crate::learn::{Learner, Outcome};
use crate::logging::{log, log_agent_line, log_cooldown, log_decision, log_mode, log_route_metrics, obj, ts_now, v_num, v_str, Domain, Level, StageTimer};
use crate::metrics::{aggregate, fail_rate};
use crate::model::{ActionStatus, AgentAction, AgentMode, Transaction};
use crate::predict::predict;
use crate::reason::ReasoningEngine;
use crate::reliability::cooldown::{is_rate_limit, Cooldown};
use crate::telemetry::generator::random_tag;
use crate::verify::action_sm::{apply_event, Event};

/// Below this window fail rate, a system that has never acted stays idle.
pub const BOOTSTRAP_FAIL_FLOOR: f64 = 0.03;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub agent: String,
    pub message: String,
    pub timestamp: String,
}

/// Presentation hook for mode transitions and agent log lines.
pub trait PipelineObserver: Send + Sync {
    fn on_mode(&self, mode: AgentMode);
    fn on_log(&self, line: &LogLine);
}

/// Forwards everything to the structured log.
pub struct JsonLogObserver;

impl PipelineObserver for JsonLogObserver {
    fn on_mode(&self, mode: AgentMode) {
        log_mode(mode);
    }

    fn on_log(&self, line: &LogLine) {
        log_agent_line(&line.agent, &line.message);
    }
}

/// Keeps every mode and line in memory; for tests and embedding viewers.
#[derive(Default)]
pub struct RecordingObserver {
    modes: Mutex<Vec<AgentMode>>,
    lines: Mutex<Vec<LogLine>>,
}

impl RecordingObserver {
    pub fn modes(&self) -> Vec<AgentMode> {
        self.modes.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_mode(&self, mode: AgentMode) {
        if let Ok(mut m) = self.modes.lock() {
            m.push(mode);
        }
    }

    fn on_log(&self, line: &LogLine) {
        if let Ok(mut l) = self.lines.lock() {
            l.push(line.clone());
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub window: usize,
    pub history_cap: usize,
    pub cooldown_ms: u64,
    pub autonomous: bool,
    pub dbscan: Dbscan,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            window: cfg.pipeline_window,
            history_cap: cfg.history_cap,
            cooldown_ms: cfg.cooldown_ms(),
            autonomous: cfg.autonomous,
            dbscan: Dbscan::new(cfg.cluster_eps, cfg.cluster_min_samples),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Another run was in flight; this tick was dropped.
    Skipped,
    /// Bootstrap guard or no anomaly.
    Idle,
    Recorded { action_id: String, status: ActionStatus },
    /// Error swallowed; no action recorded.
    Aborted { error: String },
}

struct OrchestratorState {
    history: VecDeque<AgentAction>,
    cooldown: Cooldown,
    learner: Learner,
    mode: AgentMode,
}

struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Orchestrator {
    cfg: OrchestratorConfig,
    reasoning: ReasoningEngine,
    bridge: Arc<dyn PolicyBridge>,
    observer: Arc<dyn PipelineObserver>,
    in_flight: AtomicBool,
    autonomous: AtomicBool,
    state: Mutex<OrchestratorState>,
    // Serialises external commits from ticks and operators.
    commit_lock: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        cfg: OrchestratorConfig,
        reasoning: ReasoningEngine,
        bridge: Arc<dyn PolicyBridge>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            autonomous: AtomicBool::new(cfg.autonomous),
            state: Mutex::new(OrchestratorState {
                history: VecDeque::with_capacity(cfg.history_cap),
                cooldown: Cooldown::new(cfg.cooldown_ms),
                learner: Learner::new(),
                mode: AgentMode::Idle,
            }),
            cfg,
            reasoning,
            bridge,
            observer,
            in_flight: AtomicBool::new(false),
            commit_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, OrchestratorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_mode(&self, mode: AgentMode) {
        self.state().mode = mode;
        self.observer.on_mode(mode);
    }

    fn emit(&self, agent: &str, message: impl Into<String>) {
        self.observer.on_log(&LogLine {
            agent: agent.to_string(),
            message: message.into(),
            timestamp: ts_now(),
        });
    }

    pub fn mode(&self) -> AgentMode {
        self.state().mode
    }

    pub fn is_processing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn set_autonomous(&self, on: bool) {
        self.autonomous.store(on, Ordering::Release);
    }

    pub fn is_autonomous(&self) -> bool {
        self.autonomous.load(Ordering::Acquire)
    }

    /// Insertion-ordered snapshot, oldest first.
    pub fn history(&self) -> Vec<AgentAction> {
        self.state().history.iter().cloned().collect()
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.state().learner.outcomes().cloned().collect()
    }

    pub fn cooldown_active(&self, now_ms: u64) -> bool {
        self.state().cooldown.is_active(now_ms)
    }

    pub fn cooldown_remaining_secs(&self, now_ms: u64) -> u64 {
        self.state().cooldown.remaining_secs(now_ms)
    }

    fn enter_cooldown(&self, now_ms: u64, reason: &str) {
        let until = self.state().cooldown.trip(now_ms);
        log_cooldown(until, reason);
        self.emit("System", "Oracle quota exhausted. Entering cooldown.");
    }

    /// One pipeline tick over `transactions` (oldest first).
    pub async fn run_pipeline(&self, transactions: &[Transaction], now_ms: u64) -> PipelineOutcome {
        let Some(_flight) = FlightGuard::acquire(&self.in_flight) else {
            log(Level::Debug, Domain::System, "tick_skipped", obj(&[("reason", v_str("in_flight"))]));
            return PipelineOutcome::Skipped;
        };
        let _timer = StageTimer::new("pipeline");

        let (throttled, wait_secs, has_history) = {
            let st = self.state();
            (
                st.cooldown.is_active(now_ms),
                st.cooldown.remaining_secs(now_ms),
                !st.history.is_empty(),
            )
        };
        if throttled {
            self.emit("System", format!("Oracle cooldown: using local rulebook for the next {}s.", wait_secs));
        }

        let skip = transactions.len().saturating_sub(self.cfg.window);
        let recent = &transactions[skip..];
        let window_fail_rate = fail_rate(recent);

        if window_fail_rate < BOOTSTRAP_FAIL_FLOOR && !has_history {
            self.set_mode(AgentMode::Idle);
            return PipelineOutcome::Idle;
        }

        match self.run_stages(recent, window_fail_rate, throttled, now_ms).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = format!("{:#}", e);
                if is_rate_limit(&e) {
                    self.enter_cooldown(now_ms, &error);
                } else {
                    log(Level::Warn, Domain::System, "pipeline_error", obj(&[("error", v_str(&error))]));
                }
                self.set_mode(AgentMode::Idle);
                PipelineOutcome::Aborted { error }
            }
        }
    }

    async fn run_stages(
        &self,
        recent: &[Transaction],
        window_fail_rate: f64,
        throttled: bool,
        now_ms: u64,
    ) -> Result<PipelineOutcome> {
        self.set_mode(AgentMode::Consuming);
        let metrics = aggregate(recent);
        log_route_metrics(&metrics);
        let clusters = cluster_window(recent, &self.cfg.dbscan);
        log(
            Level::Debug,
            Domain::Cluster,
            "summary",
            obj(&[
                ("clusters", v_num(clusters.clusters as f64)),
                ("noise", v_num(clusters.noise as f64)),
                ("largest_failure_cluster", v_num(clusters.largest_failure_cluster as f64)),
                ("coherent", serde_json::Value::Bool(clusters.coherent)),
            ]),
        );
        self.emit("Observe", format!("Ingested {} signals.", recent.len()));

        self.set_mode(AgentMode::Reasoning);
        let outcome = self.reasoning.analyze_and_decide(&metrics, &clusters, throttled).await;
        if outcome.rate_limited() {
            let reason = outcome.oracle_error.clone().unwrap_or_default();
            self.enter_cooldown(now_ms, &reason);
        }
        let Some(brain) = outcome.brain else {
            self.set_mode(AgentMode::Idle);
            return Ok(PipelineOutcome::Idle);
        };
        self.emit("Reason", format!("Diagnostic output: {}", brain.reasoning.hypothesis));

        self.set_mode(AgentMode::Predicting);
        let prediction = predict(brain.reasoning.confidence);

        let mut action = AgentAction {
            id: format!("ACT-{}", random_tag(&mut rand::thread_rng(), 5)),
            timestamp: now_ms,
            decision: brain.decision,
            prediction,
            reasoning: brain.reasoning,
            status: ActionStatus::Draft,
        };
        log_decision(&action.id, &action.decision, action.reasoning.confidence, outcome.source.as_str());

        if self.is_autonomous() && action.decision.is_autonomous {
            self.set_mode(AgentMode::Acting);
            self.emit(
                "Action",
                format!(
                    "Applying routing policy: {} {} @ {}",
                    action.decision.parameters.target, action.decision.parameters.method, action.decision.parameters.weight
                ),
            );
            let skip_oracle = self.cooldown_active(now_ms);
            let _serial = self.commit_lock.lock().await;
            self.execute(&mut action, skip_oracle).await?;
        }

        let action_id = action.id.clone();
        let status = action.status;
        {
            let mut st = self.state();
            while st.history.len() >= self.cfg.history_cap {
                st.history.pop_front();
            }
            st.history.push_back(action);
        }

        self.set_mode(AgentMode::Learning);
        self.state().learner.record(&action_id, (1.0 - window_fail_rate) * 100.0);

        Ok(PipelineOutcome::Recorded { action_id, status })
    }

    /// Commit → narrative → notification → `EXECUTED`. Commit success is the
    /// gate; a failed notification still executes the action. Callers hold
    /// `commit_lock`.
    async fn execute(&self, action: &mut AgentAction, skip_oracle: bool) -> Result<bool> {
        let policy = RoutingPolicy {
            bank: action.decision.parameters.target.clone(),
            method: action.decision.parameters.method.clone(),
            new_weight: action.decision.parameters.weight,
        };

        if !self.bridge.commit_routing_policy(&policy).await {
            apply_event(action, Event::CommitRejected { reason: "routing commit refused".to_string() })
                .map_err(|e| anyhow!(e.msg))?;
            self.emit("Action", format!("Routing commit for {} was refused.", policy.bank));
            return Ok(false);
        }

        self.emit("System", "Crafting incident report...");
        let report = self.reasoning.craft_incident_report(action, skip_oracle).await;
        let payload = NotificationPayload::from_action(action, Some(&report));
        let notified = self.bridge.dispatch_notification(&payload).await;

        apply_event(action, Event::CommitConfirmed).map_err(|e| anyhow!(e.msg))?;
        log(
            Level::Info,
            Domain::Action,
            "executed",
            obj(&[
                ("action_id", v_str(&action.id)),
                ("route", v_str(&format!("{}:{}", policy.bank, policy.method))),
                ("notified", serde_json::Value::Bool(notified)),
            ]),
        );
        if notified {
            self.emit("Action", "Policy synced. Incident report dispatched.");
        } else {
            self.emit("Action", "Policy synced. Incident report dispatch failed.");
        }
        Ok(true)
    }

    /// Marks the stored copy `EXECUTED` after a confirmed commit. False when the
    /// stored entry refused the transition; an evicted entry is not an error.
    fn confirm_in_history(&self, action_id: &str) -> bool {
        let applied = {
            let mut st = self.state();
            match st.history.iter_mut().find(|a| a.id == action_id) {
                Some(stored) => apply_event(stored, Event::CommitConfirmed),
                None => Ok(()),
            }
        };
        match applied {
            Ok(()) => true,
            Err(e) => {
                log(
                    Level::Warn,
                    Domain::Action,
                    "manual_commit_error",
                    obj(&[("action_id", v_str(action_id)), ("error", v_str(&e.msg))]),
                );
                false
            }
        }
    }

    /// Operator commit of a recorded `DRAFT`. Returns whether the commit succeeded.
    /// The status is read under the commit lock, so a draft is committed at most once.
    pub async fn manual_commit(&self, action_id: &str, now_ms: u64) -> bool {
        let _serial = self.commit_lock.lock().await;

        let found = self.state().history.iter().find(|a| a.id == action_id).cloned();
        let Some(mut action) = found else {
            log(Level::Warn, Domain::Action, "manual_commit_unknown", obj(&[("action_id", v_str(action_id))]));
            return false;
        };
        if action.status != ActionStatus::Draft {
            log(
                Level::Info,
                Domain::Action,
                "manual_commit_not_draft",
                obj(&[("action_id", v_str(action_id)), ("status", v_str(&format!("{:?}", action.status)))]),
            );
            return false;
        }

        let skip_oracle = self.cooldown_active(now_ms);
        match self.execute(&mut action, skip_oracle).await {
            Ok(true) => {
                self.confirm_in_history(action_id);
                self.emit("Action", "Manual commit: policy synced and report sent.");
                true
            }
            Ok(false) => false,
            Err(e) => {
                log(Level::Warn, Domain::Action, "manual_commit_error", obj(&[("error", v_str(&format!("{:#}", e)))]));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{ChaosStatus, NullBridge};
    use crate::model::{ErrorCode, Issuer, Method, PaymentStatus};
    use async_trait::async_trait;

    fn tx(i: usize, issuer: Issuer, method: Method, failed: bool) -> Transaction {
        Transaction {
            id: format!("TXN-{}", i),
            timestamp: i as u64,
            amount: 100,
            method,
            issuer,
            status: if failed { PaymentStatus::Failed } else { PaymentStatus::Success },
            error_code: if failed { ErrorCode::BankDowntime } else { ErrorCode::None },
            latency: if failed { 5000.0 } else { 300.0 },
            retries: 0,
        }
    }

    fn healthy(n: usize) -> Vec<Transaction> {
        (0..n).map(|i| tx(i, Issuer::Sbi, Method::Card, false)).collect()
    }

    fn degraded() -> Vec<Transaction> {
        (0..20).map(|i| tx(i, Issuer::Hdfc, Method::Upi, i % 2 == 0)).collect()
    }

    fn orchestrator(observer: Arc<RecordingObserver>) -> Orchestrator {
        Orchestrator::new(OrchestratorConfig::default(), ReasoningEngine::local(), Arc::new(NullBridge), observer)
    }

    struct RefusingBridge;

    #[async_trait]
    impl PolicyBridge for RefusingBridge {
        async fn chaos_status(&self) -> ChaosStatus {
            ChaosStatus::inactive()
        }
        async fn commit_routing_policy(&self, _policy: &RoutingPolicy) -> bool {
            false
        }
        async fn dispatch_notification(&self, _payload: &NotificationPayload) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_bootstrap_guard_idles_without_history() {
        let obs = Arc::new(RecordingObserver::default());
        let orch = orchestrator(obs.clone());
        assert_eq!(orch.run_pipeline(&healthy(30), 0).await, PipelineOutcome::Idle);
        assert_eq!(obs.modes(), vec![AgentMode::Idle]);
        assert!(orch.history().is_empty());
    }

    #[tokio::test]
    async fn test_autonomous_run_executes_and_learns() {
        let obs = Arc::new(RecordingObserver::default());
        let orch = orchestrator(obs.clone());
        let outcome = orch.run_pipeline(&degraded(), 1_000).await;
        match outcome {
            PipelineOutcome::Recorded { status, .. } => assert_eq!(status, ActionStatus::Executed),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(
            obs.modes(),
            vec![
                AgentMode::Consuming,
                AgentMode::Reasoning,
                AgentMode::Predicting,
                AgentMode::Acting,
                AgentMode::Learning
            ]
        );
        let outcomes = orch.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].success_rate_after, 50.0);
    }

    #[tokio::test]
    async fn test_manual_mode_records_draft() {
        let obs = Arc::new(RecordingObserver::default());
        let orch = orchestrator(obs.clone());
        orch.set_autonomous(false);
        orch.run_pipeline(&degraded(), 0).await;
        let history = orch.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ActionStatus::Draft);
        assert!(!obs.modes().contains(&AgentMode::Acting));

        assert!(orch.manual_commit(&history[0].id, 10).await);
        assert_eq!(orch.history()[0].status, ActionStatus::Executed);
        // already executed: nothing left to commit
        assert!(!orch.manual_commit(&history[0].id, 20).await);
    }

    #[tokio::test]
    async fn test_refused_commit_stays_draft() {
        let obs = Arc::new(RecordingObserver::default());
        let orch = Orchestrator::new(
            OrchestratorConfig::default(),
            ReasoningEngine::local(),
            Arc::new(RefusingBridge),
            obs,
        );
        orch.run_pipeline(&degraded(), 0).await;
        let id = orch.history()[0].id.clone();
        assert_eq!(orch.history()[0].status, ActionStatus::Draft);
        assert!(!orch.manual_commit(&id, 5).await);
        assert_eq!(orch.history()[0].status, ActionStatus::Draft);
    }

    #[tokio::test]
    async fn test_confirm_reports_refused_transition() {
        let orch = orchestrator(Arc::new(RecordingObserver::default()));
        orch.set_autonomous(false);
        orch.run_pipeline(&degraded(), 0).await;
        let id = orch.history()[0].id.clone();
        orch.state().history[0].status = ActionStatus::Failed;

        assert!(!orch.confirm_in_history(&id));
        assert_eq!(orch.history()[0].status, ActionStatus::Failed);
        // evicted entries are fine
        assert!(orch.confirm_in_history("ACT-GONE0"));
    }

    #[tokio::test]
    async fn test_unknown_manual_commit_is_false() {
        let orch = orchestrator(Arc::new(RecordingObserver::default()));
        assert!(!orch.manual_commit("ACT-NOPE0", 0).await);
    }

    #[test]
    fn test_flight_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let first = FlightGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(FlightGuard::acquire(&flag).is_none());
        drop(first);
        assert!(FlightGuard::acquire(&flag).is_some());
    }
}
