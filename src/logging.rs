//! Structured logging for the remediation loop.
//!
//! Every record is one JSON line carrying the run id, a sequence number, the
//! emitting component and a free-form `data` object. Lines go to stdout and to
//! a per-run directory (`events.jsonl` for info and above, `trace.jsonl` for
//! trace/debug) so a run can be replayed or summarised afterwards.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use crate::model::{AgentDecision, AgentMode, RouteMetric};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Telemetry, // Generated transactions, drift, chaos
    Metrics,   // Route aggregation
    Cluster,   // Density clustering summaries
    Reason,    // Oracle / heuristic reasoning
    Predict,   // Impact estimates
    Action,    // Commits, notifications, lifecycle
    Learn,     // Outcome feedback
    Bridge,    // External HTTP collaborators
    System,    // Startup, shutdown, mode changes
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Telemetry => "telemetry",
            Domain::Metrics => "metrics",
            Domain::Cluster => "cluster",
            Domain::Reason => "reason",
            Domain::Predict => "predict",
            Domain::Action => "action",
            Domain::Learn => "learn",
            Domain::Bridge => "bridge",
            Domain::System => "system",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

/// Pair of JSONL files for one run.
#[derive(Debug)]
pub struct RunSink {
    events: Mutex<BufWriter<File>>,
    trace: Mutex<BufWriter<File>>,
}

impl RunSink {
    pub fn open(run_dir: &Path) -> std::io::Result<Self> {
        create_dir_all(run_dir)?;
        let events = File::create(run_dir.join("events.jsonl"))?;
        let trace = File::create(run_dir.join("trace.jsonl"))?;
        Ok(Self {
            events: Mutex::new(BufWriter::new(events)),
            trace: Mutex::new(BufWriter::new(trace)),
        })
    }

    pub fn write(&self, level: Level, line: &str) {
        match level {
            Level::Trace | Level::Debug => write_line(&self.trace, line),
            _ => write_line(&self.events, line),
        }
    }

    pub fn flush(&self) {
        for writer in [&self.events, &self.trace] {
            if let Ok(mut w) = writer.lock() {
                let _ = w.flush();
            }
        }
    }
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    sink: Option<RunSink>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        let sink = match RunSink::open(&run_dir) {
            Ok(sink) => {
                let _ = std::fs::write(
                    run_dir.join("manifest.json"),
                    json!({
                        "run_id": run_id,
                        "ts": ts_now(),
                        "pid": process::id(),
                        "log_dir": run_dir.to_string_lossy(),
                    })
                    .to_string(),
                );
                Some(sink)
            }
            Err(err) => {
                eprintln!("[log] failed to open run dir {}: {}", run_dir.display(), err);
                None
            }
        };
        RunContext { run_id, sink }
    })
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in ["authorization", "Authorization", "api_key", "x-goog-api-key"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["action_id", "route", "agent", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }

    emit_record(level, domain.as_str(), event, fields);
}

fn build_record(
    run_id: &str,
    level: Level,
    component: &str,
    event: &str,
    fields: Map<String, Value>,
) -> Value {
    let fields = sanitize_fields(fields);
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(run_id));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));
    Value::Object(entry)
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let line = build_record(&ctx.run_id, level, component, event, fields).to_string();
    if let Some(sink) = &ctx.sink {
        sink.write(level, &line);
    }
    println!("{}", line);
}

/// Flush the run files; called on shutdown.
pub fn flush() {
    if let Some(sink) = &ensure_run_context().sink {
        sink.flush();
    }
}

// =============================================================================
// Pipeline observer lines
// =============================================================================

pub fn log_mode(mode: AgentMode) {
    log(
        Level::Debug,
        Domain::System,
        "mode",
        obj(&[("mode", v_str(mode.as_str()))]),
    );
}

/// Presentation line: `{agent, message, timestamp}`.
pub fn log_agent_line(agent: &str, message: &str) {
    log(
        Level::Info,
        Domain::System,
        "agent_line",
        obj(&[("agent", v_str(agent)), ("msg", v_str(message))]),
    );
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_route_metrics(metrics: &[RouteMetric]) {
    for m in metrics {
        log(
            Level::Debug,
            Domain::Metrics,
            "route",
            obj(&[
                ("route", v_str(&m.route)),
                ("fail_rate", v_num(m.fail_rate)),
                ("avg_latency", v_num(m.avg_latency)),
                ("avg_retries", v_num(m.avg_retries)),
                ("total", json!(m.total_count)),
                ("top_error", v_str(m.top_error.as_str())),
            ]),
        );
    }
}

pub fn log_decision(action_id: &str, decision: &AgentDecision, confidence: f64, source: &str) {
    log(
        Level::Info,
        Domain::Reason,
        "decision",
        obj(&[
            ("action_id", v_str(action_id)),
            ("route", v_str(&format!("{}:{}", decision.parameters.target, decision.parameters.method))),
            ("action", v_str(decision.action_type.as_str())),
            ("weight", v_num(decision.parameters.weight)),
            ("autonomous", Value::Bool(decision.is_autonomous)),
            ("confidence", v_num(confidence)),
            ("source", v_str(source)),
        ]),
    );
}

pub fn log_bridge_call(call: &str, target: &str, result: &str, detail: Option<&str>) {
    let level = if result == "ok" { Level::Info } else { Level::Warn };
    log(
        level,
        Domain::Bridge,
        call,
        obj(&[
            ("target", v_str(target)),
            ("result", v_str(result)),
            ("detail", detail.map(v_str).unwrap_or(Value::Null)),
        ]),
    );
}

pub fn log_cooldown(until_ms: u64, reason: &str) {
    log(
        Level::Warn,
        Domain::Reason,
        "cooldown_entered",
        obj(&[("until_ms", json!(until_ms)), ("reason", v_str(reason))]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Stage timer
// =============================================================================

/// Emits `elapsed_ms` for a pipeline stage on drop.
pub struct StageTimer {
    label: &'static str,
    started: Instant,
}

impl StageTimer {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
        }
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        log(
            Level::Trace,
            Domain::System,
            "stage_timing",
            obj(&[("label", v_str(self.label)), ("elapsed_ms", v_num(elapsed_ms))]),
        );
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_obj_helper() {
        let m = obj(&[("key", v_str("value")), ("num", v_num(42.0))]);
        assert_eq!(m.get("key").unwrap(), "value");
        assert_eq!(m.get("num").unwrap(), 42.0);
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        let s2 = next_seq();
        assert!(s2 > s1);
    }

    #[test]
    fn test_record_lifts_top_level_keys_and_redacts() {
        let rec = build_record(
            "r-test",
            Level::Warn,
            "bridge",
            "commit",
            obj(&[
                ("action_id", v_str("ACT-ABCDE")),
                ("msg", v_str("hello")),
                ("api_key", v_str("secret")),
                ("weight", v_num(0.0)),
            ]),
        );
        assert_eq!(rec["action_id"], "ACT-ABCDE");
        assert_eq!(rec["msg"], "hello");
        assert_eq!(rec["lvl"], "WARN");
        assert_eq!(rec["data"]["api_key"], "[REDACTED]");
        assert_eq!(rec["data"]["weight"], 0.0);
        assert!(rec["data"].get("action_id").is_none());
    }

    #[test]
    fn test_run_sink_splits_by_level() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RunSink::open(dir.path()).unwrap();
        sink.write(Level::Info, "{\"a\":1}");
        sink.write(Level::Debug, "{\"b\":2}");
        sink.flush();
        let events = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        let trace = std::fs::read_to_string(dir.path().join("trace.jsonl")).unwrap();
        assert_eq!(events.trim(), "{\"a\":1}");
        assert_eq!(trace.trim(), "{\"b\":2}");
    }
}
