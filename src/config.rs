use std::time::Duration;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bridge_base: String,
    pub webhook_url: String,
    pub oracle_url: Option<String>,
    pub oracle_api_key: Option<String>,
    pub oracle_model: String,
    pub http_timeout_ms: u64,
    pub tx_interval_ms: u64,
    pub pipeline_interval_ms: u64,
    pub chaos_poll_ms: u64,
    pub drift_interval_secs: u64,
    pub buffer_cap: usize,
    pub pipeline_window: usize,
    pub history_cap: usize,
    pub cooldown_secs: u64,
    pub autonomous: bool,
    pub sim_seed: Option<u64>,
    pub cluster_eps: f64,
    pub cluster_min_samples: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge_base: "http://localhost:8000/api".to_string(),
            webhook_url: "http://localhost:5678/webhook/payagent-ops".to_string(),
            oracle_url: None,
            oracle_api_key: None,
            oracle_model: "flash-lite".to_string(),
            http_timeout_ms: 8_000,
            tx_interval_ms: 800,
            pipeline_interval_ms: 15_000,
            chaos_poll_ms: 2_000,
            drift_interval_secs: 30,
            buffer_cap: 41,
            pipeline_window: 50,
            history_cap: 8,
            cooldown_secs: 45,
            autonomous: true,
            sim_seed: None,
            cluster_eps: 0.5,
            cluster_min_samples: 3,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let d = Config::default();
        Self {
            bridge_base: std::env::var("BRIDGE_BASE").unwrap_or(d.bridge_base),
            webhook_url: std::env::var("WEBHOOK_URL").unwrap_or(d.webhook_url),
            oracle_url: std::env::var("ORACLE_URL").ok().filter(|v| !v.trim().is_empty()),
            oracle_api_key: std::env::var("ORACLE_API_KEY").ok(),
            oracle_model: std::env::var("ORACLE_MODEL").unwrap_or(d.oracle_model),
            http_timeout_ms: env_parse("HTTP_TIMEOUT_MS", d.http_timeout_ms),
            tx_interval_ms: env_parse("TX_INTERVAL_MS", d.tx_interval_ms),
            pipeline_interval_ms: env_parse("PIPELINE_INTERVAL_MS", d.pipeline_interval_ms),
            chaos_poll_ms: env_parse("CHAOS_POLL_MS", d.chaos_poll_ms),
            drift_interval_secs: env_parse("DRIFT_INTERVAL_SECS", d.drift_interval_secs),
            buffer_cap: env_parse("BUFFER_CAP", d.buffer_cap).max(1),
            pipeline_window: env_parse("PIPELINE_WINDOW", d.pipeline_window).max(1),
            history_cap: env_parse("HISTORY_CAP", d.history_cap).max(1),
            cooldown_secs: env_parse("COOLDOWN_SECS", d.cooldown_secs),
            autonomous: env_flag("AUTONOMOUS", d.autonomous),
            sim_seed: std::env::var("SIM_SEED").ok().and_then(|v| v.parse().ok()),
            cluster_eps: env_parse("CLUSTER_EPS", d.cluster_eps),
            cluster_min_samples: env_parse("CLUSTER_MIN_SAMPLES", d.cluster_min_samples).max(1),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_secs.saturating_mul(1000)
    }

    /// `BRIDGE_BASE=offline` runs against the null bridge.
    pub fn bridge_offline(&self) -> bool {
        self.bridge_base.eq_ignore_ascii_case("offline")
    }
}
