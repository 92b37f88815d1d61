use anyhow::Result;
use std::sync::{Arc, Mutex};
use tokio::time::{interval, Duration, MissedTickBehavior};

use payagent::bridge::{HttpBridge, NullBridge, PolicyBridge};
use payagent::config::Config;
use payagent::fault::chaos::{ChaosChange, ChaosMirror};
use payagent::logging::{self, log, obj, ts_epoch_ms, v_num, v_str, Domain, Level};
use payagent::orchestrator::{JsonLogObserver, Orchestrator, OrchestratorConfig, PipelineOutcome};
use payagent::reason::oracle::HttpOracle;
use payagent::reason::ReasoningEngine;
use payagent::telemetry::{TelemetryGenerator, TelemetryWindow};

const INTEGRITY_WINDOW: usize = 20;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    let bridge: Arc<dyn PolicyBridge> = if cfg.bridge_offline() {
        Arc::new(NullBridge)
    } else {
        Arc::new(HttpBridge::new(&cfg.bridge_base, &cfg.webhook_url, cfg.http_timeout())?)
    };
    let reasoning = match &cfg.oracle_url {
        Some(url) => ReasoningEngine::with_oracle(Arc::new(HttpOracle::new(
            url,
            cfg.oracle_api_key.clone(),
            &cfg.oracle_model,
            cfg.http_timeout(),
        )?)),
        None => ReasoningEngine::local(),
    };
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("bridge", v_str(if cfg.bridge_offline() { "null" } else { cfg.bridge_base.as_str() })),
            ("oracle", v_str(if reasoning.has_oracle() { "http" } else { "none" })),
            ("autonomous", serde_json::Value::Bool(cfg.autonomous)),
            ("pipeline_interval_ms", v_num(cfg.pipeline_interval_ms as f64)),
        ]),
    );

    let orchestrator = Arc::new(Orchestrator::new(
        OrchestratorConfig::from(&cfg),
        reasoning,
        bridge.clone(),
        Arc::new(JsonLogObserver),
    ));
    let generator = Arc::new(Mutex::new(TelemetryGenerator::new(cfg.sim_seed)));
    let window = Arc::new(Mutex::new(TelemetryWindow::new(cfg.buffer_cap)));

    let tx_loop = {
        let generator = generator.clone();
        let window = window.clone();
        let period = Duration::from_millis(cfg.tx_interval_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                let tx = match generator.lock() {
                    Ok(mut g) => g.generate_transaction(ts_epoch_ms()),
                    Err(_) => break,
                };
                if let Ok(mut w) = window.lock() {
                    w.push(tx);
                }
            }
        })
    };

    let drift_loop = {
        let generator = generator.clone();
        let period = Duration::from_secs(cfg.drift_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Ok(mut g) = generator.lock() {
                    g.maybe_redraw_drift();
                }
            }
        })
    };

    let chaos_loop = {
        let generator = generator.clone();
        let bridge = bridge.clone();
        let period = Duration::from_millis(cfg.chaos_poll_ms.max(1));
        tokio::spawn(async move {
            let mut mirror = ChaosMirror::new();
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let status = bridge.chaos_status().await;
                let change = mirror.observe(&status);
                if let Ok(mut g) = generator.lock() {
                    match change {
                        ChaosChange::Inject { level, issuer } => g.set_chaos(level, Some(issuer)),
                        ChaosChange::Clear => g.set_chaos(0.0, None),
                        ChaosChange::Unchanged => {}
                    }
                }
            }
        })
    };

    let pipeline_loop = {
        let orchestrator = orchestrator.clone();
        let window = window.clone();
        let pipeline_window = cfg.pipeline_window;
        let period = Duration::from_millis(cfg.pipeline_interval_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let (txs, integrity) = match window.lock() {
                    Ok(w) => (w.recent(pipeline_window), w.success_rate(INTEGRITY_WINDOW)),
                    Err(_) => break,
                };
                log(
                    Level::Info,
                    Domain::Telemetry,
                    "integrity",
                    obj(&[
                        ("success_rate", v_num(integrity)),
                        ("window", v_num(txs.len() as f64)),
                    ]),
                );
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    let outcome = orchestrator.run_pipeline(&txs, ts_epoch_ms()).await;
                    if let PipelineOutcome::Recorded { action_id, status } = outcome {
                        log(
                            Level::Info,
                            Domain::Action,
                            "recorded",
                            obj(&[
                                ("action_id", v_str(&action_id)),
                                ("status", v_str(&format!("{:?}", status))),
                            ]),
                        );
                    }
                });
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    for handle in [tx_loop, drift_loop, chaos_loop, pipeline_loop] {
        handle.abort();
    }
    log(
        Level::Info,
        Domain::System,
        "shutdown",
        obj(&[("actions", v_num(orchestrator.history().len() as f64))]),
    );
    logging::flush();
    Ok(())
}
