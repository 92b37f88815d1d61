//! Synthetic payment stream with background drift and targeted chaos.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::model::{ErrorCode, Issuer, Method, PaymentStatus, Transaction};

const INITIAL_DRIFT: f64 = 0.02;
const MAX_DRIFT: f64 = 0.15;
const DRIFT_REDRAW_PROB: f64 = 0.3;
const TARGET_BIAS: f64 = 0.8;
const UNTARGETED_FAIL_PROB: f64 = 0.02;

/// Owns its RNG and fault state; one instance per simulated stream.
#[derive(Debug)]
pub struct TelemetryGenerator<R: Rng = StdRng> {
    rng: R,
    chaos_level: f64,
    targeted_issuer: Option<Issuer>,
    drift_factor: f64,
}

impl TelemetryGenerator<StdRng> {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(rng)
    }
}

impl<R: Rng> TelemetryGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            chaos_level: 0.0,
            targeted_issuer: None,
            drift_factor: INITIAL_DRIFT,
        }
    }

    pub fn chaos_level(&self) -> f64 {
        self.chaos_level
    }

    pub fn targeted_issuer(&self) -> Option<Issuer> {
        self.targeted_issuer
    }

    pub fn drift_factor(&self) -> f64 {
        self.drift_factor
    }

    /// Overwrites the current chaos injection.
    pub fn set_chaos(&mut self, level: f64, issuer: Option<Issuer>) {
        self.chaos_level = if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.0 };
        self.targeted_issuer = issuer;
        log(
            Level::Info,
            Domain::Telemetry,
            "chaos_set",
            obj(&[
                ("level", v_num(self.chaos_level)),
                ("issuer", issuer.map(|i| v_str(i.as_str())).unwrap_or(serde_json::Value::Null)),
            ]),
        );
    }

    /// One slow-cadence drift cycle. Returns true when the drift was redrawn.
    pub fn maybe_redraw_drift(&mut self) -> bool {
        if self.rng.gen::<f64>() >= DRIFT_REDRAW_PROB {
            return false;
        }
        self.drift_factor = self.rng.gen_range(0.0..MAX_DRIFT);
        log(
            Level::Info,
            Domain::Telemetry,
            "drift_adjusted",
            obj(&[("drift_factor", v_num(self.drift_factor))]),
        );
        true
    }

    pub fn generate_transaction(&mut self, now_ms: u64) -> Transaction {
        let issuer = match self.targeted_issuer {
            Some(target) if self.rng.gen::<f64>() < TARGET_BIAS => target,
            _ => Issuer::ALL[self.rng.gen_range(0..Issuer::ALL.len())],
        };
        let is_targeted = self.targeted_issuer == Some(issuer);

        let fail_prob = self.drift_factor
            + if is_targeted {
                self.chaos_level * 0.5
            } else {
                UNTARGETED_FAIL_PROB
            };
        let failed = self.rng.gen::<f64>() < fail_prob;

        let mut latency = self.rng.gen_range(0.0..400.0) + 150.0;
        let mut retries = 0;
        let mut error_code = ErrorCode::None;

        if failed {
            let roll: f64 = self.rng.gen();
            if roll > 0.7 {
                latency = 4500.0 + self.rng.gen_range(0.0..2000.0);
                error_code = ErrorCode::BankDowntime;
            } else if roll > 0.4 {
                retries = self.rng.gen_range(1..=3);
                error_code = ErrorCode::IssuerThrottling;
            } else {
                latency = 1500.0 + self.rng.gen_range(0.0..1000.0);
                error_code = ErrorCode::NetworkLatency;
            }
        }

        Transaction {
            id: format!("TXN-{}", random_tag(&mut self.rng, 9)),
            timestamp: now_ms,
            amount: self.rng.gen_range(10..10_010),
            method: Method::ALL[self.rng.gen_range(0..Method::ALL.len())],
            issuer,
            status: if failed {
                PaymentStatus::Failed
            } else {
                PaymentStatus::Success
            },
            error_code,
            latency,
            retries,
        }
    }
}

const TAG_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Uppercase base-36 tag used for transaction, action and cluster ids.
pub fn random_tag<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| TAG_ALPHABET[rng.gen_range(0..TAG_ALPHABET.len())] as char)
        .collect()
}
