//! Per-route reduction of a transaction window.

use std::collections::HashMap;

use crate::model::{round_to, route_key, ErrorCode, Issuer, Method, RouteMetric, Transaction};

#[derive(Debug, Default)]
struct RouteAccumulator {
    count: usize,
    fails: usize,
    latency_sum: f64,
    retries_sum: u64,
    // (code, count) in first-seen order
    errors: Vec<(ErrorCode, usize)>,
}

impl RouteAccumulator {
    fn add(&mut self, tx: &Transaction) {
        self.count += 1;
        self.latency_sum += tx.latency;
        self.retries_sum += u64::from(tx.retries);
        if tx.is_failed() {
            self.fails += 1;
            if tx.error_code != ErrorCode::None {
                match self.errors.iter_mut().find(|(code, _)| *code == tx.error_code) {
                    Some((_, n)) => *n += 1,
                    None => self.errors.push((tx.error_code, 1)),
                }
            }
        }
    }

    fn top_error(&self) -> ErrorCode {
        // strict > keeps the first-seen code on ties
        let mut best: Option<(ErrorCode, usize)> = None;
        for &(code, n) in &self.errors {
            match best {
                Some((_, b)) if n <= b => {}
                _ => best = Some((code, n)),
            }
        }
        best.map(|(code, _)| code).unwrap_or(ErrorCode::None)
    }

    fn finish(&self, issuer: Issuer, method: Method) -> RouteMetric {
        let n = self.count as f64;
        RouteMetric {
            route: route_key(issuer, method),
            issuer,
            method,
            fail_rate: round_to(self.fails as f64 / n, 2),
            avg_latency: (self.latency_sum / n).round(),
            avg_retries: round_to(self.retries_sum as f64 / n, 2),
            total_count: self.count,
            top_error: self.top_error(),
        }
    }
}

/// Group by `(issuer, method)` in first-seen order. Empty input yields no metrics.
pub fn aggregate(window: &[Transaction]) -> Vec<RouteMetric> {
    let mut order: Vec<(Issuer, Method)> = Vec::new();
    let mut routes: HashMap<(Issuer, Method), RouteAccumulator> = HashMap::new();

    for tx in window {
        let key = (tx.issuer, tx.method);
        routes
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                RouteAccumulator::default()
            })
            .add(tx);
    }

    order
        .into_iter()
        .filter_map(|key| routes.get(&key).map(|acc| acc.finish(key.0, key.1)))
        .collect()
}

/// Fraction of failed transactions; 0 for an empty window.
pub fn fail_rate(window: &[Transaction]) -> f64 {
    let fails = window.iter().filter(|t| t.is_failed()).count();
    fails as f64 / window.len().max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PaymentStatus;

    fn tx(issuer: Issuer, method: Method, failed: bool, code: ErrorCode, latency: f64, retries: u32) -> Transaction {
        Transaction {
            id: "TXN-T".to_string(),
            timestamp: 0,
            amount: 100,
            method,
            issuer,
            status: if failed { PaymentStatus::Failed } else { PaymentStatus::Success },
            error_code: code,
            latency,
            retries,
        }
    }

    #[test]
    fn test_empty_window_has_no_metrics() {
        assert!(aggregate(&[]).is_empty());
        assert_eq!(fail_rate(&[]), 0.0);
    }

    #[test]
    fn test_route_statistics() {
        let window = vec![
            tx(Issuer::Hdfc, Method::Upi, true, ErrorCode::BankDowntime, 5000.0, 0),
            tx(Issuer::Hdfc, Method::Upi, false, ErrorCode::None, 200.0, 0),
            tx(Issuer::Hdfc, Method::Upi, true, ErrorCode::IssuerThrottling, 300.0, 2),
            tx(Issuer::Sbi, Method::Card, false, ErrorCode::None, 301.0, 0),
        ];
        let metrics = aggregate(&window);
        assert_eq!(metrics.len(), 2);
        let hdfc = &metrics[0];
        assert_eq!(hdfc.route, "HDFC:UPI");
        assert_eq!(hdfc.total_count, 3);
        assert_eq!(hdfc.fail_rate, 0.67);
        assert_eq!(hdfc.avg_latency, 1833.0);
        assert_eq!(hdfc.avg_retries, 0.67);
        // one each: first seen wins
        assert_eq!(hdfc.top_error, ErrorCode::BankDowntime);

        let sbi = &metrics[1];
        assert_eq!(sbi.fail_rate, 0.0);
        assert_eq!(sbi.top_error, ErrorCode::None);
    }

    #[test]
    fn test_top_error_prefers_most_frequent() {
        let window = vec![
            tx(Issuer::Axis, Method::Netbanking, true, ErrorCode::NetworkLatency, 1600.0, 0),
            tx(Issuer::Axis, Method::Netbanking, true, ErrorCode::IssuerThrottling, 200.0, 1),
            tx(Issuer::Axis, Method::Netbanking, true, ErrorCode::IssuerThrottling, 200.0, 3),
        ];
        assert_eq!(aggregate(&window)[0].top_error, ErrorCode::IssuerThrottling);
    }

    #[test]
    fn test_failed_without_code_is_not_top_error() {
        let window = vec![tx(Issuer::Icici, Method::Card, true, ErrorCode::None, 400.0, 0)];
        let m = &aggregate(&window)[0];
        assert_eq!(m.fail_rate, 1.0);
        assert_eq!(m.top_error, ErrorCode::None);
    }
}
