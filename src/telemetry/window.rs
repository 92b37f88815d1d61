use std::collections::VecDeque;

use crate::model::Transaction;

/// Bounded sliding buffer of the most recent transactions.
#[derive(Debug, Clone)]
pub struct TelemetryWindow {
    cap: usize,
    txs: VecDeque<Transaction>,
}

impl TelemetryWindow {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            txs: VecDeque::with_capacity(cap),
        }
    }

    /// Append, evicting the oldest entry past capacity.
    pub fn push(&mut self, tx: Transaction) {
        if self.txs.len() >= self.cap {
            self.txs.pop_front();
        }
        self.txs.push_back(tx);
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Last `n` transactions, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Transaction> {
        let skip = self.txs.len().saturating_sub(n);
        self.txs.iter().skip(skip).cloned().collect()
    }

    /// Percentage of successful transactions among the last `n`; 100 when empty.
    pub fn success_rate(&self, n: usize) -> f64 {
        let recent = self.recent(n);
        if recent.is_empty() {
            return 100.0;
        }
        let ok = recent.iter().filter(|t| !t.is_failed()).count();
        ok as f64 / recent.len() as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::generator::TelemetryGenerator;

    #[test]
    fn test_evicts_oldest_first() {
        let mut gen = TelemetryGenerator::new(Some(1));
        let mut window = TelemetryWindow::new(3);
        let txs: Vec<_> = (0..5).map(|i| gen.generate_transaction(i)).collect();
        for tx in txs.iter().cloned() {
            window.push(tx);
        }
        assert_eq!(window.len(), 3);
        let kept: Vec<_> = window.recent(10).into_iter().map(|t| t.timestamp).collect();
        assert_eq!(kept, vec![2, 3, 4]);
    }

    #[test]
    fn test_recent_slices_tail() {
        let mut gen = TelemetryGenerator::new(Some(2));
        let mut window = TelemetryWindow::new(10);
        for i in 0..6 {
            window.push(gen.generate_transaction(i));
        }
        let tail: Vec<_> = window.recent(2).into_iter().map(|t| t.timestamp).collect();
        assert_eq!(tail, vec![4, 5]);
    }

    #[test]
    fn test_success_rate_empty_is_full() {
        let window = TelemetryWindow::new(4);
        assert!(window.is_empty());
        assert_eq!(window.success_rate(20), 100.0);
    }
}
