/// Time-boxed breaker for the reasoning oracle.
///
/// `Closed` lets oracle calls through. A rate-limit signal trips it `Open`
/// until the deadline; it closes again by itself once the clock passes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    Closed,
    Open { until_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct Cooldown {
    pub state: CooldownState,
    pub window_ms: u64,
    pub trips: u32,
}

impl Cooldown {
    pub fn new(window_ms: u64) -> Self {
        Self {
            state: CooldownState::Closed,
            window_ms,
            trips: 0,
        }
    }

    /// Open until `now_ms + window_ms`. A later trip extends the deadline.
    pub fn trip(&mut self, now_ms: u64) -> u64 {
        let until_ms = now_ms.saturating_add(self.window_ms);
        self.state = CooldownState::Open { until_ms };
        self.trips += 1;
        until_ms
    }

    pub fn is_active(&self, now_ms: u64) -> bool {
        match self.state {
            CooldownState::Closed => false,
            CooldownState::Open { until_ms } => now_ms < until_ms,
        }
    }

    /// Whole seconds left, rounded up; 0 when closed or expired.
    pub fn remaining_secs(&self, now_ms: u64) -> u64 {
        match self.state {
            CooldownState::Open { until_ms } if now_ms < until_ms => {
                (until_ms - now_ms + 999) / 1000
            }
            _ => 0,
        }
    }

    pub fn until_ms(&self) -> Option<u64> {
        match self.state {
            CooldownState::Open { until_ms } => Some(until_ms),
            CooldownState::Closed => None,
        }
    }
}

/// True when an error's text carries a rate-limit or quota signal.
pub fn is_rate_limit_message(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("429") || lower.contains("quota") || lower.contains("rate limit")
}

pub fn is_rate_limit(err: &anyhow::Error) -> bool {
    is_rate_limit_message(&format!("{:#}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_opens_for_window() {
        let mut cd = Cooldown::new(45_000);
        assert!(!cd.is_active(0));
        let until = cd.trip(1_000);
        assert_eq!(until, 46_000);
        assert!(cd.is_active(1_000));
        assert!(cd.is_active(45_999));
        assert!(!cd.is_active(46_000));
        assert_eq!(cd.trips, 1);
    }

    #[test]
    fn test_remaining_rounds_up() {
        let mut cd = Cooldown::new(45_000);
        cd.trip(0);
        assert_eq!(cd.remaining_secs(0), 45);
        assert_eq!(cd.remaining_secs(44_001), 1);
        assert_eq!(cd.remaining_secs(45_000), 0);
    }

    #[test]
    fn test_rate_limit_detection_walks_context_chain() {
        let err = anyhow::anyhow!("HTTP 429 Too Many Requests").context("oracle analyze");
        assert!(is_rate_limit(&err));
        assert!(is_rate_limit_message("Resource has been exhausted (e.g. check QUOTA)"));
        assert!(!is_rate_limit_message("connection refused"));
    }
}
