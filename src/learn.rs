use std::collections::VecDeque;

use crate::logging::{log, obj, v_num, v_str, Domain, Level};

const LEDGER_CAP: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub action_id: String,
    pub success_rate_after: f64,
}

/// Post-action feedback ledger. Nothing reads it back into decisions yet.
#[derive(Debug, Default)]
pub struct Learner {
    ledger: VecDeque<Outcome>,
}

impl Learner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, action_id: &str, success_rate_after: f64) {
        if self.ledger.len() >= LEDGER_CAP {
            self.ledger.pop_front();
        }
        self.ledger.push_back(Outcome {
            action_id: action_id.to_string(),
            success_rate_after,
        });
        log(
            Level::Info,
            Domain::Learn,
            "outcome",
            obj(&[
                ("action_id", v_str(action_id)),
                ("success_rate_after", v_num(success_rate_after)),
            ]),
        );
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.ledger.iter()
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }
}
