use crate::bridge::ChaosStatus;
use crate::model::Issuer;

/// What the generator should do after a status poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChaosChange {
    Inject { level: f64, issuer: Issuer },
    Clear,
    Unchanged,
}

/// Mirrors the external chaos trigger into local generator state.
///
/// Only chaos that arrived through the poll is cleared by the poll; locally
/// injected chaos is left alone.
#[derive(Debug, Clone, Default)]
pub struct ChaosMirror {
    issuer: Option<Issuer>,
    external: bool,
}

impl ChaosMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn issuer(&self) -> Option<Issuer> {
        self.issuer
    }

    /// Record a locally injected fault (or clear one with `None`).
    pub fn set_local(&mut self, issuer: Option<Issuer>) {
        self.issuer = issuer;
        self.external = false;
    }

    pub fn observe(&mut self, status: &ChaosStatus) -> ChaosChange {
        let bank = status.bank.as_deref().and_then(Issuer::parse);
        if status.active {
            match bank {
                Some(issuer) if Some(issuer) != self.issuer => {
                    self.issuer = Some(issuer);
                    self.external = true;
                    ChaosChange::Inject {
                        level: status.level.clamp(0.0, 1.0),
                        issuer,
                    }
                }
                _ => ChaosChange::Unchanged,
            }
        } else if self.external {
            self.issuer = None;
            self.external = false;
            ChaosChange::Clear
        } else {
            ChaosChange::Unchanged
        }
    }
}
