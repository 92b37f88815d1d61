//! External routing-policy, notification and chaos-status collaborators.

use async_trait::async_trait;

pub mod http;
pub mod types;

pub use http::HttpBridge;
pub use types::{ChaosStatus, NotificationPayload, RoutingPolicy};

/// Boundary to the payment-routing control plane. Implementations never
/// error past this trait: every call resolves to a value the loop can act on.
#[async_trait]
pub trait PolicyBridge: Send + Sync {
    /// Current external chaos trigger; unreachable reads as inactive.
    async fn chaos_status(&self) -> ChaosStatus;

    /// Apply a routing weight. True when the policy is considered applied.
    async fn commit_routing_policy(&self, policy: &RoutingPolicy) -> bool;

    /// Fire-and-forget incident notification. True on a 2xx response.
    async fn dispatch_notification(&self, payload: &NotificationPayload) -> bool;
}

/// Offline stand-in: accepts every commit, drops every notification.
pub struct NullBridge;

#[async_trait]
impl PolicyBridge for NullBridge {
    async fn chaos_status(&self) -> ChaosStatus {
        ChaosStatus::inactive()
    }

    async fn commit_routing_policy(&self, _policy: &RoutingPolicy) -> bool {
        true
    }

    async fn dispatch_notification(&self, _payload: &NotificationPayload) -> bool {
        false
    }
}
