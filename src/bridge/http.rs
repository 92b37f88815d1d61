use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::types::{ChaosStatus, NotificationPayload, RoutingPolicy};
use super::PolicyBridge;
use crate::logging::log_bridge_call;

/// HTTP bridge to the routing API and the notification webhook.
pub struct HttpBridge {
    client: Client,
    api_base: String,
    webhook_url: String,
}

impl HttpBridge {
    pub fn new(api_base: &str, webhook_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            webhook_url: webhook_url.to_string(),
        })
    }
}

#[async_trait]
impl PolicyBridge for HttpBridge {
    async fn chaos_status(&self) -> ChaosStatus {
        let url = format!("{}/chaos_status", self.api_base);
        let resp = match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            _ => return ChaosStatus::inactive(),
        };
        resp.json::<ChaosStatus>().await.unwrap_or_else(|_| ChaosStatus::inactive())
    }

    async fn commit_routing_policy(&self, policy: &RoutingPolicy) -> bool {
        let url = format!("{}/routing", self.api_base);
        let target = format!("{}:{}", policy.bank, policy.method);
        match self.client.post(&url).json(policy).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    log_bridge_call("routing_commit", &target, "ok", None);
                    true
                } else {
                    log_bridge_call("routing_commit", &target, "rejected", Some(status.as_str()));
                    false
                }
            }
            Err(e) => {
                // Unreachable routing API counts as applied; the local loop keeps going.
                log_bridge_call("routing_commit", &target, "unreachable", Some(&e.to_string()));
                true
            }
        }
    }

    async fn dispatch_notification(&self, payload: &NotificationPayload) -> bool {
        match self.client.post(&self.webhook_url).json(payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                log_bridge_call("notify", &payload.cluster_id, "ok", None);
                true
            }
            Ok(resp) => {
                log_bridge_call("notify", &payload.cluster_id, "rejected", Some(resp.status().as_str()));
                false
            }
            Err(e) => {
                log_bridge_call("notify", &payload.cluster_id, "failed", Some(&e.to_string()));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response, returns the base URL.
    async fn one_shot_server(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    fn policy() -> RoutingPolicy {
        RoutingPolicy {
            bank: "HDFC".to_string(),
            method: "UPI".to_string(),
            new_weight: 0.0,
        }
    }

    #[tokio::test]
    async fn test_commit_network_failure_counts_as_applied() {
        // Nothing listens on port 9 locally; the send fails at connect.
        let bridge = HttpBridge::new("http://127.0.0.1:9/api", "http://127.0.0.1:9/hook", Duration::from_millis(500)).unwrap();
        assert!(bridge.commit_routing_policy(&policy()).await);
    }

    #[tokio::test]
    async fn test_commit_rejected_status_is_false() {
        let base = one_shot_server("503 Service Unavailable", "{}").await;
        let bridge = HttpBridge::new(&base, "http://127.0.0.1:9/hook", Duration::from_secs(2)).unwrap();
        assert!(!bridge.commit_routing_policy(&policy()).await);
    }

    #[tokio::test]
    async fn test_chaos_status_parses_body() {
        let base = one_shot_server("200 OK", r#"{"active":true,"bank":"SBI","level":0.9}"#).await;
        let bridge = HttpBridge::new(&base, "http://127.0.0.1:9/hook", Duration::from_secs(2)).unwrap();
        let status = bridge.chaos_status().await;
        assert!(status.active);
        assert_eq!(status.bank.as_deref(), Some("SBI"));
        assert_eq!(status.level, 0.9);
    }

    #[tokio::test]
    async fn test_chaos_status_unreachable_is_inactive() {
        let bridge = HttpBridge::new("http://127.0.0.1:9/api", "http://127.0.0.1:9/hook", Duration::from_millis(500)).unwrap();
        assert_eq!(bridge.chaos_status().await, ChaosStatus::inactive());
    }
}
