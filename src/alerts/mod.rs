use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::rules::AlertMessage;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook responded with status {0}")]
    Status(StatusCode),
}

impl DispatchError {
    /// Transport failures, rate limiting and server errors may succeed later;
    /// any other client error will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status(status) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
        }
    }
}

/// Delivers one alert to its destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &AlertMessage) -> Result<(), DispatchError>;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(500),
        }
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::single_attempt()
        }
    }

    /// Exponential backoff with up to 50% random jitter, capped.
    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let backoff = self.base_delay.saturating_mul(factor).min(MAX_RETRY_DELAY);
        let jitter_ms = backoff.as_millis() as u64 / 2;
        let jitter = rand::rng().random_range(0..=jitter_ms);
        backoff + Duration::from_millis(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single_attempt()
    }
}

/// Posts alerts as `{"text": ...}` JSON to a single webhook URL.
pub struct WebhookDispatcher {
    client: Client,
    url: Url,
    retry: RetryPolicy,
}

impl WebhookDispatcher {
    pub fn new(url: Url, timeout: Duration, retry: RetryPolicy) -> Result<Self, DispatchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url, retry })
    }

    async fn post(&self, alert: &AlertMessage) -> Result<(), DispatchError> {
        let payload = WebhookPayload { text: &alert.text };
        let response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DispatchError::Status(status))
        }
    }
}

#[async_trait]
impl Notifier for WebhookDispatcher {
    async fn notify(&self, alert: &AlertMessage) -> Result<(), DispatchError> {
        let mut attempt = 1;
        loop {
            match self.post(alert).await {
                Ok(()) => {
                    info!(severity = ?alert.severity, attempt, "Webhook Alert Sent");
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(attempt, ?delay, "Webhook delivery failed, retrying: {}", e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Severity;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Minimal HTTP responder: answers the n-th request with `statuses[n]`
    /// (repeating the last one) and forwards every request body.
    async fn spawn_webhook(statuses: Vec<u16>) -> (Url, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let served = Arc::new(AtomicUsize::new(0));
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let n = served.fetch_add(1, Ordering::SeqCst);
                let status = statuses[n.min(statuses.len() - 1)];
                let body = read_request_body(&mut socket).await;
                let _ = tx.send(body);
                let response = format!(
                    "HTTP/1.1 {status} Test\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        let url = format!("http://{addr}/hook").parse().unwrap();
        (url, rx)
    }

    async fn read_request_body(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(split) = text.find("\r\n\r\n") {
                let head = text[..split].to_ascii_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .map(|v| v.trim().parse::<usize>().unwrap())
                    .unwrap_or(0);
                if buf.len() >= split + 4 + len {
                    return text[split + 4..split + 4 + len].to_string();
                }
            }
        }
        String::new()
    }

    fn alert(text: &str) -> AlertMessage {
        AlertMessage {
            text: text.into(),
            severity: Severity::Info,
        }
    }

    fn dispatcher(url: Url, retry: RetryPolicy) -> WebhookDispatcher {
        WebhookDispatcher::new(url, Duration::from_secs(5), retry).unwrap()
    }

    #[tokio::test]
    async fn posts_text_payload() {
        let (url, mut bodies) = spawn_webhook(vec![200]).await;
        let dispatcher = dispatcher(url, RetryPolicy::single_attempt());

        dispatcher.notify(&alert("Rebase Failed: oracle")).await.unwrap();

        let body: serde_json::Value = serde_json::from_str(&bodies.recv().await.unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({ "text": "Rebase Failed: oracle" }));
    }

    #[tokio::test]
    async fn non_success_status_is_reported_without_retry() {
        let (url, mut bodies) = spawn_webhook(vec![500, 200]).await;
        let dispatcher = dispatcher(url, RetryPolicy::single_attempt());

        let err = dispatcher.notify(&alert("first")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Status(s) if s == StatusCode::INTERNAL_SERVER_ERROR));

        // The next alert still goes out.
        dispatcher.notify(&alert("second")).await.unwrap();
        assert!(bodies.recv().await.unwrap().contains("first"));
        assert!(bodies.recv().await.unwrap().contains("second"));
    }

    #[tokio::test]
    async fn retries_server_errors_when_enabled() {
        let (url, mut bodies) = spawn_webhook(vec![503, 503, 204]).await;
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        dispatcher(url, retry).notify(&alert("retry me")).await.unwrap();
        for _ in 0..3 {
            assert!(bodies.recv().await.unwrap().contains("retry me"));
        }
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (url, mut bodies) = spawn_webhook(vec![400, 200]).await;
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let err = dispatcher(url, retry).notify(&alert("bad")).await.unwrap_err();
        assert!(!err.is_retryable());
        bodies.recv().await.unwrap();
        assert!(bodies.try_recv().is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = format!("http://{addr}/hook").parse().unwrap();
        let err = dispatcher(url, RetryPolicy::single_attempt())
            .notify(&alert("nobody home"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
        };
        let first = policy.delay_after(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        let third = policy.delay_after(3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(600));
        assert!(policy.delay_after(20) <= MAX_RETRY_DELAY + MAX_RETRY_DELAY / 2);
    }
}
