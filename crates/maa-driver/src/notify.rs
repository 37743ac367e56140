use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::{DriverError, Result};

/// A status update about a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub run_id: String,
    pub text: String,
}

impl Notification {
    pub fn new(run_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            text: text.into(),
        }
    }
}

/// Delivers run status updates. Failures never affect the run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Logs notifications instead of sending them anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, n: &Notification) -> Result<()> {
        tracing::info!(run_id = %n.run_id, "{}", n.text);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusPayload<'a> {
    action: &'static str,
    status_text: &'a str,
    auto_hide_ms: u64,
    session_id: &'a str,
}

/// POSTs a JSON status payload to a webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    auto_hide_ms: u64,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, auto_hide_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DriverError::Notification(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            auto_hide_ms,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, n: &Notification) -> Result<()> {
        let payload = StatusPayload {
            action: "show_tool_status",
            status_text: &n.text,
            auto_hide_ms: self.auto_hide_ms,
            session_id: &n.run_id,
        };
        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DriverError::Notification(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DriverError::Notification(format!(
                "webhook returned {status}"
            )));
        }
        Ok(())
    }
}

/// Send `notification` in the background. Errors are logged and dropped.
pub(crate) fn dispatch(notifier: Option<&Arc<dyn Notifier>>, notification: Notification) {
    let Some(notifier) = notifier.cloned() else {
        return;
    };
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&notification).await {
            tracing::debug!(run_id = %notification.run_id, error = %e, "notification failed");
        }
    });
}

/// Send `notification` and wait for it, for at most `limit`. Errors are
/// logged and dropped.
pub(crate) async fn deliver(
    notifier: Option<&Arc<dyn Notifier>>,
    notification: Notification,
    limit: Duration,
) {
    let Some(notifier) = notifier else {
        return;
    };
    match tokio::time::timeout(limit, notifier.notify(&notification)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(run_id = %notification.run_id, error = %e, "notification failed")
        }
        Err(_) => tracing::debug!(run_id = %notification.run_id, "notification timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn webhook_posts_status_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/status")
            .match_body(Matcher::Json(json!({
                "action": "show_tool_status",
                "status_text": "daily: attempt 2 of 4",
                "auto_hide_ms": 5000,
                "session_id": "run-1"
            })))
            .with_status(200)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/status", server.url()), 5000).unwrap();
        notifier
            .notify(&Notification::new("run-1", "daily: attempt 2 of 4"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn webhook_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/status")
            .with_status(500)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/status", server.url()), 0).unwrap();
        let err = notifier
            .notify(&Notification::new("run-1", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Notification(_)));
    }

    struct Stalled;

    #[async_trait]
    impl Notifier for Stalled {
        async fn notify(&self, _n: &Notification) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn deliver_gives_up_after_limit() {
        let notifier: Arc<dyn Notifier> = Arc::new(Stalled);
        let started = std::time::Instant::now();
        deliver(
            Some(&notifier),
            Notification::new("r", "t"),
            Duration::from_millis(100),
        )
        .await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn unreachable_webhook_is_an_error_not_a_panic() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/status", 0).unwrap();
        assert!(notifier.notify(&Notification::new("r", "t")).await.is_err());
    }
}
