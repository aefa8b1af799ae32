//! Best-effort alert delivery.
//!
//! Every message gets exactly one attempt, run on its own task and bounded by
//! a timeout. Failures are logged and dropped; nothing is reported back to the
//! ingestion path.

use crate::config::TelegramConfig;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("endpoint rejected message: {status} {body}")]
    Rejected { status: u16, body: String },
}

/// Somewhere an alert message can be delivered to.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, message: &str) -> Result<(), NotifyError>;

    fn name(&self) -> &str;
}

pub struct TelegramSink {
    client: reqwest::Client,
    url: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(config: &TelegramConfig, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(TelegramSink {
            client,
            url: format!("{}/bot{}/sendMessage", config.api_base, config.bot_token),
            chat_id: config.chat_id.clone(),
        })
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn deliver(&self, message: &str) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": message,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let resp = self.client.post(&self.url).json(&payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    sink: Option<Arc<dyn NotificationSink>>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, timeout: Duration) -> Self {
        NotificationDispatcher {
            sink: Some(sink),
            timeout,
        }
    }

    pub fn disabled() -> Self {
        NotificationDispatcher {
            sink: None,
            timeout: Duration::ZERO,
        }
    }

    /// Telegram when credentials are configured, otherwise disabled.
    pub fn from_config(telegram: Option<&TelegramConfig>, timeout: Duration) -> Self {
        match telegram {
            Some(cfg) => match TelegramSink::new(cfg, timeout) {
                Ok(sink) => Self::new(Arc::new(sink), timeout),
                Err(e) => {
                    warn!("Failed to set up Telegram client, alerts disabled: {e}");
                    Self::disabled()
                }
            },
            None => {
                info!("Telegram not configured. Alerts will not be delivered.");
                Self::disabled()
            }
        }
    }

    /// Schedules one delivery attempt and returns immediately.
    ///
    /// Returns `true` when an attempt was scheduled.
    pub fn dispatch(&self, device_id: &str, message: String) -> bool {
        let Some(sink) = self.sink.clone() else {
            info!("Notifications not configured. Skipping alert for {device_id}");
            return false;
        };
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Cannot schedule alert for {device_id}: {e}");
                return false;
            }
        };

        let timeout = self.timeout;
        let span = tracing::info_span!("notify", device_id = %device_id, sink = sink.name());
        handle.spawn(
            async move {
                match tokio::time::timeout(timeout, sink.deliver(&message)).await {
                    Ok(Ok(())) => info!("Alert delivered via {}", sink.name()),
                    Ok(Err(e)) => warn!("Alert delivery via {} failed: {e}", sink.name()),
                    Err(_) => warn!(
                        "Alert delivery via {} timed out after {:?}",
                        sink.name(),
                        timeout
                    ),
                }
            }
            .instrument(span),
        );
        true
    }
}
