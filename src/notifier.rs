//! Outbound chat notifications.
//!
//! Delivery is best-effort: failures are logged and dropped so a cycle never
//! fails because a message could not be sent.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::nse::config::HTTP_TIMEOUT;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Telegram bot `sendMessage`
pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build Telegram client")?;
        Ok(Self {
            client,
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        })
    }

    /// `None` unless both `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID` are set
    pub fn from_env() -> Result<Option<Self>> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN").ok().filter(|v| !v.is_empty());
        let chat = std::env::var("TELEGRAM_CHAT_ID").ok().filter(|v| !v.is_empty());
        match (token, chat) {
            (Some(token), Some(chat)) => Ok(Some(Self::new(token, chat)?)),
            _ => Ok(None),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", TELEGRAM_API_BASE, self.bot_token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let res = self
            .client
            .post(self.endpoint())
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await
            .context("Telegram request failed")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            anyhow::bail!("Telegram returned {}: {}", status, preview);
        }
        Ok(())
    }
}

/// Writes messages to the log instead of a chat
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        info!(target: "notify", "{}", text.replace('\n', " | "));
        Ok(())
    }
}

/// Telegram when configured, otherwise the log
pub fn notifier_from_env() -> Arc<dyn Notifier> {
    match TelegramNotifier::from_env() {
        Ok(Some(telegram)) => Arc::new(telegram),
        Ok(None) => Arc::new(LogNotifier),
        Err(e) => {
            warn!("Telegram disabled: {:#}", e);
            Arc::new(LogNotifier)
        }
    }
}

/// Sends each message in order; returns how many were delivered
pub async fn deliver(notifier: &dyn Notifier, messages: &[String]) -> usize {
    let mut delivered = 0;
    for message in messages {
        match notifier.send(message).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!("Notification dropped: {:#}", e),
        }
    }
    delivered
}

/// Fire-and-forget delivery on a background task
pub fn dispatch(notifier: Arc<dyn Notifier>, messages: Vec<String>) {
    if messages.is_empty() {
        return;
    }
    tokio::spawn(async move {
        deliver(notifier.as_ref(), &messages).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Flaky {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for Flaky {
        async fn send(&self, text: &str) -> Result<()> {
            self.seen.lock().unwrap().push(text.to_string());
            if text.contains("fail") {
                anyhow::bail!("chat unavailable");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_delivery() {
        let flaky = Flaky { seen: Mutex::new(Vec::new()) };
        let messages = vec!["one".to_string(), "fail".to_string(), "three".to_string()];

        let delivered = deliver(&flaky, &messages).await;
        assert_eq!(delivered, 2);
        assert_eq!(flaky.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        assert!(LogNotifier.send("📍 NIFTY BUY CALL Signal\nStrike: 19950").await.is_ok());
    }

    #[test]
    fn test_telegram_endpoint() {
        let t = TelegramNotifier::new("123:abc", "42").unwrap();
        assert_eq!(t.endpoint(), "https://api.telegram.org/bot123:abc/sendMessage");
    }
}
