use std::fmt::Write;
use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::{info, warn};

use crate::config::TelegramConfig;
use crate::models::TimeSlot;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Characters Telegram's MarkdownV2 mode treats as markup.
const MARKDOWN_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(#[source] reqwest::Error),
    #[error("Telegram rejected the message (HTTP {status}): {description}")]
    Api {
        status: StatusCode,
        description: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    /// Credentials missing; the slots went to the local log instead.
    Skipped,
}

pub struct Notifier {
    http: Client,
    api_base: String,
    telegram: Option<TelegramConfig>,
}

impl Notifier {
    pub fn new(telegram: Option<TelegramConfig>) -> anyhow::Result<Self> {
        Self::with_api_base(telegram, TELEGRAM_API_BASE)
    }

    pub(crate) fn with_api_base(
        telegram: Option<TelegramConfig>,
        api_base: &str,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            telegram,
        })
    }

    /// Deliver one message describing `slots` to the configured chat.
    /// Without credentials this degrades to log lines and reports `Skipped`.
    /// Delivery failures are not retried.
    pub async fn notify(&self, slots: &[TimeSlot]) -> Result<NotifyOutcome, NotifyError> {
        let Some(telegram) = &self.telegram else {
            warn!("Telegram notification is not configured, skipping delivery");
            info!("Found {} available slot(s):", slots.len());
            for slot in slots {
                info!("  - {} at {}", slot.client_date, slot.client_time);
            }
            return Ok(NotifyOutcome::Skipped);
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, telegram.token);
        let resp = self
            .http
            .post(&url)
            .json(&json!({
                "chat_id": telegram.chat_id,
                "text": format_message(slots),
                "parse_mode": "MarkdownV2",
            }))
            .send()
            .await
            .map_err(NotifyError::Delivery)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let description = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("description")?.as_str().map(str::to_string))
                .unwrap_or(body);
            return Err(NotifyError::Api {
                status,
                description,
            });
        }

        info!("Notification sent for {} slot(s)", slots.len());
        Ok(NotifyOutcome::Sent)
    }
}

/// One headline plus date/time for a single slot, or a count headline with
/// one numbered line per slot, in input order.
fn format_message(slots: &[TimeSlot]) -> String {
    if let [slot] = slots {
        return format!(
            "*Neuer Termin verfügbar\\!*\n\n📅 {}\n🕐 {}",
            escape_markdown(&slot.client_date),
            escape_markdown(&slot.client_time)
        );
    }

    let mut message = format!("*{} neue Termine verfügbar\\!*\n\n", slots.len());
    for (i, slot) in slots.iter().enumerate() {
        // write! into a String cannot fail
        let _ = writeln!(
            message,
            "{}\\. 📅 {} 🕐 {}",
            i + 1,
            escape_markdown(&slot.client_date),
            escape_markdown(&slot.client_time)
        );
    }
    message
}

/// Backslash-escape everything MarkdownV2 would interpret, so provider
/// text cannot corrupt the message rendering.
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
