use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::config::Config;
use crate::models::TimeSlot;

const TIME_SLOTS_PATH: &str = "/v2/booking/time-slots/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from one slot query. Transport problems stay distinguishable
/// from bad status codes and from malformed bodies.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("booking request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("booking provider returned HTTP {0}")]
    Status(StatusCode),
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
}

pub struct BookItClient {
    http: Client,
    base_url: String,
    provider: String,
    service: String,
}

impl BookItClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.book_it_host.as_str().trim_end_matches('/').to_string(),
            provider: config.provider.clone(),
            service: config.service.clone(),
        })
    }

    /// Fetch slots in `[from, to]` and drop busy ones and ignored dates.
    /// Provider order is preserved. No retry on failure; the next tick
    /// tries again on its own.
    pub async fn get_available_slots(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        dates_ignore: &BTreeSet<String>,
    ) -> Result<Vec<TimeSlot>, FetchError> {
        let url = format!("{}{}", self.base_url, TIME_SLOTS_PATH);
        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("location", ""),
                ("category", ""),
                ("provider", self.provider.as_str()),
                ("service", self.service.as_str()),
                ("count", "1"),
                ("booking_id", ""),
            ])
            .send()
            .await
            .map_err(FetchError::Transport)?;

        let status = resp.status();
        let text = resp.text().await.map_err(FetchError::Transport)?;
        debug!("Time-slots response (status {}): {}", status, text);

        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let slots: Vec<TimeSlot> = serde_json::from_str(&text)
            .map_err(|e| FetchError::UnexpectedShape(format!("{e}; body: {text}")))?;
        debug!("Fetched {} slots", slots.len());

        Ok(filter_free_slots(slots, dates_ignore))
    }
}

/// Keep free slots whose date is not ignored, in their original order.
pub fn filter_free_slots(slots: Vec<TimeSlot>, dates_ignore: &BTreeSet<String>) -> Vec<TimeSlot> {
    slots
        .into_iter()
        .filter(TimeSlot::is_free)
        .filter(|slot| !dates_ignore.contains(slot.date.as_str()))
        .collect()
}
