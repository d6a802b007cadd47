use chrono::Utc;
use tracing::{debug, error, info};

use crate::client::BookItClient;
use crate::config::{Config, ReportPolicy};
use crate::notifier::{Notifier, NotifyOutcome};
use crate::scheduler;

/// How one tick ended. Every arm is terminal for that tick only; the
/// process keeps running either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    FetchFailed,
    NoSlots,
    Notified(usize),
    NotifySkipped(usize),
    NotifyFailed,
}

pub struct Runner {
    config: Config,
    client: BookItClient,
    notifier: Notifier,
}

impl Runner {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let client = BookItClient::new(&config)?;
        let notifier = Notifier::new(config.telegram.clone())?;
        Ok(Self {
            config,
            client,
            notifier,
        })
    }

    /// Runs one check cycle and reports how it ended. Errors are logged
    /// and absorbed here so a bad tick can never take down the scheduler.
    pub async fn tick(&self) -> TickOutcome {
        let now = Utc::now();
        info!("Starting slot check at {}", now.to_rfc3339());

        let (from, to) = scheduler::date_window(now.date_naive(), self.config.days_ahead);
        let slots = match self
            .client
            .get_available_slots(from, to, &self.config.dates_ignore)
            .await
        {
            Ok(slots) => slots,
            Err(e) => {
                error!("Slot check failed: {e}");
                return TickOutcome::FetchFailed;
            }
        };

        if slots.is_empty() {
            info!("No free slots found");
            return TickOutcome::NoSlots;
        }

        info!("Found {} free slot(s)", slots.len());
        for slot in &slots {
            debug!(
                "  {} {} — id {} ({} of {} open)",
                slot.date,
                slot.time,
                slot.id,
                slot.available_slots.unwrap_or(slot.slots_count),
                slot.total_slots.unwrap_or(slot.slots_count),
            );
        }

        let report = match self.config.report_policy {
            ReportPolicy::First => &slots[..1],
            ReportPolicy::All => &slots[..],
        };

        match self.notifier.notify(report).await {
            Ok(NotifyOutcome::Sent) => TickOutcome::Notified(report.len()),
            Ok(NotifyOutcome::Skipped) => TickOutcome::NotifySkipped(report.len()),
            Err(e) => {
                error!("Notification failed: {e}");
                TickOutcome::NotifyFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use reqwest::Url;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::{RunMode, TelegramConfig};

    fn test_config(host: &str, policy: ReportPolicy, dates_ignore: &[&str]) -> Config {
        Config {
            schedule: scheduler::parse_schedule("*/30 * * * *").unwrap(),
            run_mode: RunMode::Once,
            days_ahead: 5,
            book_it_host: Url::parse(host).unwrap(),
            telegram: None,
            provider: "2".to_string(),
            service: "2".to_string(),
            dates_ignore: dates_ignore.iter().map(|d| d.to_string()).collect(),
            report_policy: policy,
        }
    }

    fn slots_body() -> serde_json::Value {
        serde_json::json!([
            {
                "id": "10",
                "date": "2024-01-01",
                "time": "09:00:00",
                "type": "busy",
                "slots_count": 0,
                "client_date": "2024-01-01",
                "client_time": "09:00"
            },
            {
                "id": "11",
                "date": "2024-01-02",
                "time": "10:00:00",
                "type": "free",
                "slots_count": 1,
                "client_date": "2024-01-02",
                "client_time": "10:00"
            },
            {
                "id": "12",
                "date": "2024-01-03",
                "time": "11:00:00",
                "type": "free",
                "slots_count": 1,
                "client_date": "2024-01-03",
                "client_time": "11:00"
            }
        ])
    }

    async fn mount_slots(server: &MockServer, body: &serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/v2/booking/time-slots/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_tick_fetch_error_is_absorbed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/booking/time-slots/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let runner = Runner::new(test_config(&server.uri(), ReportPolicy::First, &[])).unwrap();
        assert_eq!(runner.tick().await, TickOutcome::FetchFailed);
    }

    #[tokio::test]
    async fn test_tick_without_free_slots_does_not_notify() {
        let server = MockServer::start().await;
        mount_slots(
            &server,
            &serde_json::json!([{
                "id": "10",
                "date": "2024-01-01",
                "time": "09:00:00",
                "type": "busy",
                "slots_count": 0,
                "client_date": "2024-01-01",
                "client_time": "09:00"
            }]),
        )
        .await;
        // any sendMessage call would hit this and fail the test on drop
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), ReportPolicy::First, &[]);
        let runner = Runner {
            client: BookItClient::new(&config).unwrap(),
            notifier: test_notifier(&server.uri()),
            config,
        };
        assert_eq!(runner.tick().await, TickOutcome::NoSlots);
    }

    #[tokio::test]
    async fn test_tick_ignored_dates_empty_the_run() {
        let server = MockServer::start().await;
        mount_slots(&server, &slots_body()).await;

        let runner = Runner::new(test_config(
            &server.uri(),
            ReportPolicy::All,
            &["2024-01-02", "2024-01-03"],
        ))
        .unwrap();
        assert_eq!(runner.tick().await, TickOutcome::NoSlots);
    }

    #[tokio::test]
    async fn test_tick_first_policy_reports_single_slot() {
        let server = MockServer::start().await;
        mount_slots(&server, &slots_body()).await;

        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .and(body_string_contains("Neuer Termin"))
            .and(body_string_contains(r"2024\\-01\\-02"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(&serde_json::json!({"ok": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), ReportPolicy::First, &[]);
        let runner = Runner {
            client: BookItClient::new(&config).unwrap(),
            notifier: test_notifier(&server.uri()),
            config,
        };
        assert_eq!(runner.tick().await, TickOutcome::Notified(1));
    }

    #[tokio::test]
    async fn test_tick_all_policy_reports_every_slot() {
        let server = MockServer::start().await;
        mount_slots(&server, &slots_body()).await;

        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .and(body_string_contains("2 neue Termine"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(&serde_json::json!({"ok": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), ReportPolicy::All, &[]);
        let runner = Runner {
            client: BookItClient::new(&config).unwrap(),
            notifier: test_notifier(&server.uri()),
            config,
        };
        assert_eq!(runner.tick().await, TickOutcome::Notified(2));
    }

    #[tokio::test]
    async fn test_tick_missing_credentials_skip_delivery() {
        let server = MockServer::start().await;
        mount_slots(&server, &slots_body()).await;

        let runner = Runner::new(test_config(&server.uri(), ReportPolicy::First, &[])).unwrap();
        assert_eq!(runner.tick().await, TickOutcome::NotifySkipped(1));
    }

    fn test_notifier(api_base: &str) -> Notifier {
        Notifier::with_api_base(
            Some(TelegramConfig {
                token: "test-token".to_string(),
                chat_id: "42".to_string(),
            }),
            api_base,
        )
        .unwrap()
    }
}
