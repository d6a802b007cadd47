use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use cron::Schedule;
use tracing::{info, warn};

use crate::runner::Runner;

/// Inclusive query window: `from` is the given day, `to` lies `days_ahead`
/// days later.
pub fn date_window(today: NaiveDate, days_ahead: i64) -> (NaiveDate, NaiveDate) {
    (today, today + Duration::days(days_ahead))
}

/// Parse a cron expression. The classic 5-field form gets a seconds field
/// prepended, since the parser wants 6 or 7 fields.
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    let expr = expr.trim();
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized).with_context(|| format!("Invalid cron expression: {expr:?}"))
}

/// Fire the runner on the schedule, forever. Each tick is awaited to
/// completion before the next fire time is computed, so runs never overlap;
/// a tick that overruns its successor's fire time just starts it late.
pub async fn run_scheduled(schedule: &Schedule, runner: &Runner) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!("Schedule has no future fire times, stopping");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        info!("Next check at {} (in {}s)", next.to_rfc3339(), wait.as_secs());
        tokio::time::sleep(wait).await;
        runner.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate};

    #[test]
    fn test_date_window() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let (from, to) = date_window(today, 5);
        assert_eq!(from, today);
        assert_eq!(to, NaiveDate::from_ymd_opt(2024, 1, 6).unwrap());
    }

    #[test]
    fn test_date_window_crosses_month_boundary() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();
        let (_, to) = date_window(today, 28);
        assert_eq!(to.month(), 2);
        assert_eq!(to.day(), 17);
    }

    #[test]
    fn test_parse_schedule_five_field_form() {
        let schedule = parse_schedule("*/30 * * * *").unwrap();
        // fires on minute boundaries divisible by 30
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.timestamp() % 1800, 0);
    }

    #[test]
    fn test_parse_schedule_six_field_passthrough() {
        assert!(parse_schedule("0 */30 * * * *").is_ok());
    }

    #[test]
    fn test_parse_schedule_rejects_garbage() {
        assert!(parse_schedule("every thirty minutes").is_err());
        assert!(parse_schedule("").is_err());
        assert!(parse_schedule("99 99 * * *").is_err());
    }
}
