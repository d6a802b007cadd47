use std::collections::BTreeSet;
use std::env;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use cron::Schedule;
use reqwest::Url;
use tracing::warn;

use crate::scheduler;

const DEFAULT_SCHEDULE: &str = "*/30 * * * *";
const DEFAULT_DAYS_AHEAD: &str = "28";
const DEFAULT_PROVIDER: &str = "2";
const DEFAULT_SERVICE: &str = "2";

/// Immutable process configuration, built exactly once at startup and
/// passed by reference into every component. Never re-read mid-run.
#[derive(Debug, Clone)]
pub struct Config {
    pub schedule: Schedule,
    pub run_mode: RunMode,
    pub days_ahead: i64,
    pub book_it_host: Url,
    pub telegram: Option<TelegramConfig>,
    pub provider: String,
    pub service: String,
    pub dates_ignore: BTreeSet<String>,
    pub report_policy: ReportPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Keep the process resident and fire on the cron schedule.
    Scheduled,
    /// Run one check immediately, then exit.
    Once,
}

/// Which part of the filtered slot sequence gets reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPolicy {
    /// Only the earliest slot in provider order.
    First,
    /// Every slot that survived filtering.
    All,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
}

impl Config {
    /// Read and validate all settings from the process environment.
    /// Any violation prevents the process from starting.
    pub fn from_env() -> Result<Self> {
        let book_it_host = parse_host(&env::var("BOOKITHOST").unwrap_or_default())?;

        let schedule = scheduler::parse_schedule(
            &env::var("SCHEDULE").unwrap_or_else(|_| DEFAULT_SCHEDULE.to_string()),
        )?;

        let run_mode = if env::var("NODE_ENV").as_deref() == Ok("PRODUCTION") {
            RunMode::Scheduled
        } else {
            RunMode::Once
        };

        let days_ahead = parse_days_ahead(
            &env::var("DAYSAHEAD").unwrap_or_else(|_| DEFAULT_DAYS_AHEAD.to_string()),
        )?;

        let dates_ignore = parse_dates_ignore(&env::var("DATES_IGNORE").unwrap_or_default())?;

        let report_policy = parse_report_policy(
            &env::var("REPORT_POLICY").unwrap_or_else(|_| "first".to_string()),
        )?;

        let telegram = telegram_config(
            env::var("TELEGRAM_TOKEN").ok(),
            env::var("TELEGRAM_CHATID").ok(),
        );

        Ok(Self {
            schedule,
            run_mode,
            days_ahead,
            book_it_host,
            telegram,
            provider: env::var("PROVIDER").unwrap_or_else(|_| DEFAULT_PROVIDER.to_string()),
            service: env::var("SERVICE").unwrap_or_else(|_| DEFAULT_SERVICE.to_string()),
            dates_ignore,
            report_policy,
        })
    }
}

fn parse_host(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("Missing required environment variable BOOKITHOST");
    }
    Url::parse(raw).with_context(|| format!("BOOKITHOST must be a valid URL, got {raw:?}"))
}

fn parse_days_ahead(raw: &str) -> Result<i64> {
    let days: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("DAYSAHEAD must be an integer, got {raw:?}"))?;
    if !(1..=365).contains(&days) {
        bail!("DAYSAHEAD must be between 1 and 365, got {days}");
    }
    Ok(days)
}

/// Comma-separated `YYYY-MM-DD` list; blank entries are dropped, anything
/// that is not a real calendar date in exactly that format is rejected.
fn parse_dates_ignore(raw: &str) -> Result<BTreeSet<String>> {
    let mut dates = BTreeSet::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if !is_iso_date_shaped(entry) {
            bail!("Invalid date format in DATES_IGNORE: {entry}. Expected format: YYYY-MM-DD");
        }
        NaiveDate::parse_from_str(entry, "%Y-%m-%d")
            .with_context(|| format!("Invalid date in DATES_IGNORE: {entry}"))?;
        dates.insert(entry.to_string());
    }
    Ok(dates)
}

fn is_iso_date_shaped(s: &str) -> bool {
    s.len() == 10
        && s.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        })
}

fn parse_report_policy(raw: &str) -> Result<ReportPolicy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "first" => Ok(ReportPolicy::First),
        "all" => Ok(ReportPolicy::All),
        other => bail!("REPORT_POLICY must be \"first\" or \"all\", got {other:?}"),
    }
}

/// Both credentials are needed for delivery; a lone token or chat id
/// disables it the same way as none at all.
fn telegram_config(token: Option<String>, chat_id: Option<String>) -> Option<TelegramConfig> {
    let token = token.filter(|t| !t.trim().is_empty());
    let chat_id = chat_id.filter(|c| !c.trim().is_empty());
    match (token, chat_id) {
        (Some(token), Some(chat_id)) => Some(TelegramConfig { token, chat_id }),
        (None, None) => None,
        _ => {
            warn!(
                "TELEGRAM_TOKEN and TELEGRAM_CHATID must both be set to enable notifications; \
                 delivery disabled"
            );
            None
        }
    }
}
