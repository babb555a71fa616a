//! Provider quota schedule and the request cadence derived from it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::http_client::{RenderedRequest, Transport};
use crate::models::{Account, Server};
use crate::store::{self, SharedStore, StoreError};
use crate::xml;

/// Provider-documented divisor turning the hourly quota into a per-second
/// cap.
pub const RPS_DIVISOR: f64 = 2000.0;

/// Seconds subtracted from the schedule end when caching it.
const SCHEDULE_MARGIN_SECS: i64 = 1;

const INTERVAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";
const INTERVAL_FORMAT_NAIVE: &str = "%Y-%m-%d %H:%M:%S";

/// One window of the day with a fixed number of allowed requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPeriod {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub count: u64,
}

impl QuotaPeriod {
    /// Both bounds are inclusive.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at <= self.to
    }
}

/// Today's quota periods in provider order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSchedule {
    pub periods: Vec<QuotaPeriod>,
}

impl QuotaSchedule {
    pub fn new(periods: Vec<QuotaPeriod>) -> Self {
        Self { periods }
    }

    /// Count of the first period containing `at`.
    pub fn count_at(&self, at: DateTime<Utc>) -> Option<u64> {
        self.periods
            .iter()
            .find(|p| p.contains(at))
            .map(|p| p.count)
    }

    /// Latest `to` across all periods.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.periods.iter().map(|p| p.to).max()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// How long the schedule may be cached when read at `now`. `None` when
    /// it is already at or past its end.
    pub fn cache_ttl(&self, now: DateTime<Utc>) -> Option<Duration> {
        let end = self.end()?;
        (end - now - chrono::Duration::seconds(SCHEDULE_MARGIN_SECS))
            .to_std()
            .ok()
            .filter(|ttl| !ttl.is_zero())
    }
}

/// Per-second cap for an hourly limit on a server.
pub fn rps_for(server: Server, hour_limit: u64) -> f64 {
    if server.is_rate_limited() {
        hour_limit as f64 / RPS_DIVISOR
    } else {
        0.0
    }
}

/// Minimum spacing between calls for a per-second cap; zero when uncapped.
pub fn delay_for(rps: f64) -> Duration {
    if rps > 0.0 {
        Duration::from_secs_f64(1.0 / rps)
    } else {
        Duration::ZERO
    }
}

fn parse_interval_time(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_str(value, INTERVAL_FORMAT) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, INTERVAL_FORMAT_NAIVE)
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::Parse(format!("bad time-interval bound '{}': {}", value, e)))
}

/// Parse a `limits-info` payload.
pub fn parse_limits(body: &[u8]) -> Result<QuotaSchedule> {
    let text = xml::as_text(body)?;
    let doc = xml::parse(text)?;
    let response = xml::response(&doc)?;

    // No <limits> means no periods; lookups then fail for every time.
    let Some(limits) = xml::child(response, "limits") else {
        return Ok(QuotaSchedule::default());
    };

    let mut periods = Vec::new();
    for interval in xml::children(limits, "time-interval") {
        let from = interval
            .attribute("from")
            .ok_or_else(|| Error::Parse("time-interval without 'from'".to_string()))?;
        let to = interval
            .attribute("to")
            .ok_or_else(|| Error::Parse("time-interval without 'to'".to_string()))?;
        let count_text = xml::text(interval);
        let count = count_text.trim().parse::<u64>().map_err(|e| {
            Error::Parse(format!("bad time-interval count '{}': {}", count_text.trim(), e))
        })?;

        periods.push(QuotaPeriod {
            from: parse_interval_time(from)?,
            to: parse_interval_time(to)?,
            count,
        });
    }

    Ok(QuotaSchedule::new(periods))
}

/// Snapshot of the current quota situation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateInfo {
    pub server: Server,
    pub hour_limit: u64,
    pub rps_limit: f64,
    #[serde(with = "duration_secs")]
    pub request_delay: Duration,
    pub schedule: QuotaSchedule,
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(value.as_secs_f64())
    }
}

/// Fetches and caches the quota schedule and derives the request cadence.
#[derive(Clone)]
pub struct QuotaTracker {
    account: Arc<Account>,
    transport: Arc<dyn Transport>,
    store: SharedStore,
}

impl QuotaTracker {
    pub fn new(account: Arc<Account>, transport: Arc<dyn Transport>, store: SharedStore) -> Self {
        Self {
            account,
            transport,
            store,
        }
    }

    pub fn server(&self) -> Server {
        self.account.server
    }

    /// Today's schedule, from the store when cached.
    ///
    /// A payload that cannot be read as a schedule is reported as
    /// `Error::Remote` with the response status.
    pub async fn schedule(&self) -> Result<QuotaSchedule> {
        // The cache key is scoped by login, so credentials come first.
        let (login, api_key) = self.account.credentials()?;
        let server = self.account.server;
        let key = store::schedule_key(server, login);

        match store::get_json::<QuotaSchedule>(self.store.as_ref(), &key).await {
            Ok(Some(schedule)) => return Ok(schedule),
            Ok(None) => {}
            Err(StoreError::Serialization(e)) => {
                warn!("Ignoring unreadable cached schedule {}: {}", key, e)
            }
            Err(e) => return Err(e.into()),
        }

        let request = RenderedRequest::new(
            server,
            vec![
                ("action", "limits-info".to_string()),
                ("user", login.to_string()),
                ("key", api_key.to_string()),
            ],
        );
        let response = self.transport.send(&request).await?.error_for_status()?;
        let schedule = parse_limits(&response.body).map_err(|e| match e {
            Error::Parse(detail) => {
                warn!("Unreadable limits-info payload: {}", detail);
                Error::Remote {
                    status: response.status,
                    request: response.debug.clone(),
                }
            }
            other => other,
        })?;

        match schedule.cache_ttl(Utc::now()) {
            Some(ttl) => {
                store::set_json(self.store.as_ref(), &key, &schedule, Some(ttl)).await?;
                if let Some(end) = schedule.end() {
                    debug!("Quota schedule cached until {}", end);
                }
            }
            None => debug!("Quota schedule already ended, not caching"),
        }

        Ok(schedule)
    }

    /// Request count of the period covering the current time.
    pub async fn hour_limit(&self) -> Result<u64> {
        let schedule = self.schedule().await?;
        let now = Utc::now();
        schedule
            .count_at(now)
            .ok_or_else(|| Error::Lookup(now.to_rfc3339()))
    }

    /// Per-second cap. Servers without one never fetch the schedule.
    pub async fn rps_limit(&self) -> Result<f64> {
        let server = self.account.server;
        if !server.is_rate_limited() {
            return Ok(0.0);
        }
        Ok(rps_for(server, self.hour_limit().await?))
    }

    /// Minimum spacing between real network calls.
    pub async fn request_delay(&self) -> Result<Duration> {
        Ok(delay_for(self.rps_limit().await?))
    }

    /// Everything above in one snapshot. Always fetches the schedule.
    pub async fn rate_info(&self) -> Result<RateInfo> {
        let schedule = self.schedule().await?;
        let now = Utc::now();
        let hour_limit = schedule
            .count_at(now)
            .ok_or_else(|| Error::Lookup(now.to_rfc3339()))?;
        let rps_limit = rps_for(self.account.server, hour_limit);

        Ok(RateInfo {
            server: self.account.server,
            hour_limit,
            rps_limit,
            request_delay: delay_for(rps_limit),
            schedule,
        })
    }
}
