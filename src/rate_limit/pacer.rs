//! Gate that keeps real network calls at least one request delay apart.
//!
//! The last-request mark lives in the shared store so every process using
//! the same login is paced together.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::{self, wait_after, SharedStore};

/// How the mark is read and claimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingMode {
    /// Claim the next slot atomically in the store. Concurrent callers
    /// queue behind each other.
    #[default]
    Reserve,
    /// Read the mark, sleep, send, then write the mark. Two callers that
    /// read the same mark both proceed after the same wait.
    Legacy,
}

impl std::str::FromStr for PacingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reserve" => Ok(PacingMode::Reserve),
            "legacy" => Ok(PacingMode::Legacy),
            other => Err(format!("unknown pacing mode '{}'", other)),
        }
    }
}

/// Enforces the pacing wait for one login.
#[derive(Clone)]
pub struct Pacer {
    store: SharedStore,
    key: String,
    mode: PacingMode,
}

impl Pacer {
    pub fn new(store: SharedStore, login: &str, mode: PacingMode) -> Self {
        Self {
            store,
            key: store::mark_key(login),
            mode,
        }
    }

    pub fn mode(&self) -> PacingMode {
        self.mode
    }

    /// Wait until a call may be sent. Returns how long it waited.
    ///
    /// Fails with `Error::Cancelled` if the token fires first; nothing has
    /// been sent at that point and a reserved slot is given back.
    pub async fn acquire(&self, delay: Duration, cancel: &CancellationToken) -> Result<Duration> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let now_ms = Utc::now().timestamp_millis();
        let (wait, reservation) = match self.mode {
            PacingMode::Reserve => {
                let reservation = self.store.reserve_slot(&self.key, delay, now_ms).await?;
                (reservation.wait, Some(reservation))
            }
            PacingMode::Legacy => {
                let mark = self.store.mark(&self.key).await?;
                (wait_after(mark, delay, now_ms), None)
            }
        };

        if wait > Duration::ZERO {
            debug!("Pacing {}: waiting {:?}", self.key, wait);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => {
                    debug!("Pacing wait for {} cancelled", self.key);
                    if let Some(reservation) = reservation {
                        self.store.release_slot(&self.key, &reservation).await?;
                    }
                    return Err(Error::Cancelled);
                }
            }
        }

        Ok(wait)
    }

    /// Record that a real network call just completed.
    pub async fn record_sent(&self) -> Result<()> {
        let at_ms = Utc::now().timestamp_millis();
        self.store.advance_mark(&self.key, at_ms).await?;
        Ok(())
    }
}
