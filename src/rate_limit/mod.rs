//! Quota discovery and request pacing.
//!
//! `QuotaTracker` turns the provider's quota schedule into a minimum
//! request delay; `Pacer` enforces that delay across every process sharing
//! the store.

mod pacer;
mod quota;

pub use pacer::{Pacer, PacingMode};
pub use quota::{
    delay_for, parse_limits, rps_for, QuotaPeriod, QuotaSchedule, QuotaTracker, RateInfo,
    RPS_DIVISOR,
};
