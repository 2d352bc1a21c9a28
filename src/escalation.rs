//! Block-duration escalation policy.
//!
//! Each past violation is classified into a tier by the duration of the
//! block it produced, and the per-tier counts over the last 30 days decide
//! how long the next block lasts.

use crate::rate_limiter::BlockEvent;

pub(crate) const DAY_MS: u64 = 24 * 60 * 60 * 1000;
pub(crate) const WEEK_MS: u64 = 7 * DAY_MS;
pub(crate) const MONTH_MS: u64 = 30 * DAY_MS;
pub(crate) const YEAR_MS: u64 = 365 * DAY_MS;

/// How far back violation history participates in escalation decisions.
pub(crate) const HISTORY_WINDOW_MS: u64 = MONTH_MS;

/// Severity bucket for one past block, classified by that block's own
/// duration rather than the client's standing at the time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Initial,
    Day,
    Week,
    Month,
    Year,
}

impl Tier {
    pub fn of(duration_ms: u64) -> Self {
        if duration_ms >= YEAR_MS {
            Tier::Year
        } else if duration_ms >= MONTH_MS {
            Tier::Month
        } else if duration_ms >= WEEK_MS {
            Tier::Week
        } else if duration_ms >= DAY_MS {
            Tier::Day
        } else {
            Tier::Initial
        }
    }
}

/// True when an event at `at` is recent enough to count toward escalation.
pub(crate) fn within_history_window(at: u64, now_ms: u64) -> bool {
    at > now_ms.saturating_sub(HISTORY_WINDOW_MS)
}

/// Pick the next block duration from the key's recent violation history.
///
/// First match wins: three month-tier blocks escalate to a year, three
/// week-tier blocks to 30 days, three day-tier blocks to 7 days, five
/// initial-tier blocks to one day. Anything less repeats the configured
/// initial duration, as does an empty or fully aged-out history.
pub fn next_block_duration(history: &[BlockEvent], now_ms: u64, initial_block_ms: u64) -> u64 {
    let mut recent = 0u32;
    let mut initial = 0u32;
    let mut day = 0u32;
    let mut week = 0u32;
    let mut month = 0u32;

    for event in history {
        if !within_history_window(event.at, now_ms) {
            continue;
        }
        recent += 1;
        match Tier::of(event.duration_ms) {
            Tier::Initial => initial += 1,
            Tier::Day => day += 1,
            Tier::Week => week += 1,
            Tier::Month => month += 1,
            Tier::Year => {}
        }
    }

    if recent == 0 {
        initial_block_ms
    } else if month >= 3 {
        YEAR_MS
    } else if week >= 3 {
        MONTH_MS
    } else if day >= 3 {
        WEEK_MS
    } else if initial >= 5 {
        DAY_MS
    } else {
        initial_block_ms
    }
}
