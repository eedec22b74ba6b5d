//! Wake window arithmetic.
//!
//! Settings carry wall-clock wake times that may already lie in the past (the
//! server typically sends today's date). Everything here projects them onto
//! their next occurrence and derives the decision time, the instant at which
//! the wake ramp has to begin.

use chrono::{DateTime, Days, Local, NaiveDateTime, TimeDelta, TimeZone};
use std::time::Duration;
use thiserror::Error;

const DAY_SECONDS: i64 = 24 * 60 * 60;

/// Why a wake window was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("earliest and latest wake time coincide")]
    Empty,

    #[error("wake window of {seconds}s is negative")]
    Negative { seconds: i64 },

    #[error("wake window of {seconds}s exceeds one day")]
    TooLong { seconds: i64 },

    #[error("{0} does not exist in the local time zone")]
    Nonexistent(NaiveDateTime),
}

/// `t` moved one calendar day ahead if it lies before `now`.
pub fn place_ahead(t: DateTime<Local>, now: DateTime<Local>) -> DateTime<Local> {
    if t < now { add_day(t) } else { t }
}

fn add_day(t: DateTime<Local>) -> DateTime<Local> {
    t.checked_add_days(Days::new(1))
        .unwrap_or(t + TimeDelta::days(1))
}

/// First occurrence of `t`'s wall-clock time at or after `now`. Times already
/// in the future are kept as they are.
pub fn next_occurrence(t: DateTime<Local>, now: DateTime<Local>) -> DateTime<Local> {
    if t >= now {
        return t;
    }
    let today = now.date_naive().and_time(t.time());
    let projected = to_local(today).unwrap_or(t);
    place_ahead(projected, now)
}

/// Interpret a naive wall-clock time in the local zone. Ambiguous times pick
/// the earlier instant; times skipped by a DST jump are rejected.
pub fn to_local(naive: NaiveDateTime) -> Result<DateTime<Local>, WindowError> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or(WindowError::Nonexistent(naive))
}

/// A validated wake window, projected into the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeWindow {
    pub earliest: DateTime<Local>,
    pub latest: DateTime<Local>,
    /// When the ramp must start. Equal to `earliest` until a smarter decision
    /// exists.
    pub decision: DateTime<Local>,
}

impl WakeWindow {
    /// Build the window for the given settings times.
    ///
    /// With an explicit earliest time both times are projected to their next
    /// occurrence and the window spans from one to the other; it crosses
    /// midnight only when the projection puts latest on the following day,
    /// and an earliest time after the latest one is rejected. Without one it spans `max_span` seconds
    /// before the latest time, or `default_duration` when `max_span` is 0.
    pub fn compute(
        latest: NaiveDateTime,
        earliest: Option<NaiveDateTime>,
        max_span: i64,
        default_duration: Duration,
        now: DateTime<Local>,
    ) -> Result<Self, WindowError> {
        let latest_local = to_local(latest)?;

        let (earliest, latest) = match earliest {
            Some(earliest) => {
                let given = (latest - earliest).num_seconds();
                let earliest_local = to_local(earliest)?;
                let latest = next_occurrence(latest_local, now);
                let mut earliest = next_occurrence(earliest_local, now);

                // Earliest already passed but latest is still ahead: the
                // window is in progress and keeps its earlier start
                if latest < earliest && given >= 0 {
                    let previous = earliest - TimeDelta::days(1);
                    if previous <= now {
                        earliest = previous;
                    }
                }

                let span = (latest - earliest).num_seconds();
                if span < 0 {
                    return Err(WindowError::Negative { seconds: span });
                }
                if span == 0 {
                    return Err(WindowError::Empty);
                }
                if span > DAY_SECONDS {
                    return Err(WindowError::TooLong { seconds: span });
                }
                (earliest, latest)
            }
            None => {
                let span = match max_span {
                    0 => i64::try_from(default_duration.as_secs()).unwrap_or(DAY_SECONDS + 1),
                    s => s,
                };
                if span < 0 {
                    return Err(WindowError::Negative { seconds: span });
                }
                if span > DAY_SECONDS {
                    return Err(WindowError::TooLong { seconds: span });
                }
                if span == 0 {
                    return Err(WindowError::Empty);
                }
                let latest = next_occurrence(latest_local, now);
                (latest - TimeDelta::seconds(span), latest)
            }
        };

        Ok(Self {
            earliest,
            latest,
            decision: earliest,
        })
    }

    /// Length of the window, which is also the ramp length.
    pub fn duration(&self) -> Duration {
        (self.latest - self.earliest).to_std().unwrap_or(Duration::ZERO)
    }
}
