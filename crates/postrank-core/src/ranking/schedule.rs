//! ============================================================================
//! Selection delay - when to act on a chosen post
//! ============================================================================
//! `WorkingHours` picks a time of day: 90% uniformly between 06:30 and 17:00,
//! otherwise early morning or evening with a skew that clusters the times
//! near the edges of the working window. A time already past today moves to
//! tomorrow.
//! ============================================================================

use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime};
use rand::Rng;
use std::time::Duration;

use crate::types::ScheduleError;

/// 06:30
const WINDOW_START_MIN: i64 = 6 * 60 + 30;
/// 17:00
const WINDOW_END_MIN: i64 = 17 * 60;
const DAY_MIN: i64 = 24 * 60;
const IN_WINDOW_PROBABILITY: f64 = 0.9;
const EDGE_SKEW: f64 = 3.0;

/// `floor(r^(1/skew) * max)` for uniform `r` in [0, 1).
///
/// Larger `skew` pushes results towards `max`.
pub fn skewed_random<R: Rng + ?Sized>(max: i64, skew: f64, rng: &mut R) -> Result<i64, ScheduleError> {
    if max <= 0 || skew <= 0.0 || !skew.is_finite() {
        return Err(ScheduleError::InvalidSkewParameters { max, skew });
    }
    let r: f64 = rng.gen();
    Ok((r.powf(1.0 / skew) * max as f64) as i64)
}

#[derive(Debug, Clone, PartialEq)]
pub enum DelayStrategy {
    /// Act immediately
    None,
    /// Uniform delay in [0, max]
    Uniform { max: Duration },
    /// Next randomly chosen time of day, biased to working hours
    WorkingHours,
}

impl DelayStrategy {
    /// Parse `none`, `uniform:<seconds>` or `working-hours`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "none" | "" => Some(Self::None),
            "working-hours" | "working_hours" => Some(Self::WorkingHours),
            other => {
                let secs = other.strip_prefix("uniform:")?.trim().parse::<u64>().ok()?;
                Some(Self::Uniform {
                    max: Duration::from_secs(secs),
                })
            }
        }
    }

    /// Delay from local time `now` until the action should happen
    pub fn delay_from<R: Rng + ?Sized>(&self, now: NaiveDateTime, rng: &mut R) -> Result<Duration, ScheduleError> {
        match self {
            Self::None => Ok(Duration::ZERO),
            Self::Uniform { max } => {
                let max_ms = max.as_millis() as u64;
                if max_ms == 0 {
                    return Ok(Duration::ZERO);
                }
                Ok(Duration::from_millis(rng.gen_range(0..=max_ms)))
            }
            Self::WorkingHours => {
                let minute = working_hours_minute(rng)?;
                let target = next_occurrence(now, minute);
                Ok((target - now).to_std().unwrap_or(Duration::ZERO))
            }
        }
    }
}

/// Minute of the day in [0, 1440)
fn working_hours_minute<R: Rng + ?Sized>(rng: &mut R) -> Result<i64, ScheduleError> {
    let minute = if rng.gen_bool(IN_WINDOW_PROBABILITY) {
        rng.gen_range(WINDOW_START_MIN..WINDOW_END_MIN)
    } else if rng.gen_bool(0.5) {
        skewed_random(WINDOW_START_MIN, EDGE_SKEW, rng)?
    } else {
        let evening = DAY_MIN - WINDOW_END_MIN;
        WINDOW_END_MIN + (evening - skewed_random(evening, EDGE_SKEW, rng)?)
    };
    Ok(minute.clamp(0, DAY_MIN - 1))
}

fn next_occurrence(now: NaiveDateTime, minute_of_day: i64) -> NaiveDateTime {
    let time = NaiveTime::MIN + ChronoDuration::minutes(minute_of_day);
    let today = now.date().and_time(time);
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}
