// ── Cadence arithmetic ──
//
// A site's cadence divides each local day into boundaries starting at
// local midnight: midnight, midnight + interval, ... up to the next
// midnight, where the sequence restarts. A snapshot is due when the latest
// boundary at or before `now` is later than the last boundary a snapshot
// was issued for.

mod scheduler;

pub use scheduler::CadenceScheduler;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::CoreError;
use crate::model::{
    ALLOWED_SNAPSHOTS_PER_DAY, MAX_HOURS_BETWEEN, MIN_HOURS_BETWEEN, SiteCadenceConfig,
};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// A validated cadence: interval length plus the timezone whose midnight
/// anchors the boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    interval: TimeDelta,
    timezone: Tz,
}

/// Check a cadence configuration without building a schedule.
pub fn validate(config: &SiteCadenceConfig) -> Result<(), CoreError> {
    Cadence::from_config(config, Tz::UTC).map(|_| ())
}

impl Cadence {
    /// Build a cadence from an administrator's configuration.
    ///
    /// `fallback_tz` applies when the configuration names no timezone.
    pub fn from_config(config: &SiteCadenceConfig, fallback_tz: Tz) -> Result<Self, CoreError> {
        let from_count = config.snapshots_per_day.map(interval_for_count).transpose()?;
        let from_hours = config.hours_between.map(interval_for_hours).transpose()?;

        let interval = match (from_count, from_hours) {
            (Some(a), Some(b)) if a != b => {
                return Err(CoreError::invalid_cadence(format!(
                    "snapshots_per_day and hours_between disagree ({}s vs {}s)",
                    a.num_seconds(),
                    b.num_seconds()
                )));
            }
            (Some(interval), _) | (None, Some(interval)) => interval,
            (None, None) => {
                return Err(CoreError::invalid_cadence(
                    "one of snapshots_per_day or hours_between is required",
                ));
            }
        };

        let timezone = match config.timezone.as_deref() {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| CoreError::invalid_cadence(format!("unknown timezone '{name}'")))?,
            None => fallback_tz,
        };

        Ok(Self { interval, timezone })
    }

    pub fn interval(&self) -> TimeDelta {
        self.interval
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Latest boundary at or before `now`.
    ///
    /// A local day never holds more than [`slots_per_day`](Self::slots_per_day)
    /// boundaries, so the extra hour of a DST fall-back day does not add one.
    pub fn current_boundary(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = local_midnight(self.timezone, self.local_date(now));
        let elapsed = (now - midnight).max(TimeDelta::zero()).num_seconds();
        let step = self.interval.num_seconds();
        let slot = (elapsed / step).min(self.slots_per_day() - 1);
        midnight + TimeDelta::seconds(slot * step)
    }

    /// Earliest boundary strictly after `after`.
    pub fn next_boundary(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.local_date(after);
        let current = self.current_boundary(after);
        let tomorrow = date.succ_opt().map(|d| local_midnight(self.timezone, d));
        let last_slot = local_midnight(self.timezone, date)
            + TimeDelta::seconds((self.slots_per_day() - 1) * self.interval.num_seconds());

        if current >= last_slot {
            return tomorrow.unwrap_or(current + self.interval);
        }
        let candidate = current + self.interval;
        tomorrow.map_or(candidate, |t| candidate.min(t))
    }

    /// Boundaries in a 24-hour local day: midnight plus every whole interval
    /// that starts before the next midnight.
    pub fn slots_per_day(&self) -> i64 {
        let step = self.interval.num_seconds();
        SECONDS_PER_DAY / step + i64::from(SECONDS_PER_DAY % step != 0)
    }

    /// Whether a snapshot is owed at `now` given the last boundary one was
    /// issued for. With no prior snapshot the first boundary of the day
    /// already counts.
    pub fn is_due(&self, last_boundary: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let boundary = self.current_boundary(now);
        last_boundary.is_none_or(|last| boundary > last)
    }

    /// The next `count` boundaries strictly after `from`.
    pub fn upcoming(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut out = Vec::with_capacity(count);
        let mut cursor = from;
        for _ in 0..count {
            cursor = self.next_boundary(cursor);
            out.push(cursor);
        }
        out
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }
}

fn interval_for_count(per_day: u32) -> Result<TimeDelta, CoreError> {
    if !ALLOWED_SNAPSHOTS_PER_DAY.contains(&per_day) {
        return Err(CoreError::invalid_cadence(format!(
            "snapshots_per_day must be one of {ALLOWED_SNAPSHOTS_PER_DAY:?}, got {per_day}"
        )));
    }
    Ok(TimeDelta::seconds(SECONDS_PER_DAY / i64::from(per_day)))
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn interval_for_hours(hours: f64) -> Result<TimeDelta, CoreError> {
    if !(MIN_HOURS_BETWEEN..=MAX_HOURS_BETWEEN).contains(&hours) {
        return Err(CoreError::invalid_cadence(format!(
            "hours_between must be within [{MIN_HOURS_BETWEEN}, {MAX_HOURS_BETWEEN}], got {hours}"
        )));
    }
    // Range-checked above, so the product fits comfortably in i64.
    Ok(TimeDelta::seconds((hours * 3600.0).round() as i64))
}

/// First instant of `date` in `tz`. When midnight falls in a DST gap the
/// day starts at the first local time that exists.
fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let start = date.and_time(NaiveTime::MIN);
    (0..4)
        .map(|h| start + TimeDelta::hours(h))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map_or_else(|| start.and_utc(), |dt| dt.with_timezone(&Utc))
}
