//! The task catalog (C7): named, independently-scheduled background jobs.
//! Each entry pairs a cadence with a concurrency cap and a wall-clock
//! timeout; the tick loop in [`crate::tick`] is the only thing that reads
//! this table.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use std::time::Duration as StdDuration;

/// How a task's cadence is expressed. `Interval` fires every fixed duration
/// since its last dispatch; `Daily`/`Weekly` fire once a calendar boundary is
/// crossed, regardless of exactly when the previous tick happened to land.
#[derive(Debug, Clone, Copy)]
pub enum ScheduleKind {
    Interval(StdDuration),
    Daily { hour: u32, minute: u32 },
    Weekly { weekday: Weekday, hour: u32, minute: u32 },
}

impl ScheduleKind {
    /// True if this task should fire now, given when it last ran.
    pub fn is_due(&self, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match self {
            ScheduleKind::Interval(period) => match last_run {
                None => true,
                Some(t) => now.signed_duration_since(t) >= chrono_duration(*period),
            },
            ScheduleKind::Daily { hour, minute } => {
                let boundary = most_recent_daily_boundary(now, *hour, *minute);
                match last_run {
                    None => true,
                    Some(t) => t < boundary,
                }
            }
            ScheduleKind::Weekly { weekday, hour, minute } => {
                let boundary = most_recent_weekly_boundary(now, *weekday, *hour, *minute);
                match last_run {
                    None => true,
                    Some(t) => t < boundary,
                }
            }
        }
    }
}

fn chrono_duration(d: StdDuration) -> Duration {
    Duration::from_std(d).unwrap_or(Duration::zero())
}

fn most_recent_daily_boundary(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    let today = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .expect("valid hour/minute")
        .and_utc();
    if today <= now {
        today
    } else {
        today - Duration::days(1)
    }
}

fn most_recent_weekly_boundary(now: DateTime<Utc>, weekday: Weekday, hour: u32, minute: u32) -> DateTime<Utc> {
    let days_since = (now.weekday().num_days_from_monday() as i64
        - weekday.num_days_from_monday() as i64)
        .rem_euclid(7);
    let candidate_date = (now - Duration::days(days_since)).date_naive();
    let candidate = candidate_date
        .and_hms_opt(hour, minute, 0)
        .expect("valid hour/minute")
        .and_utc();
    if candidate <= now {
        candidate
    } else {
        candidate - Duration::days(7)
    }
}

/// One entry in the task catalog.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: &'static str,
    pub schedule: ScheduleKind,
    /// Highest number of concurrent in-flight runs. Almost always 1 — a
    /// task still running when its next cadence boundary arrives simply
    /// skips that tick rather than overlapping itself.
    pub max_concurrency: usize,
    pub timeout: StdDuration,
}

/// The default catalog the application binary registers. Named per the
/// pipeline stage or maintenance sweep it drives, not per implementation
/// detail, so the tick loop's logs read the same regardless of how a given
/// job happens to be wired underneath.
pub fn default_catalog() -> Vec<TaskSpec> {
    vec![
        TaskSpec {
            name: "profile_enrichment",
            schedule: ScheduleKind::Interval(StdDuration::from_secs(2 * 60)),
            max_concurrency: 1,
            timeout: StdDuration::from_secs(15 * 60),
        },
        TaskSpec {
            name: "ai_description",
            schedule: ScheduleKind::Interval(StdDuration::from_secs(2 * 60)),
            max_concurrency: 1,
            timeout: StdDuration::from_secs(10 * 60),
        },
        TaskSpec {
            name: "vetting",
            schedule: ScheduleKind::Interval(StdDuration::from_secs(90)),
            max_concurrency: 1,
            timeout: StdDuration::from_secs(10 * 60),
        },
        TaskSpec {
            name: "match_creation",
            schedule: ScheduleKind::Interval(StdDuration::from_secs(90)),
            max_concurrency: 1,
            timeout: StdDuration::from_secs(5 * 60),
        },
        TaskSpec {
            name: "auto_discovery_sweep",
            schedule: ScheduleKind::Interval(StdDuration::from_secs(5 * 60)),
            max_concurrency: 1,
            timeout: StdDuration::from_secs(30 * 60),
        },
        TaskSpec {
            name: "health_check",
            schedule: ScheduleKind::Interval(StdDuration::from_secs(10 * 60)),
            max_concurrency: 1,
            timeout: StdDuration::from_secs(5 * 60),
        },
        TaskSpec {
            name: "weekly_counters_reset",
            schedule: ScheduleKind::Weekly { weekday: Weekday::Mon, hour: 0, minute: 5 },
            max_concurrency: 1,
            timeout: StdDuration::from_secs(60),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_due_when_never_run() {
        let kind = ScheduleKind::Interval(StdDuration::from_secs(60));
        assert!(kind.is_due(None, Utc::now()));
    }

    #[test]
    fn interval_not_due_before_period_elapses() {
        let kind = ScheduleKind::Interval(StdDuration::from_secs(600));
        let now = Utc::now();
        assert!(!kind.is_due(Some(now - Duration::seconds(60)), now));
        assert!(kind.is_due(Some(now - Duration::seconds(700)), now));
    }

    #[test]
    fn daily_due_after_boundary_crossed() {
        let kind = ScheduleKind::Daily { hour: 3, minute: 0 };
        let now = Utc.with_ymd_and_hms(2026, 1, 10, 4, 0, 0).unwrap();
        let last_run_before_boundary = Utc.with_ymd_and_hms(2026, 1, 10, 2, 0, 0).unwrap();
        let last_run_after_boundary = Utc.with_ymd_and_hms(2026, 1, 10, 3, 30, 0).unwrap();
        assert!(kind.is_due(Some(last_run_before_boundary), now));
        assert!(!kind.is_due(Some(last_run_after_boundary), now));
    }

    #[test]
    fn weekly_due_after_boundary_crossed() {
        let kind = ScheduleKind::Weekly { weekday: Weekday::Mon, hour: 0, minute: 5 };
        // 2026-01-12 is a Monday.
        let now = Utc.with_ymd_and_hms(2026, 1, 12, 1, 0, 0).unwrap();
        let last_week = Utc.with_ymd_and_hms(2026, 1, 5, 0, 5, 0).unwrap();
        assert!(kind.is_due(Some(last_week), now));
        let this_week = Utc.with_ymd_and_hms(2026, 1, 12, 0, 30, 0).unwrap();
        assert!(!kind.is_due(Some(this_week), now));
    }

    use chrono::TimeZone;
}
