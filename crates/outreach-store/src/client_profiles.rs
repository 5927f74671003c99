//! Client (person) quota persistence: daily/weekly discovery allowances and
//! weekly match allowances, reset on a rolling basis as real time passes
//! rather than by a separate cron-only job.

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use outreach_common::{ClientProfile, Plan, Result};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone)]
pub struct ClientProfileStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ClientProfileRow {
    person_id: Uuid,
    plan: String,
    weekly_discovery_allowance: i32,
    current_weekly_discoveries: i32,
    daily_discovery_allowance: i32,
    current_daily_discoveries: i32,
    weekly_match_allowance: i32,
    current_weekly_matches: i32,
    auto_discovery_matches_this_week: i32,
    last_weekly_reset: DateTime<Utc>,
    last_daily_reset: DateTime<Utc>,
}

const PROFILE_COLUMNS: &str = "person_id, plan, weekly_discovery_allowance, \
     current_weekly_discoveries, daily_discovery_allowance, current_daily_discoveries, \
     weekly_match_allowance, current_weekly_matches, auto_discovery_matches_this_week, \
     last_weekly_reset, last_daily_reset";

impl ClientProfileRow {
    fn into_domain(self) -> ClientProfile {
        ClientProfile {
            person_id: self.person_id,
            plan: Plan::from_str(&self.plan).unwrap_or(Plan::Free),
            weekly_discovery_allowance: self.weekly_discovery_allowance.max(0) as u32,
            current_weekly_discoveries: self.current_weekly_discoveries.max(0) as u32,
            daily_discovery_allowance: self.daily_discovery_allowance.max(0) as u32,
            current_daily_discoveries: self.current_daily_discoveries.max(0) as u32,
            weekly_match_allowance: self.weekly_match_allowance.max(0) as u32,
            current_weekly_matches: self.current_weekly_matches.max(0) as u32,
            auto_discovery_matches_this_week: self.auto_discovery_matches_this_week.max(0) as u32,
            last_weekly_reset: self.last_weekly_reset,
            last_daily_reset: self.last_daily_reset,
        }
    }
}

/// Midnight UTC of the Monday on or before `now`, the reset boundary for
/// weekly counters.
fn start_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_monday = now.weekday().num_days_from_monday();
    (now - Duration::days(days_since_monday as i64))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}

impl ClientProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, person_id: Uuid) -> Result<Option<ClientProfile>> {
        let row = sqlx::query_as::<_, ClientProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM client_profiles WHERE person_id = $1"
        ))
        .bind(person_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ClientProfileRow::into_domain))
    }

    pub async fn create(
        &self,
        person_id: Uuid,
        plan: Plan,
        weekly_discovery_allowance: u32,
        daily_discovery_allowance: u32,
        weekly_match_allowance: u32,
    ) -> Result<ClientProfile> {
        let row = sqlx::query_as::<_, ClientProfileRow>(&format!(
            "INSERT INTO client_profiles \
                 (person_id, plan, weekly_discovery_allowance, daily_discovery_allowance, \
                  weekly_match_allowance) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (person_id) DO UPDATE SET plan = EXCLUDED.plan, updated_at = NOW() \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(person_id)
        .bind(plan.as_str())
        .bind(weekly_discovery_allowance as i32)
        .bind(daily_discovery_allowance as i32)
        .bind(weekly_match_allowance as i32)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_domain())
    }

    /// Rolls daily and/or weekly counters back to zero if their reset
    /// boundary has passed. Idempotent: calling this repeatedly within the
    /// same day/week is a no-op after the first call.
    pub async fn reset_counts_if_needed(&self, person_id: Uuid) -> Result<ClientProfile> {
        let now = Utc::now();
        let today = start_of_day(now);
        let week = start_of_week(now);

        let row = sqlx::query_as::<_, ClientProfileRow>(&format!(
            "UPDATE client_profiles \
             SET current_daily_discoveries = CASE WHEN last_daily_reset < $1 THEN 0 ELSE current_daily_discoveries END, \
                 last_daily_reset = CASE WHEN last_daily_reset < $1 THEN NOW() ELSE last_daily_reset END, \
                 current_weekly_discoveries = CASE WHEN last_weekly_reset < $2 THEN 0 ELSE current_weekly_discoveries END, \
                 current_weekly_matches = CASE WHEN last_weekly_reset < $2 THEN 0 ELSE current_weekly_matches END, \
                 auto_discovery_matches_this_week = CASE WHEN last_weekly_reset < $2 THEN 0 ELSE auto_discovery_matches_this_week END, \
                 last_weekly_reset = CASE WHEN last_weekly_reset < $2 THEN NOW() ELSE last_weekly_reset END, \
                 updated_at = NOW() \
             WHERE person_id = $3 \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(today)
        .bind(week)
        .bind(person_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_domain())
    }

    /// Atomically checks daily and weekly discovery allowances and, if both
    /// have headroom, increments both counters. Returns `false` (no
    /// increment performed) if either quota is exhausted.
    pub async fn try_increment_discovery_counts(&self, person_id: Uuid, by: u32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE client_profiles \
             SET current_daily_discoveries = current_daily_discoveries + $1, \
                 current_weekly_discoveries = current_weekly_discoveries + $1, \
                 updated_at = NOW() \
             WHERE person_id = $2 \
             AND current_daily_discoveries + $1 <= daily_discovery_allowance \
             AND current_weekly_discoveries + $1 <= weekly_discovery_allowance",
        )
        .bind(by as i32)
        .bind(person_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically checks the weekly match allowance and increments it if
    /// there's headroom. This is the transactional quota gate: match
    /// creation should call this (or fold the same WHERE clause into its own
    /// transaction) before committing a new `match_suggestions` row, never
    /// check-then-act against a value read earlier.
    pub async fn try_increment_match_count(&self, person_id: Uuid, by: u32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE client_profiles \
             SET current_weekly_matches = current_weekly_matches + $1, updated_at = NOW() \
             WHERE person_id = $2 \
             AND current_weekly_matches + $1 <= weekly_match_allowance",
        )
        .bind(by as i32)
        .bind(person_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Unconditionally zeroes every weekly counter and stamps `last_weekly_reset`
    /// to now. Run by the scheduler's weekly task on the Monday boundary, as a
    /// belt-and-suspenders complement to [`reset_counts_if_needed`]'s lazy,
    /// per-call reset — a client profile that never gets touched mid-week
    /// would otherwise carry stale counters until its next read.
    pub async fn reset_all_weekly_counters(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE client_profiles \
             SET current_weekly_discoveries = 0, current_weekly_matches = 0, \
                 auto_discovery_matches_this_week = 0, last_weekly_reset = NOW(), updated_at = NOW()",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Person ids whose `last_weekly_reset` predates the current week
    /// boundary by more than `stale_days` — a sign the lazy reset in
    /// [`reset_counts_if_needed`] isn't being exercised for that profile
    /// (no recent activity) and the weekly scheduled reset is carrying it
    /// instead. Used by the health checker to report on reset drift, not to
    /// act on its own.
    pub async fn stale_weekly_resets(&self, stale_days: i64) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT person_id FROM client_profiles \
             WHERE last_weekly_reset < NOW() - ($1 || ' days')::interval",
        )
        .bind(stale_days.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
