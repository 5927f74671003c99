//! Campaign persistence.

use outreach_common::{Campaign, Result};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct CampaignStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct CampaignRow {
    campaign_id: Uuid,
    person_id: Uuid,
    keywords: Vec<String>,
    ideal_podcast_description: Option<String>,
    questionnaire_responses: Option<Value>,
    embedding: Option<Value>,
    auto_discovery_enabled: bool,
    auto_discovery_status: String,
    auto_discovery_last_run: Option<chrono::DateTime<chrono::Utc>>,
    auto_discovery_last_heartbeat: Option<chrono::DateTime<chrono::Utc>>,
    auto_discovery_error: Option<String>,
    auto_discovery_progress: Value,
    auto_discovery_matches_this_week: i32,
}

impl CampaignRow {
    fn into_campaign(self) -> Campaign {
        use outreach_common::{AutoDiscoveryStatus, EmbeddingWire};
        use std::str::FromStr;

        let embedding = self
            .embedding
            .and_then(|v| serde_json::from_value::<EmbeddingWire>(v).ok())
            .map(|w| w.normalise());
        let questionnaire_responses = self
            .questionnaire_responses
            .and_then(|v| serde_json::from_value(v).ok());

        Campaign {
            campaign_id: self.campaign_id,
            person_id: self.person_id,
            keywords: self.keywords,
            ideal_podcast_description: self.ideal_podcast_description,
            questionnaire_responses,
            embedding,
            auto_discovery_enabled: self.auto_discovery_enabled,
            auto_discovery_status: AutoDiscoveryStatus::from_str(&self.auto_discovery_status)
                .unwrap_or(AutoDiscoveryStatus::Disabled),
            auto_discovery_last_run: self.auto_discovery_last_run,
            auto_discovery_last_heartbeat: self.auto_discovery_last_heartbeat,
            auto_discovery_error: self.auto_discovery_error,
            auto_discovery_progress: self.auto_discovery_progress,
            auto_discovery_matches_this_week: self.auto_discovery_matches_this_week.max(0) as u32,
        }
    }
}

const CAMPAIGN_COLUMNS: &str = "campaign_id, person_id, keywords, ideal_podcast_description, \
     questionnaire_responses, embedding, auto_discovery_enabled, auto_discovery_status, \
     auto_discovery_last_run, auto_discovery_last_heartbeat, auto_discovery_error, \
     auto_discovery_progress, auto_discovery_matches_this_week";

impl CampaignStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, campaign_id: Uuid) -> Result<Option<Campaign>> {
        let row = sqlx::query_as::<_, CampaignRow>(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE campaign_id = $1"
        ))
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CampaignRow::into_campaign))
    }

    /// Campaigns with auto-discovery enabled and due for a fresh run, i.e. not
    /// currently `running` and not already at this week's match cap. `error`
    /// campaigns are deliberately excluded here — [`reset_stale_errors`] is
    /// what moves them back to `pending` once they're old enough to retry,
    /// so this query never has to reason about error age itself.
    pub async fn due_for_auto_discovery(&self, limit: i64) -> Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, CampaignRow>(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns \
             WHERE auto_discovery_enabled = TRUE \
             AND auto_discovery_status IN ('pending', 'paused', 'completed') \
             ORDER BY auto_discovery_last_run ASC NULLS FIRST \
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CampaignRow::into_campaign).collect())
    }

    /// Atomically claims a campaign for a sweep: transitions it from any of
    /// `pending`/`paused`/`completed`/`error` to `running`, stamping a fresh
    /// heartbeat and run timestamp in the same statement. Returns `false`
    /// (no row touched) if another sweep already holds it — the CAS guard
    /// that makes two concurrent controller ticks safe to run against the
    /// same campaign set.
    pub async fn try_claim_for_running(&self, campaign_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE campaigns \
             SET auto_discovery_status = 'running', auto_discovery_error = NULL, \
                 auto_discovery_last_run = NOW(), auto_discovery_last_heartbeat = NOW(), \
                 updated_at = NOW() \
             WHERE campaign_id = $1 \
             AND auto_discovery_status IN ('pending', 'paused', 'completed', 'error')",
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_auto_discovery_status(
        &self,
        campaign_id: Uuid,
        status: outreach_common::AutoDiscoveryStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE campaigns \
             SET auto_discovery_status = $1, auto_discovery_error = $2, updated_at = NOW() \
             WHERE campaign_id = $3",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_heartbeat(&self, campaign_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE campaigns SET auto_discovery_last_heartbeat = NOW(), updated_at = NOW() \
             WHERE campaign_id = $1",
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stamps `auto_discovery_progress` mid-run without touching status or
    /// timestamps — used to surface which stage a sweep is currently in
    /// (e.g. `fetching_podcasts`) while it's still running, rather than only
    /// reporting a result once the run reaches a terminal state.
    pub async fn record_progress(&self, campaign_id: Uuid, progress: &Value) -> Result<()> {
        sqlx::query(
            "UPDATE campaigns SET auto_discovery_progress = $1, updated_at = NOW() \
             WHERE campaign_id = $2",
        )
        .bind(progress)
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_run_completed(&self, campaign_id: Uuid, progress: &Value) -> Result<()> {
        sqlx::query(
            "UPDATE campaigns \
             SET auto_discovery_status = 'completed', auto_discovery_last_run = NOW(), \
                 auto_discovery_progress = $1, updated_at = NOW() \
             WHERE campaign_id = $2",
        )
        .bind(progress)
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Resets every campaign stuck in `running` back to `pending` in one
    /// statement, recording the reason in `auto_discovery_error` so the
    /// health checker's report can explain what it fixed. Returns the number
    /// of campaigns reset.
    pub async fn reset_stuck_running(&self, heartbeat_stale_minutes: i64, run_stale_minutes: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE campaigns \
             SET auto_discovery_status = 'pending', \
                 auto_discovery_error = 'reset after a stuck running state', \
                 updated_at = NOW() \
             WHERE auto_discovery_status = 'running' \
             AND ( \
                 auto_discovery_last_heartbeat IS NULL \
                 OR auto_discovery_last_heartbeat < NOW() - ($1 || ' minutes')::interval \
                 OR auto_discovery_last_run < NOW() - ($2 || ' minutes')::interval \
             )",
        )
        .bind(heartbeat_stale_minutes.to_string())
        .bind(run_stale_minutes.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Resets campaigns stuck in `error` for longer than `stale_hours` back
    /// to `pending` so [`due_for_auto_discovery`] picks them up again.
    /// Returns the number reset.
    pub async fn reset_stale_errors(&self, stale_hours: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE campaigns \
             SET auto_discovery_status = 'pending', updated_at = NOW() \
             WHERE auto_discovery_status = 'error' \
             AND updated_at < NOW() - ($1 || ' hours')::interval",
        )
        .bind(stale_hours.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn increment_weekly_auto_discovery_matches(
        &self,
        campaign_id: Uuid,
        by: u32,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE campaigns \
             SET auto_discovery_matches_this_week = auto_discovery_matches_this_week + $1, \
                 updated_at = NOW() \
             WHERE campaign_id = $2",
        )
        .bind(by as i32)
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Resets the weekly auto-discovery match counter for every campaign. Run
    /// on the same cadence as the client-profile weekly reset.
    pub async fn reset_weekly_auto_discovery_matches(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE campaigns SET auto_discovery_matches_this_week = 0")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
