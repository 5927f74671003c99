//! Discovery lifecycle persistence: the campaign/media join row that tracks a
//! single candidate through enrichment, vetting, and match creation.
//!
//! Work acquisition here is atomic: `acquire_*_batch` takes a batch of rows
//! off the candidate set and stamps a processing lock in the same statement
//! that selects them, using `FOR UPDATE SKIP LOCKED` so two workers polling
//! concurrently never pick up the same row.

use chrono::Utc;
use outreach_common::{CampaignMediaDiscovery, Result, StageStatus};
use serde_json::Value;
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone)]
pub struct DiscoveryStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct DiscoveryRow {
    id: i64,
    campaign_id: Uuid,
    media_id: i64,
    discovery_keyword: String,
    enrichment_status: String,
    enrichment_error: Option<String>,
    vetting_status: String,
    vetting_error: Option<String>,
    vetting_score: Option<i32>,
    vetting_reasoning: Option<String>,
    vetting_criteria: Option<Value>,
    topic_match_analysis: Option<String>,
    matched_expertise: Vec<String>,
    match_created: bool,
    match_suggestion_id: Option<i64>,
    review_task_created: bool,
    review_task_id: Option<i64>,
    processing_lock: Option<String>,
    discovered_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    enrichment_completed_at: Option<chrono::DateTime<Utc>>,
    vetted_at: Option<chrono::DateTime<Utc>>,
}

const DISCOVERY_COLUMNS: &str = "id, campaign_id, media_id, discovery_keyword, enrichment_status, \
     enrichment_error, vetting_status, vetting_error, vetting_score, vetting_reasoning, \
     vetting_criteria, topic_match_analysis, matched_expertise, match_created, \
     match_suggestion_id, review_task_created, review_task_id, processing_lock, discovered_at, \
     updated_at, enrichment_completed_at, vetted_at";

impl DiscoveryRow {
    fn into_domain(self) -> CampaignMediaDiscovery {
        CampaignMediaDiscovery {
            id: self.id,
            campaign_id: self.campaign_id,
            media_id: self.media_id,
            discovery_keyword: self.discovery_keyword,
            enrichment_status: StageStatus::from_str(&self.enrichment_status)
                .unwrap_or(StageStatus::Pending),
            enrichment_error: self.enrichment_error,
            vetting_status: StageStatus::from_str(&self.vetting_status)
                .unwrap_or(StageStatus::Pending),
            vetting_error: self.vetting_error,
            vetting_score: self.vetting_score,
            vetting_reasoning: self.vetting_reasoning,
            vetting_criteria: self.vetting_criteria,
            topic_match_analysis: self.topic_match_analysis,
            matched_expertise: self.matched_expertise,
            match_created: self.match_created,
            match_suggestion_id: self.match_suggestion_id,
            review_task_created: self.review_task_created,
            review_task_id: self.review_task_id,
            processing_lock: self.processing_lock,
            discovered_at: self.discovered_at,
            updated_at: self.updated_at,
            enrichment_completed_at: self.enrichment_completed_at,
            vetted_at: self.vetted_at,
        }
    }
}

/// A sentinel written into `processing_lock` while a batch worker owns a row.
/// Carries its own timestamp so a cleanup sweep can tell a stale lock from a
/// live one without a separate heartbeat table.
fn lock_sentinel(stage: &str) -> String {
    format!(
        "PROCESSING:{stage}:{}:{}",
        Uuid::new_v4().simple(),
        Utc::now().to_rfc3339()
    )
}

impl DiscoveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_or_get(
        &self,
        campaign_id: Uuid,
        media_id: i64,
        discovery_keyword: &str,
    ) -> Result<CampaignMediaDiscovery> {
        let row = sqlx::query_as::<_, DiscoveryRow>(&format!(
            "INSERT INTO campaign_media_discoveries (campaign_id, media_id, discovery_keyword) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (campaign_id, media_id) \
             DO UPDATE SET updated_at = NOW() \
             RETURNING {DISCOVERY_COLUMNS}"
        ))
        .bind(campaign_id)
        .bind(media_id)
        .bind(discovery_keyword)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_domain())
    }

    pub async fn get_by_campaign_and_media(
        &self,
        campaign_id: Uuid,
        media_id: i64,
    ) -> Result<Option<CampaignMediaDiscovery>> {
        let row = sqlx::query_as::<_, DiscoveryRow>(&format!(
            "SELECT {DISCOVERY_COLUMNS} FROM campaign_media_discoveries \
             WHERE campaign_id = $1 AND media_id = $2"
        ))
        .bind(campaign_id)
        .bind(media_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(DiscoveryRow::into_domain))
    }

    pub async fn needing_enrichment(&self, limit: i64) -> Result<Vec<CampaignMediaDiscovery>> {
        let rows = sqlx::query_as::<_, DiscoveryRow>(&format!(
            "SELECT cmd.{cols} FROM campaign_media_discoveries cmd \
             JOIN media m ON cmd.media_id = m.media_id \
             WHERE cmd.enrichment_status = 'pending' \
             AND (m.last_enriched_timestamp IS NULL OR m.quality_score IS NULL) \
             ORDER BY cmd.discovered_at ASC LIMIT $1",
            cols = DISCOVERY_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DiscoveryRow::into_domain).collect())
    }

    pub async fn update_enrichment_status(
        &self,
        discovery_id: i64,
        status: StageStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE campaign_media_discoveries \
             SET enrichment_status = $1, \
                 enrichment_completed_at = CASE WHEN $1 = 'completed' THEN NOW() ELSE enrichment_completed_at END, \
                 enrichment_error = $2, updated_at = NOW() \
             WHERE id = $3",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(discovery_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically acquires up to `limit` discoveries that have completed
    /// enrichment but are still missing an AI description, stamping a
    /// processing lock so a second caller polling at the same moment skips
    /// them (`SKIP LOCKED`) rather than racing for the same rows.
    pub async fn acquire_ai_description_batch(
        &self,
        limit: i64,
    ) -> Result<Vec<CampaignMediaDiscovery>> {
        let lock = lock_sentinel("AI_DESC");
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, DiscoveryRow>(&format!(
            "WITH candidates AS ( \
                 SELECT cmd.id \
                 FROM campaign_media_discoveries cmd \
                 JOIN media m ON cmd.media_id = m.media_id \
                 WHERE cmd.enrichment_status = 'completed' \
                 AND cmd.vetting_status = 'pending' \
                 AND (m.ai_description IS NULL OR m.ai_description = '') \
                 AND COALESCE(m.episode_count, 0) > 0 \
                 AND cmd.processing_lock IS NULL \
                 ORDER BY cmd.enrichment_completed_at ASC \
                 LIMIT $1 \
                 FOR UPDATE OF cmd SKIP LOCKED \
             ) \
             UPDATE campaign_media_discoveries \
             SET processing_lock = $2, updated_at = NOW() \
             FROM candidates \
             WHERE campaign_media_discoveries.id = candidates.id \
             RETURNING campaign_media_discoveries.{cols}",
            cols = DISCOVERY_COLUMNS
        ))
        .bind(limit)
        .bind(&lock)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows.into_iter().map(DiscoveryRow::into_domain).collect())
    }

    pub async fn release_ai_description_lock(&self, discovery_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE campaign_media_discoveries SET processing_lock = NULL, updated_at = NOW() \
             WHERE id = $1 AND processing_lock LIKE 'PROCESSING:AI_DESC:%'",
        )
        .bind(discovery_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically acquires up to `limit` discoveries ready for vetting: host
    /// names at sufficient confidence, an AI description, an ideal profile on
    /// the campaign side, and at least one episode.
    pub async fn acquire_vetting_batch(&self, limit: i64) -> Result<Vec<CampaignMediaDiscovery>> {
        let lock = lock_sentinel("VETTING");
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, DiscoveryRow>(&format!(
            "WITH candidates AS ( \
                 SELECT cmd.id \
                 FROM campaign_media_discoveries cmd \
                 JOIN media m ON cmd.media_id = m.media_id \
                 JOIN campaigns c ON cmd.campaign_id = c.campaign_id \
                 WHERE cmd.enrichment_status = 'completed' \
                 AND cmd.vetting_status = 'pending' \
                 AND m.ai_description IS NOT NULL \
                 AND c.ideal_podcast_description IS NOT NULL \
                 AND jsonb_array_length(m.host_names) > 0 \
                 AND m.host_names_confidence >= 0.8 \
                 AND cmd.processing_lock IS NULL \
                 AND EXISTS (SELECT 1 FROM episodes e WHERE e.media_id = m.media_id) \
                 ORDER BY cmd.enrichment_completed_at ASC \
                 LIMIT $1 \
                 FOR UPDATE OF cmd SKIP LOCKED \
             ) \
             UPDATE campaign_media_discoveries \
             SET vetting_status = 'in_progress', processing_lock = $2, updated_at = NOW() \
             FROM candidates \
             WHERE campaign_media_discoveries.id = candidates.id \
             RETURNING campaign_media_discoveries.{cols}",
            cols = DISCOVERY_COLUMNS
        ))
        .bind(limit)
        .bind(&lock)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows.into_iter().map(DiscoveryRow::into_domain).collect())
    }

    pub async fn update_vetting_results(
        &self,
        discovery_id: i64,
        vetting_score: i32,
        vetting_reasoning: &str,
        vetting_criteria: &Value,
        topic_match_analysis: Option<&str>,
        matched_expertise: &[String],
    ) -> Result<()> {
        sqlx::query(
            "UPDATE campaign_media_discoveries \
             SET vetting_status = 'completed', vetting_score = $1, vetting_reasoning = $2, \
                 vetting_criteria = $3, topic_match_analysis = $4, matched_expertise = $5, \
                 processing_lock = NULL, vetted_at = NOW(), updated_at = NOW() \
             WHERE id = $6",
        )
        .bind(vetting_score)
        .bind(vetting_reasoning)
        .bind(vetting_criteria)
        .bind(topic_match_analysis)
        .bind(matched_expertise)
        .bind(discovery_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail_vetting(&self, discovery_id: i64, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE campaign_media_discoveries \
             SET vetting_status = 'failed', vetting_error = $1, processing_lock = NULL, \
                 updated_at = NOW() \
             WHERE id = $2",
        )
        .bind(error)
        .bind(discovery_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn ready_for_match_creation(
        &self,
        min_vetting_score: i32,
        limit: i64,
    ) -> Result<Vec<CampaignMediaDiscovery>> {
        let rows = sqlx::query_as::<_, DiscoveryRow>(&format!(
            "SELECT cmd.{cols} FROM campaign_media_discoveries cmd \
             WHERE cmd.vetting_status = 'completed' \
             AND cmd.vetting_score >= $1 \
             AND cmd.match_created = FALSE \
             ORDER BY cmd.vetting_score DESC, cmd.vetted_at ASC \
             LIMIT $2",
            cols = DISCOVERY_COLUMNS
        ))
        .bind(min_vetting_score)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DiscoveryRow::into_domain).collect())
    }

    /// Same candidate set as [`ready_for_match_creation`], scoped to one
    /// campaign — used by the auto-discovery controller to create matches
    /// for only the campaign it's currently sweeping, rather than stealing
    /// work queued for every campaign.
    pub async fn ready_for_match_creation_for_campaign(
        &self,
        campaign_id: Uuid,
        min_vetting_score: i32,
        limit: i64,
    ) -> Result<Vec<CampaignMediaDiscovery>> {
        let rows = sqlx::query_as::<_, DiscoveryRow>(&format!(
            "SELECT cmd.{cols} FROM campaign_media_discoveries cmd \
             WHERE cmd.campaign_id = $1 \
             AND cmd.vetting_status = 'completed' \
             AND cmd.vetting_score >= $2 \
             AND cmd.match_created = FALSE \
             ORDER BY cmd.vetting_score DESC, cmd.vetted_at ASC \
             LIMIT $3",
            cols = DISCOVERY_COLUMNS
        ))
        .bind(campaign_id)
        .bind(min_vetting_score)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DiscoveryRow::into_domain).collect())
    }

    pub async fn mark_match_created(&self, discovery_id: i64, match_suggestion_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE campaign_media_discoveries \
             SET match_created = TRUE, match_suggestion_id = $1, updated_at = NOW() \
             WHERE id = $2",
        )
        .bind(match_suggestion_id)
        .bind(discovery_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_review_task_created(&self, discovery_id: i64, review_task_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE campaign_media_discoveries \
             SET review_task_created = TRUE, review_task_id = $1, updated_at = NOW() \
             WHERE id = $2",
        )
        .bind(review_task_id)
        .bind(discovery_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn for_campaign(
        &self,
        campaign_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CampaignMediaDiscovery>> {
        let rows = sqlx::query_as::<_, DiscoveryRow>(&format!(
            "SELECT {cols} FROM campaign_media_discoveries \
             WHERE campaign_id = $1 \
             ORDER BY vetting_score DESC NULLS LAST, discovered_at DESC \
             LIMIT $2 OFFSET $3",
            cols = DISCOVERY_COLUMNS
        ))
        .bind(campaign_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DiscoveryRow::into_domain).collect())
    }

    /// Clears processing locks whose embedded timestamp is older than
    /// `stale_minutes`, and resets any `vetting_status = 'in_progress'` row
    /// caught mid-lock back to `pending` so it re-enters the vetting queue.
    /// Run from the background pool by the health checker, never inline with
    /// request-serving paths.
    pub async fn cleanup_stale_locks(&self, stale_minutes: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE campaign_media_discoveries \
             SET processing_lock = NULL, \
                 vetting_status = CASE WHEN vetting_status = 'in_progress' THEN 'pending' ELSE vetting_status END, \
                 updated_at = NOW() \
             WHERE processing_lock IS NOT NULL \
             AND ( \
                 updated_at < NOW() - ($1 || ' minutes')::interval \
             )",
        )
        .bind(stale_minutes.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Marks `enrichment_status = 'in_progress'` rows complete whenever the
    /// underlying media row already carries a fresh enrichment timestamp —
    /// catches the case where `update_enrichment` on the media side
    /// succeeded but the discovery's own status update was lost to a crash
    /// mid-pass. Run by the health checker, never inline with a live pass.
    pub async fn advance_stalled_after_media_enrichment(&self, stale_minutes: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE campaign_media_discoveries cmd \
             SET enrichment_status = 'completed', enrichment_completed_at = NOW(), updated_at = NOW() \
             FROM media m \
             WHERE cmd.media_id = m.media_id \
             AND cmd.enrichment_status = 'in_progress' \
             AND cmd.updated_at < NOW() - ($1 || ' minutes')::interval \
             AND m.last_enriched_timestamp IS NOT NULL \
             AND m.last_enriched_timestamp > cmd.updated_at",
        )
        .bind(stale_minutes.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Requeues every `vetting_status = 'failed'` discovery for a campaign
    /// back to `pending`, clearing the recorded error, so the next vetting
    /// sweep gives it another pass. This is the store half of the manual
    /// "revet" tool — it never runs on its own schedule.
    pub async fn revet_failed(&self, campaign_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE campaign_media_discoveries \
             SET vetting_status = 'pending', vetting_error = NULL, processing_lock = NULL, \
                 updated_at = NOW() \
             WHERE campaign_id = $1 AND vetting_status = 'failed'",
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Requeues vetting failures older than `stale_hours` whose error text
    /// doesn't look like a permanent data problem (missing ideal profile,
    /// missing media) — the health checker's idempotent retry pass for
    /// failures that were plausibly just a transient LLM or network blip.
    pub async fn reset_stale_vetting_failures(&self, stale_hours: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE campaign_media_discoveries \
             SET vetting_status = 'pending', vetting_error = NULL, processing_lock = NULL, \
                 updated_at = NOW() \
             WHERE vetting_status = 'failed' \
             AND updated_at < NOW() - ($1 || ' hours')::interval \
             AND vetting_error NOT ILIKE '%no longer exists%' \
             AND vetting_error NOT ILIKE '%no ideal profile%'",
        )
        .bind(stale_hours.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
