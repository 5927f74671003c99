//! Match suggestion persistence.

use chrono::Utc;
use outreach_common::{MatchStatus, MatchSuggestion, Result, ReviewTaskType};
use serde_json::Value;
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone)]
pub struct MatchStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct MatchRow {
    match_id: i64,
    campaign_id: Uuid,
    media_id: i64,
    match_score: Option<f32>,
    matched_keywords: Vec<String>,
    ai_reasoning: String,
    vetting_score: i32,
    vetting_reasoning: String,
    vetting_checklist: Value,
    best_matching_episode_id: Option<i64>,
    status: String,
    client_approved_at: Option<chrono::DateTime<Utc>>,
    created_at: chrono::DateTime<Utc>,
}

const MATCH_COLUMNS: &str = "match_id, campaign_id, media_id, match_score, matched_keywords, \
     ai_reasoning, vetting_score, vetting_reasoning, vetting_checklist, \
     best_matching_episode_id, status, client_approved_at, created_at";

impl MatchRow {
    fn into_domain(self) -> MatchSuggestion {
        MatchSuggestion {
            match_id: self.match_id,
            campaign_id: self.campaign_id,
            media_id: self.media_id,
            match_score: self.match_score.unwrap_or(0.0),
            matched_keywords: self.matched_keywords,
            ai_reasoning: self.ai_reasoning,
            vetting_score: self.vetting_score,
            vetting_reasoning: self.vetting_reasoning,
            vetting_checklist: self.vetting_checklist,
            best_matching_episode_id: self.best_matching_episode_id,
            status: MatchStatus::from_str(&self.status).unwrap_or(MatchStatus::PendingVetting),
            client_approved_at: self.client_approved_at,
            created_at: self.created_at,
        }
    }
}

pub struct NewMatch {
    pub campaign_id: Uuid,
    pub media_id: i64,
    pub match_score: f32,
    pub matched_keywords: Vec<String>,
    pub ai_reasoning: String,
    pub vetting_score: i32,
    pub vetting_reasoning: String,
    pub vetting_checklist: Value,
    pub best_matching_episode_id: Option<i64>,
}

/// Outcome of [`MatchStore::create_match_and_mark_discovery`]: either the
/// match was created (the client's weekly quota had headroom), or the quota
/// check failed and nothing was written — the caller treats this the same
/// way it would treat `ClientProfileStore::try_increment_match_count`
/// returning `false`, just without a separate round trip to find out.
pub enum CreateMatchOutcome {
    Created(MatchSuggestion, i64),
    QuotaExceeded,
}

impl MatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, match_id: i64) -> Result<Option<MatchSuggestion>> {
        let row = sqlx::query_as::<_, MatchRow>(&format!(
            "SELECT {MATCH_COLUMNS} FROM match_suggestions WHERE match_id = $1"
        ))
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MatchRow::into_domain))
    }

    /// Creates a match suggestion for a vetted discovery. This is deliberately
    /// plain (no transaction) — the caller that also needs to stamp
    /// `campaign_media_discoveries.match_created` uses
    /// [`create_match_and_mark_discovery`] instead, which wraps both writes in
    /// one transaction so the two never disagree.
    pub async fn create(&self, new: NewMatch) -> Result<MatchSuggestion> {
        let row = sqlx::query_as::<_, MatchRow>(&format!(
            "INSERT INTO match_suggestions \
                 (campaign_id, media_id, match_score, matched_keywords, ai_reasoning, \
                  vetting_score, vetting_reasoning, vetting_checklist, best_matching_episode_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {MATCH_COLUMNS}"
        ))
        .bind(new.campaign_id)
        .bind(new.media_id)
        .bind(new.match_score)
        .bind(&new.matched_keywords)
        .bind(&new.ai_reasoning)
        .bind(new.vetting_score)
        .bind(&new.vetting_reasoning)
        .bind(&new.vetting_checklist)
        .bind(new.best_matching_episode_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_domain())
    }

    /// Creates the match suggestion, marks the source discovery as having a
    /// match, and creates the human-review task for it — all in one
    /// transaction, gated by the client's weekly match quota. The quota
    /// check (the same conditional `UPDATE ... RETURNING` as
    /// `ClientProfileStore::try_increment_match_count`) runs as this
    /// transaction's first statement and rolls everything back if it
    /// affects zero rows, so a match can never be created after its quota
    /// increment would have failed.
    pub async fn create_match_and_mark_discovery(
        &self,
        new: NewMatch,
        discovery_id: i64,
        person_id: Uuid,
    ) -> Result<CreateMatchOutcome> {
        let mut tx = self.pool.begin().await?;

        let quota = sqlx::query(
            "UPDATE client_profiles \
             SET current_weekly_matches = current_weekly_matches + 1, updated_at = NOW() \
             WHERE person_id = $1 \
             AND current_weekly_matches + 1 <= weekly_match_allowance",
        )
        .bind(person_id)
        .execute(&mut *tx)
        .await?;
        if quota.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CreateMatchOutcome::QuotaExceeded);
        }

        let row = sqlx::query_as::<_, MatchRow>(&format!(
            "INSERT INTO match_suggestions \
                 (campaign_id, media_id, match_score, matched_keywords, ai_reasoning, \
                  vetting_score, vetting_reasoning, vetting_checklist, best_matching_episode_id, \
                  status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending_client_review') \
             RETURNING {MATCH_COLUMNS}"
        ))
        .bind(new.campaign_id)
        .bind(new.media_id)
        .bind(new.match_score)
        .bind(&new.matched_keywords)
        .bind(&new.ai_reasoning)
        .bind(new.vetting_score)
        .bind(&new.vetting_reasoning)
        .bind(&new.vetting_checklist)
        .bind(new.best_matching_episode_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE campaign_media_discoveries \
             SET match_created = TRUE, match_suggestion_id = $1, updated_at = NOW() \
             WHERE id = $2",
        )
        .bind(row.match_id)
        .bind(discovery_id)
        .execute(&mut *tx)
        .await?;

        let review_task_id: i64 = sqlx::query_scalar(
            "INSERT INTO review_tasks (task_type, related_id, campaign_id, status) \
             VALUES ($1, $2, $3, 'pending') RETURNING review_task_id",
        )
        .bind(ReviewTaskType::MatchSuggestion.as_str())
        .bind(row.match_id)
        .bind(row.campaign_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CreateMatchOutcome::Created(row.into_domain(), review_task_id))
    }

    pub async fn approve(&self, match_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE match_suggestions SET status = 'pending_client_review', client_approved_at = NOW() \
             WHERE match_id = $1 AND status <> 'pending_client_review'",
        )
        .bind(match_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_status(&self, match_id: i64, status: MatchStatus) -> Result<()> {
        sqlx::query("UPDATE match_suggestions SET status = $1 WHERE match_id = $2")
            .bind(status.as_str())
            .bind(match_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Batch-fetches match suggestions by id in a single round trip. Backs
    /// [`crate::review_tasks::MatchSuggestionLoader`] so listing a page of
    /// review tasks hydrates their match payloads with one query instead of
    /// one per task.
    pub async fn get_many(&self, ids: &[i64]) -> Result<Vec<MatchSuggestion>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, MatchRow>(&format!(
            "SELECT {MATCH_COLUMNS} FROM match_suggestions WHERE match_id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MatchRow::into_domain).collect())
    }

    pub async fn for_campaign(&self, campaign_id: Uuid) -> Result<Vec<MatchSuggestion>> {
        let rows = sqlx::query_as::<_, MatchRow>(&format!(
            "SELECT {MATCH_COLUMNS} FROM match_suggestions WHERE campaign_id = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MatchRow::into_domain).collect())
    }

    /// Re-opens every `rejected_by_ai` match suggestion for a campaign: marks
    /// the match itself `pending_vetting` again and clears the source
    /// discovery's `match_created` flag so [`crate::discoveries::DiscoveryStore::ready_for_match_creation`]
    /// picks the discovery back up. The discovery's `vetting_status` is left
    /// alone — a rejected-by-AI match was a match-creation-time decision, not
    /// a vetting failure, so it doesn't need revetting, only reconsidering.
    /// The manual "revet" tool's counterpart for matches, never run
    /// automatically.
    pub async fn revet_rejected_by_ai(&self, campaign_id: Uuid) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let reopened: Vec<i64> = sqlx::query_scalar(
            "UPDATE match_suggestions SET status = 'pending_vetting' \
             WHERE campaign_id = $1 AND status = 'rejected_by_ai' \
             RETURNING match_id",
        )
        .bind(campaign_id)
        .fetch_all(&mut *tx)
        .await?;

        if !reopened.is_empty() {
            sqlx::query(
                "UPDATE campaign_media_discoveries \
                 SET match_created = FALSE, match_suggestion_id = NULL, updated_at = NOW() \
                 WHERE match_suggestion_id = ANY($1)",
            )
            .bind(&reopened)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(reopened.len() as u64)
    }
}
