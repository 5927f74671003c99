//! Human review task persistence. A review task is created whenever a pipeline
//! stage produces something a person should confirm before it moves forward
//! (a new match suggestion, an approved match's outgoing pitch).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_graphql::dataloader::{DataLoader, Loader};
use outreach_common::{MatchSuggestion, Result, ReviewTask, ReviewTaskStatus, ReviewTaskType};
use sqlx::PgPool;
use uuid::Uuid;

use crate::matches::MatchStore;

#[derive(Clone)]
pub struct ReviewTaskStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ReviewTaskRow {
    review_task_id: i64,
    task_type: String,
    related_id: i64,
    campaign_id: Uuid,
    status: String,
    notes: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

const REVIEW_TASK_COLUMNS: &str =
    "review_task_id, task_type, related_id, campaign_id, status, notes, created_at, updated_at";

impl ReviewTaskRow {
    fn into_domain(self) -> ReviewTask {
        ReviewTask {
            review_task_id: self.review_task_id,
            task_type: ReviewTaskType::from_str(&self.task_type)
                .unwrap_or(ReviewTaskType::MatchSuggestion),
            related_id: self.related_id,
            campaign_id: self.campaign_id,
            status: ReviewTaskStatus::from_str(&self.status).unwrap_or(ReviewTaskStatus::Pending),
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl ReviewTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        task_type: ReviewTaskType,
        related_id: i64,
        campaign_id: Uuid,
    ) -> Result<ReviewTask> {
        let row = sqlx::query_as::<_, ReviewTaskRow>(&format!(
            "INSERT INTO review_tasks (task_type, related_id, campaign_id, status) \
             VALUES ($1, $2, $3, 'pending') RETURNING {REVIEW_TASK_COLUMNS}"
        ))
        .bind(task_type.as_str())
        .bind(related_id)
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_domain())
    }

    pub async fn get(&self, review_task_id: i64) -> Result<Option<ReviewTask>> {
        let row = sqlx::query_as::<_, ReviewTaskRow>(&format!(
            "SELECT {REVIEW_TASK_COLUMNS} FROM review_tasks WHERE review_task_id = $1"
        ))
        .bind(review_task_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ReviewTaskRow::into_domain))
    }

    pub async fn update_status(
        &self,
        review_task_id: i64,
        status: ReviewTaskStatus,
        notes: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE review_tasks SET status = $1, notes = COALESCE($2, notes), updated_at = NOW() \
             WHERE review_task_id = $3",
        )
        .bind(status.as_str())
        .bind(notes)
        .bind(review_task_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn pending_for_related(
        &self,
        related_id: i64,
        task_type: ReviewTaskType,
    ) -> Result<Vec<ReviewTask>> {
        let rows = sqlx::query_as::<_, ReviewTaskRow>(&format!(
            "SELECT {REVIEW_TASK_COLUMNS} FROM review_tasks \
             WHERE related_id = $1 AND task_type = $2 AND status = 'pending'"
        ))
        .bind(related_id)
        .bind(task_type.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ReviewTaskRow::into_domain).collect())
    }

    /// Marks every pending review task tied to a match suggestion (creation
    /// review, vetting review) complete once the client has acted on it.
    pub async fn complete_for_match(&self, match_id: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE review_tasks SET status = 'approved', updated_at = NOW() \
             WHERE related_id = $1 \
             AND task_type IN ('match_suggestion', 'match_suggestion_vetting') \
             AND status = 'pending'",
        )
        .bind(match_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn for_campaign(&self, campaign_id: Uuid) -> Result<Vec<ReviewTask>> {
        let rows = sqlx::query_as::<_, ReviewTaskRow>(&format!(
            "SELECT {REVIEW_TASK_COLUMNS} FROM review_tasks WHERE campaign_id = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ReviewTaskRow::into_domain).collect())
    }

    /// One page of a campaign's review tasks, newest first.
    pub async fn for_campaign_page(
        &self,
        campaign_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReviewTask>> {
        let rows = sqlx::query_as::<_, ReviewTaskRow>(&format!(
            "SELECT {REVIEW_TASK_COLUMNS} FROM review_tasks WHERE campaign_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(campaign_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ReviewTaskRow::into_domain).collect())
    }

    /// A page of review tasks with their payload hydrated, avoiding one
    /// query per task. Tasks are polymorphic over `task_type`: only the two
    /// match-suggestion-backed types resolve against `match_suggestions`
    /// (grouped and fetched once via [`MatchSuggestionLoader`]); a
    /// `pitch_review` task has no hydrated counterpart here, since outgoing
    /// pitch review is not modelled by this repository.
    pub async fn list_for_campaign_hydrated(
        &self,
        campaign_id: Uuid,
        match_loader: &DataLoader<MatchSuggestionLoader>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HydratedReviewTask>> {
        let tasks = self.for_campaign_page(campaign_id, limit, offset).await?;

        let match_ids: Vec<i64> = tasks
            .iter()
            .filter(|t| {
                matches!(
                    t.task_type,
                    ReviewTaskType::MatchSuggestion | ReviewTaskType::MatchSuggestionVetting
                )
            })
            .map(|t| t.related_id)
            .collect();

        let mut matches = match_loader
            .load_many(match_ids)
            .await
            .map_err(|e| outreach_common::OutreachError::Logic(e.to_string()))?;

        Ok(tasks
            .into_iter()
            .map(|task| {
                let payload = matches.remove(&task.related_id);
                HydratedReviewTask { task, payload }
            })
            .collect())
    }
}

/// A review task alongside its hydrated payload, if one resolves for its
/// `task_type`. `payload` is `None` both for task types this repository
/// doesn't hydrate and for a match suggestion that failed to load.
#[derive(Debug, Clone)]
pub struct HydratedReviewTask {
    pub task: ReviewTask,
    pub payload: Option<MatchSuggestion>,
}

/// Batches `match_suggestions` lookups by id for [`ReviewTaskStore::list_for_campaign_hydrated`].
/// Constructed once per request/listing call with `DataLoader::new(loader, tokio::spawn)`,
/// the same way the teacher wires its GraphQL-facing loaders.
pub struct MatchSuggestionLoader {
    pub store: MatchStore,
}

impl Loader<i64> for MatchSuggestionLoader {
    type Value = MatchSuggestion;
    type Error = Arc<outreach_common::OutreachError>;

    async fn load(&self, keys: &[i64]) -> Result<HashMap<i64, Self::Value>, Self::Error> {
        let rows = self.store.get_many(keys).await.map_err(Arc::new)?;
        Ok(rows.into_iter().map(|m| (m.match_id, m)).collect())
    }
}
