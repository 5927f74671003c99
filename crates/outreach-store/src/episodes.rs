//! Episode persistence.

use outreach_common::{Episode, Result};
use serde_json::Value;
use sqlx::PgPool;

#[derive(Clone)]
pub struct EpisodeStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct EpisodeRow {
    episode_id: i64,
    media_id: i64,
    source_api: String,
    external_episode_id: String,
    title: String,
    publish_date: Option<chrono::DateTime<chrono::Utc>>,
    duration_seconds: Option<i32>,
    summary: Option<String>,
    transcript: Option<String>,
    ai_episode_summary: Option<String>,
    themes: Vec<String>,
    keywords: Vec<String>,
    embedding: Option<Value>,
}

const EPISODE_COLUMNS: &str = "episode_id, media_id, source_api, external_episode_id, title, \
     publish_date, duration_seconds, summary, transcript, ai_episode_summary, themes, \
     keywords, embedding";

impl EpisodeRow {
    fn into_episode(self) -> Episode {
        use outreach_common::EmbeddingWire;
        let embedding = self
            .embedding
            .and_then(|v| serde_json::from_value::<EmbeddingWire>(v).ok())
            .map(|w| w.normalise());
        Episode {
            episode_id: self.episode_id,
            media_id: self.media_id,
            source_api: self.source_api,
            external_episode_id: self.external_episode_id,
            title: self.title,
            publish_date: self.publish_date,
            duration_seconds: self.duration_seconds.map(|d| d.max(0) as u32),
            summary: self.summary,
            transcript: self.transcript,
            ai_episode_summary: self.ai_episode_summary,
            themes: self.themes,
            keywords: self.keywords,
            embedding,
        }
    }
}

pub struct NewEpisode {
    pub media_id: i64,
    pub source_api: String,
    pub external_episode_id: String,
    pub title: String,
    pub publish_date: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_seconds: Option<u32>,
    pub summary: Option<String>,
}

impl EpisodeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn for_media(&self, media_id: i64) -> Result<Vec<Episode>> {
        let rows = sqlx::query_as::<_, EpisodeRow>(&format!(
            "SELECT {EPISODE_COLUMNS} FROM episodes WHERE media_id = $1 ORDER BY publish_date DESC NULLS LAST"
        ))
        .bind(media_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EpisodeRow::into_episode).collect())
    }

    pub async fn count_for_media(&self, media_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM episodes WHERE media_id = $1")
                .bind(media_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn upsert(&self, new: NewEpisode) -> Result<Episode> {
        let row = sqlx::query_as::<_, EpisodeRow>(&format!(
            "INSERT INTO episodes \
                 (media_id, source_api, external_episode_id, title, publish_date, duration_seconds, summary) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (media_id, source_api, external_episode_id) \
             DO UPDATE SET title = EXCLUDED.title, publish_date = EXCLUDED.publish_date, \
                 duration_seconds = EXCLUDED.duration_seconds, summary = EXCLUDED.summary, \
                 updated_at = NOW() \
             RETURNING {EPISODE_COLUMNS}"
        ))
        .bind(new.media_id)
        .bind(&new.source_api)
        .bind(&new.external_episode_id)
        .bind(&new.title)
        .bind(new.publish_date)
        .bind(new.duration_seconds.map(|d| d as i32))
        .bind(&new.summary)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_episode())
    }

    pub async fn set_ai_summary(&self, episode_id: i64, ai_episode_summary: &str) -> Result<()> {
        sqlx::query("UPDATE episodes SET ai_episode_summary = $1, updated_at = NOW() WHERE episode_id = $2")
            .bind(ai_episode_summary)
            .bind(episode_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_transcript(&self, episode_id: i64, transcript: &str) -> Result<()> {
        sqlx::query("UPDATE episodes SET transcript = $1, updated_at = NOW() WHERE episode_id = $2")
            .bind(transcript)
            .bind(episode_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_themes_and_embedding(
        &self,
        episode_id: i64,
        themes: &[String],
        keywords: &[String],
        embedding: &[f32],
    ) -> Result<()> {
        sqlx::query(
            "UPDATE episodes SET themes = $1, keywords = $2, embedding = $3, updated_at = NOW() \
             WHERE episode_id = $4",
        )
        .bind(themes)
        .bind(keywords)
        .bind(serde_json::to_value(embedding).unwrap_or(Value::Array(vec![])))
        .bind(episode_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
