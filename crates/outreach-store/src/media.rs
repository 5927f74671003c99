//! Media (podcast) persistence.

use outreach_common::{HostName, Media, Result};
use serde_json::Value;
use sqlx::PgPool;

#[derive(Clone)]
pub struct MediaStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct MediaRow {
    media_id: i64,
    rss_url: Option<String>,
    external_ids: Value,
    name: String,
    description: Option<String>,
    ai_description: Option<String>,
    host_names: Value,
    contact_email: Option<String>,
    category: Option<String>,
    language: Option<String>,
    episode_count: Option<i32>,
    quality_score: Option<f32>,
    social_urls: Vec<String>,
    episode_summaries_compiled: Option<String>,
    last_enriched_timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

impl MediaRow {
    fn into_media(self) -> Media {
        let external_ids = serde_json::from_value(self.external_ids).unwrap_or_default();
        let host_names: Vec<HostName> = serde_json::from_value(self.host_names).unwrap_or_default();
        Media {
            media_id: self.media_id,
            rss_url: self.rss_url,
            external_ids,
            name: self.name,
            description: self.description,
            ai_description: self.ai_description,
            host_names,
            contact_email: self.contact_email,
            category: self.category,
            language: self.language,
            episode_count: self.episode_count.map(|c| c.max(0) as u32),
            quality_score: self.quality_score,
            social_urls: self.social_urls,
            episode_summaries_compiled: self.episode_summaries_compiled,
            last_enriched_timestamp: self.last_enriched_timestamp,
        }
    }
}

const MEDIA_COLUMNS: &str = "media_id, rss_url, external_ids, name, description, ai_description, \
     host_names, contact_email, category, language, episode_count, quality_score, \
     social_urls, episode_summaries_compiled, last_enriched_timestamp";

/// Fields a source adapter discovers up front, before enrichment runs.
pub struct NewMedia {
    pub rss_url: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub contact_email: Option<String>,
    /// The adapter that found this podcast and the id it knows it by, so
    /// later passes (episode ingestion, cross-source promotion) can look the
    /// same podcast back up without re-searching.
    pub source: Option<(String, String)>,
}

impl MediaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, media_id: i64) -> Result<Option<Media>> {
        let row = sqlx::query_as::<_, MediaRow>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media WHERE media_id = $1"
        ))
        .bind(media_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MediaRow::into_media))
    }

    /// Insert or return the existing row keyed by `rss_url`, mirroring the
    /// original upsert-by-feed-url behavior. Media without an RSS URL (e.g.
    /// discovered purely via a directory API) are always inserted fresh.
    pub async fn upsert(&self, new: NewMedia) -> Result<Media> {
        if let Some(rss_url) = &new.rss_url {
            if let Some(existing) = sqlx::query_as::<_, MediaRow>(&format!(
                "SELECT {MEDIA_COLUMNS} FROM media WHERE rss_url = $1"
            ))
            .bind(rss_url)
            .fetch_optional(&self.pool)
            .await?
            {
                let media = existing.into_media();
                if let Some((source, external_id)) = &new.source {
                    self.merge_external_id(media.media_id, source, external_id).await?;
                }
                return Ok(media);
            }
        }

        let external_ids = new
            .source
            .as_ref()
            .map(|(source, id)| serde_json::json!({ source: id }))
            .unwrap_or_else(|| serde_json::json!({}));

        let row = sqlx::query_as::<_, MediaRow>(&format!(
            "INSERT INTO media (rss_url, external_ids, name, description, category, language, contact_email) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {MEDIA_COLUMNS}"
        ))
        .bind(&new.rss_url)
        .bind(external_ids)
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.category)
        .bind(&new.language)
        .bind(&new.contact_email)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_media())
    }

    /// Records that `source` knows this media row by `external_id`, without
    /// disturbing any other adapter's id already on file. Used for
    /// cross-source promotion when a second directory's lookup resolves to
    /// a podcast already canonicalized via its RSS feed.
    pub async fn merge_external_id(&self, media_id: i64, source: &str, external_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE media SET external_ids = external_ids || jsonb_build_object($1::text, $2::text), \
             updated_at = NOW() WHERE media_id = $3",
        )
        .bind(source)
        .bind(external_id)
        .bind(media_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_enrichment(
        &self,
        media_id: i64,
        ai_description: Option<&str>,
        host_names: &[HostName],
        quality_score: Option<f32>,
        episode_count: u32,
    ) -> Result<()> {
        let host_names_confidence = host_names
            .iter()
            .map(|h| h.confidence)
            .fold(f32::INFINITY, f32::min);
        let host_names_confidence = if host_names.is_empty() { 0.0 } else { host_names_confidence };

        sqlx::query(
            "UPDATE media \
             SET ai_description = $1, host_names = $2, host_names_confidence = $3, \
                 quality_score = $4, episode_count = $5, last_enriched_timestamp = NOW(), \
                 updated_at = NOW() \
             WHERE media_id = $6",
        )
        .bind(ai_description)
        .bind(serde_json::to_value(host_names).unwrap_or(Value::Array(vec![])))
        .bind(host_names_confidence)
        .bind(quality_score)
        .bind(episode_count as i32)
        .bind(media_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Sets the AI-generated blurb without disturbing host names, quality
    /// score, or episode count — the ai-description batch pass runs behind
    /// its own lock, separately from profile enrichment.
    pub async fn set_ai_description(&self, media_id: i64, ai_description: &str) -> Result<()> {
        sqlx::query("UPDATE media SET ai_description = $1, updated_at = NOW() WHERE media_id = $2")
            .bind(ai_description)
            .bind(media_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Recompiles `episode_summaries_compiled` from every episode's summary,
    /// newest first, separated by a blank-line rule.
    pub async fn recompile_episode_summaries(&self, media_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "WITH compiled AS ( \
                 SELECT media_id, string_agg( \
                     COALESCE(ai_episode_summary, summary, ''), \
                     E'\n\n---\n\n' ORDER BY publish_date DESC NULLS LAST \
                 ) AS text \
                 FROM episodes \
                 WHERE media_id = $1 AND (ai_episode_summary IS NOT NULL OR summary IS NOT NULL) \
                 GROUP BY media_id \
             ) \
             UPDATE media m SET episode_summaries_compiled = compiled.text, updated_at = NOW() \
             FROM compiled WHERE m.media_id = compiled.media_id",
        )
        .bind(media_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Recompiles `episode_summaries_compiled` for every media row with at
    /// least one summarized episode but no compiled text yet — catches rows
    /// left behind when a crash landed between an episode summary write and
    /// the compile step. Run by the health checker, not the enrichment path.
    pub async fn recompile_all_missing_summaries(&self) -> Result<u64> {
        let result = sqlx::query(
            "WITH compiled AS ( \
                 SELECT e.media_id, string_agg( \
                     COALESCE(e.ai_episode_summary, e.summary, ''), \
                     E'\n\n---\n\n' ORDER BY e.publish_date DESC NULLS LAST \
                 ) AS text \
                 FROM episodes e \
                 WHERE e.ai_episode_summary IS NOT NULL OR e.summary IS NOT NULL \
                 GROUP BY e.media_id \
             ) \
             UPDATE media m SET episode_summaries_compiled = compiled.text, updated_at = NOW() \
             FROM compiled \
             WHERE m.media_id = compiled.media_id AND m.episode_summaries_compiled IS NULL",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
