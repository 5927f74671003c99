//! Uniform search/lookup surface over external podcast directories. Every
//! adapter implementation returns the same raw shapes so the discovery
//! fetcher never special-cases a provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub genre_ids: Option<Vec<String>>,
    pub category_ids: Option<Vec<String>>,
    pub page: u32,
    pub page_size: u32,
    pub min_episode_count: Option<u32>,
    pub interviews_only: bool,
}

/// A podcast as returned by a directory search or lookup, before
/// canonicalization against the media table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPodcast {
    pub external_id: String,
    pub source: String,
    pub rss_url: Option<String>,
    pub itunes_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub contact_email: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub episode_count: Option<u32>,
    pub social_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEpisode {
    pub external_episode_id: String,
    pub title: String,
    pub publish_date: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u32>,
    pub summary: Option<String>,
    pub audio_url: Option<String>,
    pub transcript: Option<String>,
}

pub struct SearchPage {
    pub results: Vec<RawPodcast>,
    /// Opaque pagination token; `None` means this was the last page.
    pub next_page: Option<u32>,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable adapter identifier used as `Media.external_ids`'s key and as
    /// `Episode.source_api`.
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        keyword: &str,
        params: &SearchParams,
    ) -> Result<SearchPage, AdapterError>;

    async fn lookup_by_rss(&self, rss_url: &str) -> Result<Option<RawPodcast>, AdapterError>;

    async fn lookup_by_itunes_id(&self, itunes_id: i64) -> Result<Option<RawPodcast>, AdapterError>;

    async fn list_episodes(
        &self,
        external_podcast_id: &str,
        limit: u32,
    ) -> Result<Vec<RawEpisode>, AdapterError>;
}
