//! Podscan.fm-shaped directory adapter. Authenticates via `Authorization:
//! Bearer <key>`; RSS and iTunes-ID lookups hit dedicated `/search/by/...`
//! endpoints rather than a shared batch endpoint, and only a single
//! unambiguous match is accepted — more than one hit is treated the same
//! as zero.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::AdapterError;
use crate::traits::{RawEpisode, RawPodcast, SearchPage, SearchParams, SourceAdapter};

const BASE_URL: &str = "https://podscan.fm/api/v1";
const ADAPTER_TIMEOUT: Duration = Duration::from_secs(30);

pub struct PodscanAdapter {
    client: reqwest::Client,
    api_key: String,
}

impl PodscanAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(ADAPTER_TIMEOUT)
                .build()
                .expect("failed to build podscan HTTP client"),
            api_key,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{BASE_URL}/{path}"))
            .bearer_auth(&self.api_key)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    podcasts: Vec<PodscanPodcast>,
    #[serde(default)]
    page: u32,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct PodcastList {
    podcasts: Vec<PodscanPodcast>,
}

#[derive(Debug, Deserialize)]
struct SinglePodcast {
    podcast: PodscanPodcast,
}

#[derive(Debug, Deserialize)]
struct PodscanPodcast {
    podcast_id: String,
    rss_url: Option<String>,
    podcast_itunes_id: Option<i64>,
    podcast_name: Option<String>,
    podcast_description: Option<String>,
    podcast_email: Option<String>,
    podcast_language: Option<String>,
    episode_count: Option<u32>,
    #[serde(default)]
    social_links: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodesResponse {
    episodes: Vec<PodscanEpisode>,
}

#[derive(Debug, Deserialize)]
struct PodscanEpisode {
    episode_id: String,
    episode_title: Option<String>,
    posted_at: Option<DateTime<Utc>>,
    episode_audio_url: Option<String>,
    episode_description: Option<String>,
    episode_transcript: Option<String>,
}

fn podcast_to_raw(p: PodscanPodcast) -> RawPodcast {
    RawPodcast {
        external_id: p.podcast_id,
        source: "podscan".to_string(),
        rss_url: p.rss_url,
        itunes_id: p.podcast_itunes_id,
        name: p.podcast_name.unwrap_or_default(),
        description: p.podcast_description,
        contact_email: p.podcast_email,
        category: None,
        language: p.podcast_language,
        episode_count: p.episode_count,
        social_urls: p.social_links,
    }
}

fn episode_to_raw(e: PodscanEpisode) -> RawEpisode {
    RawEpisode {
        external_episode_id: e.episode_id,
        title: e.episode_title.unwrap_or_default(),
        publish_date: e.posted_at,
        duration_seconds: None,
        summary: e.episode_description,
        audio_url: e.episode_audio_url,
        transcript: e.episode_transcript,
    }
}

#[async_trait]
impl SourceAdapter for PodscanAdapter {
    fn name(&self) -> &'static str {
        "podscan"
    }

    async fn search(
        &self,
        keyword: &str,
        params: &SearchParams,
    ) -> Result<SearchPage, AdapterError> {
        let mut req = self
            .request(reqwest::Method::GET, "podcasts/search")
            .query(&[
                ("query", keyword.to_string()),
                ("per_page", params.page_size.max(1).to_string()),
                ("page", (params.page + 1).to_string()),
                ("language", "en".to_string()),
                (
                    "min_episode_count",
                    params.min_episode_count.unwrap_or(10).to_string(),
                ),
                ("has_guests", params.interviews_only.to_string()),
            ]);
        if let Some(categories) = &params.category_ids {
            req = req.query(&[("category_ids", categories.join(","))]);
        }

        let resp = req.send().await?.error_for_status()?;
        let body: SearchResponse = resp.json().await.map_err(|e| {
            AdapterError::Transient(format!("failed to decode podscan search: {e}"))
        })?;

        Ok(SearchPage {
            results: body.podcasts.into_iter().map(podcast_to_raw).collect(),
            next_page: body.has_more.then_some(body.page + 1),
        })
    }

    async fn lookup_by_rss(&self, rss_url: &str) -> Result<Option<RawPodcast>, AdapterError> {
        let resp = self
            .request(reqwest::Method::GET, "podcasts/search/by/RSS")
            .query(&[("rss_feed", rss_url)])
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        let body: PodcastList = resp.json().await.map_err(|e| {
            AdapterError::Transient(format!("failed to decode podscan RSS lookup: {e}"))
        })?;
        Ok(match body.podcasts.len() {
            1 => Some(podcast_to_raw(body.podcasts.into_iter().next().unwrap())),
            _ => None,
        })
    }

    async fn lookup_by_itunes_id(&self, itunes_id: i64) -> Result<Option<RawPodcast>, AdapterError> {
        let resp = self
            .request(reqwest::Method::GET, "podcasts/search/by/itunesid")
            .query(&[("itunes_id", itunes_id.to_string())])
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        let body: SinglePodcast = match resp.json().await {
            Ok(b) => b,
            Err(_) => return Ok(None),
        };
        if body.podcast.podcast_itunes_id == Some(itunes_id) {
            Ok(Some(podcast_to_raw(body.podcast)))
        } else {
            Ok(None)
        }
    }

    async fn list_episodes(
        &self,
        external_podcast_id: &str,
        limit: u32,
    ) -> Result<Vec<RawEpisode>, AdapterError> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("podcasts/{external_podcast_id}/episodes"),
            )
            .query(&[
                ("order_by", "posted_at".to_string()),
                ("order_dir", "desc".to_string()),
                ("per_page", limit.to_string()),
            ])
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let resp = resp.error_for_status()?;
        let body: EpisodesResponse = resp.json().await.map_err(|e| {
            AdapterError::Transient(format!("failed to decode podscan episodes: {e}"))
        })?;
        Ok(body.episodes.into_iter().map(episode_to_raw).collect())
    }
}
