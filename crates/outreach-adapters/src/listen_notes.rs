//! ListenNotes-shaped directory adapter. Authenticates via the
//! `X-ListenAPI-Key` header, searches through `GET /search`, and resolves
//! exact matches (RSS or iTunes ID) through the batch `POST /podcasts`
//! endpoint, which only returns a usable result when it resolves to exactly
//! one podcast.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AdapterError;
use crate::traits::{RawEpisode, RawPodcast, SearchPage, SearchParams, SourceAdapter};

const BASE_URL: &str = "https://listen-api.listennotes.com/api/v2";
const ADAPTER_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ListenNotesAdapter {
    client: reqwest::Client,
    api_key: String,
}

impl ListenNotesAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(ADAPTER_TIMEOUT)
                .build()
                .expect("failed to build listen_notes HTTP client"),
            api_key,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{BASE_URL}/{path}"))
            .header("X-ListenAPI-Key", &self.api_key)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
    next_offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: String,
    rss: Option<String>,
    itunes_id: Option<i64>,
    title_original: Option<String>,
    description_original: Option<String>,
    email: Option<String>,
    genre_ids: Option<Vec<i64>>,
    language: Option<String>,
    total_episodes: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    podcasts: Vec<BatchPodcast>,
}

#[derive(Debug, Deserialize)]
struct BatchPodcast {
    id: String,
    rss: Option<String>,
    itunes_id: Option<i64>,
    title: Option<String>,
    description: Option<String>,
    email: Option<String>,
    language: Option<String>,
    total_episodes: Option<u32>,
    episodes: Option<Vec<BatchEpisode>>,
}

#[derive(Debug, Deserialize)]
struct BatchEpisode {
    id: String,
    title: Option<String>,
    pub_date_ms: Option<i64>,
    audio_length_sec: Option<u32>,
    description: Option<String>,
    audio: Option<String>,
}

fn search_result_to_raw(r: SearchResult) -> RawPodcast {
    RawPodcast {
        external_id: r.id,
        source: "listen_notes".to_string(),
        rss_url: r.rss,
        itunes_id: r.itunes_id,
        name: r.title_original.unwrap_or_default(),
        description: r.description_original,
        contact_email: r.email,
        category: r.genre_ids.map(|ids| {
            ids.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",")
        }),
        language: r.language,
        episode_count: r.total_episodes,
        social_urls: Vec::new(),
    }
}

fn batch_podcast_to_raw(p: BatchPodcast) -> RawPodcast {
    RawPodcast {
        external_id: p.id,
        source: "listen_notes".to_string(),
        rss_url: p.rss,
        itunes_id: p.itunes_id,
        name: p.title.unwrap_or_default(),
        description: p.description,
        contact_email: p.email,
        category: None,
        language: p.language,
        episode_count: p.total_episodes,
        social_urls: Vec::new(),
    }
}

fn batch_episode_to_raw(e: BatchEpisode) -> RawEpisode {
    use chrono::TimeZone;
    RawEpisode {
        external_episode_id: e.id,
        title: e.title.unwrap_or_default(),
        publish_date: e
            .pub_date_ms
            .and_then(|ms| chrono::Utc.timestamp_millis_opt(ms).single()),
        duration_seconds: e.audio_length_sec,
        summary: e.description,
        audio_url: e.audio,
        transcript: None,
    }
}

#[async_trait]
impl SourceAdapter for ListenNotesAdapter {
    fn name(&self) -> &'static str {
        "listen_notes"
    }

    async fn search(
        &self,
        keyword: &str,
        params: &SearchParams,
    ) -> Result<SearchPage, AdapterError> {
        let mut req = self
            .request(reqwest::Method::GET, "search")
            .query(&[
                ("q", keyword.to_string()),
                ("type", "podcast".to_string()),
                ("sort_by_date", "1".to_string()),
                ("language", "English".to_string()),
                ("region", "us".to_string()),
                (
                    "episode_count_min",
                    params.min_episode_count.unwrap_or(10).to_string(),
                ),
                (
                    "interviews_only",
                    if params.interviews_only { "1" } else { "0" }.to_string(),
                ),
                ("offset", (params.page * params.page_size.max(1)).to_string()),
                ("page_size", params.page_size.max(1).to_string()),
            ]);
        if let Some(genres) = &params.genre_ids {
            req = req.query(&[("genre_ids", genres.join(","))]);
        }

        let resp = req.send().await?.error_for_status()?;
        let body: SearchResponse = resp.json().await.map_err(|e| {
            AdapterError::Transient(format!("failed to decode listen_notes search: {e}"))
        })?;

        Ok(SearchPage {
            results: body.results.into_iter().map(search_result_to_raw).collect(),
            next_page: body.next_offset.map(|_| params.page + 1),
        })
    }

    async fn lookup_by_rss(&self, rss_url: &str) -> Result<Option<RawPodcast>, AdapterError> {
        let resp = self
            .request(reqwest::Method::POST, "podcasts")
            .form(&[("rsses", rss_url)])
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        let body: BatchResponse = resp.json().await.map_err(|e| {
            AdapterError::Transient(format!("failed to decode listen_notes batch: {e}"))
        })?;
        Ok(match body.podcasts.len() {
            1 => Some(batch_podcast_to_raw(body.podcasts.into_iter().next().unwrap())),
            _ => None,
        })
    }

    async fn lookup_by_itunes_id(&self, itunes_id: i64) -> Result<Option<RawPodcast>, AdapterError> {
        let resp = self
            .request(reqwest::Method::POST, "podcasts")
            .form(&[("itunes_ids", itunes_id.to_string())])
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        let body: BatchResponse = resp.json().await.map_err(|e| {
            AdapterError::Transient(format!("failed to decode listen_notes batch: {e}"))
        })?;
        match body.podcasts.len() {
            1 => {
                let podcast = body.podcasts.into_iter().next().unwrap();
                if podcast.itunes_id == Some(itunes_id) {
                    Ok(Some(batch_podcast_to_raw(podcast)))
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
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
                &format!("podcasts/{external_podcast_id}"),
            )
            .query(&[("sort", "recent_first")])
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let resp = resp.error_for_status()?;
        let body: BatchPodcast = resp.json().await.map_err(|e| {
            AdapterError::Transient(format!("failed to decode listen_notes podcast: {e}"))
        })?;
        let episodes = body.episodes.unwrap_or_default();
        Ok(episodes
            .into_iter()
            .take(limit as usize)
            .map(batch_episode_to_raw)
            .collect())
    }
}
