//! In-memory adapter for exercising the discovery fetcher and vetting agent
//! without network access.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::traits::{RawEpisode, RawPodcast, SearchPage, SearchParams, SourceAdapter};

#[derive(Default)]
pub struct MockAdapter {
    pub name: &'static str,
    by_keyword: Mutex<HashMap<String, Vec<RawPodcast>>>,
    by_rss: Mutex<HashMap<String, RawPodcast>>,
    by_itunes_id: Mutex<HashMap<i64, RawPodcast>>,
    episodes: Mutex<HashMap<String, Vec<RawEpisode>>>,
}

impl MockAdapter {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    pub fn seed_search(&self, keyword: &str, podcasts: Vec<RawPodcast>) {
        self.by_keyword
            .lock()
            .unwrap()
            .insert(keyword.to_string(), podcasts);
    }

    pub fn seed_rss(&self, rss_url: &str, podcast: RawPodcast) {
        self.by_rss.lock().unwrap().insert(rss_url.to_string(), podcast);
    }

    pub fn seed_itunes_id(&self, itunes_id: i64, podcast: RawPodcast) {
        self.by_itunes_id.lock().unwrap().insert(itunes_id, podcast);
    }

    pub fn seed_episodes(&self, external_podcast_id: &str, episodes: Vec<RawEpisode>) {
        self.episodes
            .lock()
            .unwrap()
            .insert(external_podcast_id.to_string(), episodes);
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn search(
        &self,
        keyword: &str,
        _params: &SearchParams,
    ) -> Result<SearchPage, AdapterError> {
        let results = self
            .by_keyword
            .lock()
            .unwrap()
            .get(keyword)
            .cloned()
            .unwrap_or_default();
        Ok(SearchPage {
            results,
            next_page: None,
        })
    }

    async fn lookup_by_rss(&self, rss_url: &str) -> Result<Option<RawPodcast>, AdapterError> {
        Ok(self.by_rss.lock().unwrap().get(rss_url).cloned())
    }

    async fn lookup_by_itunes_id(&self, itunes_id: i64) -> Result<Option<RawPodcast>, AdapterError> {
        Ok(self.by_itunes_id.lock().unwrap().get(&itunes_id).cloned())
    }

    async fn list_episodes(
        &self,
        external_podcast_id: &str,
        limit: u32,
    ) -> Result<Vec<RawEpisode>, AdapterError> {
        Ok(self
            .episodes
            .lock()
            .unwrap()
            .get(external_podcast_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(limit as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn podcast(id: &str) -> RawPodcast {
        RawPodcast {
            external_id: id.to_string(),
            source: "mock".to_string(),
            rss_url: Some(format!("https://example.com/{id}.xml")),
            itunes_id: None,
            name: format!("Podcast {id}"),
            description: None,
            contact_email: None,
            category: None,
            language: None,
            episode_count: None,
            social_urls: Vec::new(),
        }
    }

    #[tokio::test]
    async fn search_returns_seeded_results() {
        let adapter = MockAdapter::new("mock");
        adapter.seed_search("rust", vec![podcast("1"), podcast("2")]);
        let page = adapter.search("rust", &SearchParams::default()).await.unwrap();
        assert_eq!(page.results.len(), 2);
    }

    #[tokio::test]
    async fn unseeded_keyword_returns_empty() {
        let adapter = MockAdapter::new("mock");
        let page = adapter.search("nothing", &SearchParams::default()).await.unwrap();
        assert!(page.results.is_empty());
    }

    #[tokio::test]
    async fn rss_lookup_roundtrips() {
        let adapter = MockAdapter::new("mock");
        adapter.seed_rss("https://example.com/1.xml", podcast("1"));
        let found = adapter
            .lookup_by_rss("https://example.com/1.xml")
            .await
            .unwrap();
        assert_eq!(found.unwrap().external_id, "1");
    }
}
