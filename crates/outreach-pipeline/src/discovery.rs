//! Discovery Fetcher (C3): turns a campaign's keywords into new
//! `campaign_media_discoveries` rows, growing the shared media inventory
//! along the way even when the per-run discovery budget is small.

use std::collections::HashSet;
use std::sync::Arc;

use outreach_adapters::{
    retry_with_backoff, AdapterError, RawPodcast, RssEmailDiscovery, SearchParams, SourceAdapter,
};
use outreach_ai::{extract, LlmClient};
use outreach_common::{OutreachError, Result};
use outreach_events::{DomainEvent, EventBus, EventKind};
use outreach_store::{MediaStore, NewEpisode, Store};
use schemars::JsonSchema;
use serde::Deserialize;
use uuid::Uuid;

const MAX_PAGES_PER_KEYWORD: u32 = 3;
const MAX_SEARCH_ATTEMPTS: u32 = 5;
/// Default per-request rate-budget delay when a fetcher isn't constructed
/// with an explicit one (tests, mostly) — matches spec.md §5's ~1.2s
/// inter-request figure.
const DEFAULT_INTER_REQUEST_DELAY_MS: u64 = 1200;
const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Deserialize, JsonSchema)]
struct TaxonomyMapping {
    /// Comma-joined taxonomy / genre / category ids the adapter understands
    /// for this keyword. Empty when the keyword doesn't map cleanly.
    taxonomy_ids: Vec<String>,
}

/// One media discovered this run, in first-keyword-wins order.
struct FoundMedia {
    media_id: i64,
    keyword: String,
}

pub struct DiscoveryFetcher {
    store: Store,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    rss: RssEmailDiscovery,
    llm: Arc<dyn LlmClient>,
    events: EventBus,
    /// Rate-budget sleep between consecutive page requests to the same
    /// adapter. Doubled between keywords, per spec.md §5 ("larger between
    /// keywords").
    inter_request_delay: std::time::Duration,
    /// Page size requested from each adapter per search call.
    page_size: u32,
}

impl DiscoveryFetcher {
    pub fn new(
        store: Store,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        llm: Arc<dyn LlmClient>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            adapters,
            rss: RssEmailDiscovery::new(),
            llm,
            events,
            inter_request_delay: std::time::Duration::from_millis(DEFAULT_INTER_REQUEST_DELAY_MS),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Overrides the default rate-budget delay, e.g. from
    /// `Config::adapter_inter_request_delay_ms`.
    pub fn with_inter_request_delay(mut self, delay: std::time::Duration) -> Self {
        self.inter_request_delay = delay;
        self
    }

    /// Overrides the default per-request page size, e.g. from
    /// `Config::adapter_page_size`.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Runs discovery for one campaign up to `max_discoveries` new rows.
    /// Returns the number of discoveries created.
    pub async fn run(&self, campaign_id: Uuid, max_discoveries: u32) -> Result<u32> {
        let campaign = self
            .store
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or_else(|| OutreachError::DataMissing(format!("campaign {campaign_id} not found")))?;

        if !campaign.has_ideal_description() {
            return Err(OutreachError::DataMissing(
                "campaign has no ideal_podcast_description".to_string(),
            ));
        }

        let mut handled_ids: HashSet<String> = HashSet::new();
        let mut found: Vec<FoundMedia> = Vec::new();
        let mut seen_media: HashSet<i64> = HashSet::new();

        let mut keywords = campaign.keywords.iter().peekable();
        while let Some(keyword) = keywords.next() {
            for adapter in &self.adapters {
                let params = match self.taxonomy_params(keyword, adapter.as_ref()).await {
                    Some(p) => p,
                    None => continue,
                };

                let mut page = 0u32;
                let mut first_request = true;
                loop {
                    if !first_request {
                        tokio::time::sleep(self.inter_request_delay).await;
                    }
                    first_request = false;

                    let search_params = SearchParams {
                        page,
                        page_size: self.page_size,
                        ..params.clone()
                    };
                    let result = retry_with_backoff(MAX_SEARCH_ATTEMPTS, || {
                        adapter.search(keyword, &search_params)
                    })
                    .await;
                    let page_result = match result {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::warn!(adapter = adapter.name(), keyword, error = %e, "adapter search failed, skipping keyword for this adapter");
                            break;
                        }
                    };

                    for raw in page_result.results {
                        self.process_raw_podcast(
                            raw,
                            adapter.as_ref(),
                            keyword,
                            &mut handled_ids,
                            &mut seen_media,
                            &mut found,
                        )
                        .await;
                    }

                    match page_result.next_page {
                        Some(next) if page + 1 < MAX_PAGES_PER_KEYWORD => page = next,
                        _ => break,
                    }
                }
            }
            // A larger pause between keywords than between pages of the same
            // keyword, so the adapter's rate budget gets breathing room at
            // the point where we're about to start a fresh burst of requests.
            // Skipped after the last keyword — nothing left to pace.
            if keywords.peek().is_some() {
                tokio::time::sleep(self.inter_request_delay * 2).await;
            }
        }

        let mut created = 0u32;
        for item in found {
            if created >= max_discoveries {
                break;
            }

            // Only a genuinely new (campaign, media) pair counts against the
            // client's discovery quota; re-surfacing an already-known pair
            // (e.g. a second keyword matching the same show) must not burn
            // budget the pipeline already spent on it.
            let existing = self
                .store
                .discoveries
                .get_by_campaign_and_media(campaign_id, item.media_id)
                .await?;
            if existing.is_some() {
                continue;
            }

            let allowed = self
                .store
                .client_profiles
                .try_increment_discovery_counts(campaign.person_id, 1)
                .await?;
            if !allowed {
                break;
            }

            let discovery = self
                .store
                .discoveries
                .create_or_get(campaign_id, item.media_id, &item.keyword)
                .await?;

            created += 1;
            self.events
                .publish(DomainEvent::new(
                    EventKind::MediaDiscovered,
                    "campaign_media_discovery",
                    discovery.id.to_string(),
                    serde_json::json!({
                        "campaign_id": campaign_id,
                        "media_id": item.media_id,
                        "keyword": item.keyword,
                    }),
                ))
                .await;
        }

        Ok(created)
    }

    /// Asks the LLM to map a keyword onto an adapter's own taxonomy ids.
    /// Returns `None` if the mapping came back empty (adapter skipped for
    /// this keyword).
    async fn taxonomy_params(
        &self,
        keyword: &str,
        adapter: &dyn SourceAdapter,
    ) -> Option<SearchParams> {
        let system = "You map outreach search keywords onto a podcast directory's category \
                      or genre taxonomy. Respond only with ids the directory itself uses.";
        let user = format!(
            "Directory: {}\nKeyword: \"{keyword}\"\nReturn the taxonomy ids this keyword maps \
             to, or an empty list if none apply well.",
            adapter.name()
        );

        let mapping: TaxonomyMapping = match extract(self.llm.as_ref(), system, &user).await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(adapter = adapter.name(), keyword, error = %e, "taxonomy mapping failed");
                return None;
            }
        };

        if mapping.taxonomy_ids.is_empty() {
            return None;
        }

        Some(SearchParams {
            category_ids: Some(mapping.taxonomy_ids.clone()),
            genre_ids: Some(mapping.taxonomy_ids),
            page: 0,
            page_size: 20,
            min_episode_count: Some(10),
            interviews_only: true,
        })
    }

    async fn process_raw_podcast(
        &self,
        mut raw: RawPodcast,
        adapter: &dyn SourceAdapter,
        keyword: &str,
        handled_ids: &mut HashSet<String>,
        seen_media: &mut HashSet<i64>,
        found: &mut Vec<FoundMedia>,
    ) {
        let dedup_key = raw
            .rss_url
            .clone()
            .unwrap_or_else(|| format!("{}:{}", raw.source, raw.external_id));
        if !handled_ids.insert(dedup_key) {
            return;
        }

        if raw.contact_email.is_none() {
            if let Some(rss_url) = &raw.rss_url {
                raw.contact_email = self.rss.discover(rss_url).await;
            }
        }
        if raw.contact_email.is_none() {
            return;
        }

        if raw.rss_url.is_none() {
            if let Some(itunes_id) = raw.itunes_id {
                for other in &self.adapters {
                    if other.name() == adapter.name() {
                        continue;
                    }
                    if let Ok(Some(found_podcast)) = other.lookup_by_itunes_id(itunes_id).await {
                        if found_podcast.rss_url.is_some() {
                            raw.rss_url = found_podcast.rss_url;
                            break;
                        }
                    }
                }
            }
        }

        let media = match self
            .store
            .media
            .upsert(outreach_store::NewMedia {
                rss_url: raw.rss_url.clone(),
                name: raw.name.clone(),
                description: raw.description.clone(),
                category: raw.category.clone(),
                language: raw.language.clone(),
                contact_email: raw.contact_email.clone(),
                source: Some((adapter.name().to_string(), raw.external_id.clone())),
            })
            .await
        {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "media upsert failed");
                return;
            }
        };

        if seen_media.insert(media.media_id) {
            found.push(FoundMedia {
                media_id: media.media_id,
                keyword: keyword.to_string(),
            });
        }

        self.schedule_episode_fetch(media.media_id, raw, adapter.name().to_string());
    }

    /// Fetches the adapter's latest episodes for a newly-seen media row in
    /// the background. Failure here never aborts discovery — the
    /// enrichment orchestrator will simply find zero episodes and retry
    /// later passes.
    fn schedule_episode_fetch(&self, media_id: i64, raw: RawPodcast, adapter_name: String) {
        let media_store: MediaStore = self.store.media.clone();
        let episodes = self.store.episodes.clone();
        let adapters = self.adapters.clone();
        tokio::spawn(async move {
            let count = episodes.count_for_media(media_id).await.unwrap_or(1);
            if count > 0 {
                return;
            }
            let Some(adapter) = adapters.iter().find(|a| a.name() == adapter_name) else {
                return;
            };
            let raw_episodes = match adapter.list_episodes(&raw.external_id, 5).await {
                Ok(e) => e,
                Err(AdapterError::NotFound) => return,
                Err(e) => {
                    tracing::warn!(media_id, error = %e, "background episode fetch failed");
                    return;
                }
            };
            for ep in raw_episodes {
                let _ = episodes
                    .upsert(NewEpisode {
                        media_id,
                        source_api: adapter_name.clone(),
                        external_episode_id: ep.external_episode_id,
                        title: ep.title,
                        publish_date: ep.publish_date,
                        duration_seconds: ep.duration_seconds,
                        summary: ep.summary,
                    })
                    .await;
            }
            let _ = media_store.recompile_episode_summaries(media_id).await;
        });
    }
}
