//! Enrichment Orchestrator (C4): fills in everything the vetting agent needs
//! about a discovered podcast — recent episodes, a handful of transcripts,
//! host names, and a short AI-written description — before a discovery is
//! eligible for vetting.

use std::sync::Arc;

use outreach_adapters::SourceAdapter;
use outreach_ai::{extract, LlmClient};
use outreach_common::{HostName, Media, OutreachError, Result};
use outreach_events::{DomainEvent, EventBus, EventKind};
use outreach_store::{NewEpisode, Store};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::transcription::Transcriber;

/// Episodes considered per media row when compiling summaries.
const TOP_K_EPISODES: i64 = 5;
/// Of those, at most this many get transcribed per pass — transcription is
/// the slow, costly step.
const MAX_TRANSCRIPTIONS: usize = 3;
/// Below this many transcribed episodes the quality score is capped low;
/// there just isn't enough signal yet.
const MIN_TRANSCRIBED_FOR_QUALITY: usize = 3;

/// Quality-score component weights: transcript depth dominates since it's
/// the richest signal, host-name confidence and audience reach (approximated
/// by how many social channels the show has linked) contribute the rest.
const QUALITY_WEIGHT_DEPTH: f32 = 0.6;
const QUALITY_WEIGHT_HOST_CONFIDENCE: f32 = 0.25;
const QUALITY_WEIGHT_AUDIENCE_SIGNAL: f32 = 0.15;
/// Social links at or above this count count as full audience-signal
/// availability; more links past this point don't add further confidence.
const AUDIENCE_SIGNAL_SATURATION: f32 = 3.0;

#[derive(Debug, Deserialize, JsonSchema)]
struct HostExtraction {
    hosts: Vec<HostName>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
struct EpisodeAnalysis {
    themes: Vec<String>,
    keywords: Vec<String>,
}

pub struct EnrichmentOrchestrator {
    store: Store,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    transcriber: Arc<dyn Transcriber>,
    llm: Arc<dyn LlmClient>,
    events: EventBus,
}

impl EnrichmentOrchestrator {
    pub fn new(
        store: Store,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        transcriber: Arc<dyn Transcriber>,
        llm: Arc<dyn LlmClient>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            adapters,
            transcriber,
            llm,
            events,
        }
    }

    /// Runs full profile enrichment (episodes, transcripts, host names,
    /// quality score) for up to `limit` discoveries. Returns how many
    /// completed successfully.
    pub async fn run_profile_enrichment(&self, limit: i64) -> Result<u32> {
        let batch = self.store.discoveries.needing_enrichment(limit).await?;
        let mut completed = 0u32;

        for discovery in batch {
            self.store
                .discoveries
                .update_enrichment_status(
                    discovery.id,
                    outreach_common::StageStatus::InProgress,
                    None,
                )
                .await?;

            match self.enrich_one(discovery.media_id).await {
                Ok(()) => {
                    self.store
                        .discoveries
                        .update_enrichment_status(
                            discovery.id,
                            outreach_common::StageStatus::Completed,
                            None,
                        )
                        .await?;
                    self.events
                        .publish(DomainEvent::new(
                            EventKind::EnrichmentCompleted,
                            "campaign_media_discovery",
                            discovery.id.to_string(),
                            serde_json::json!({
                                "campaign_id": discovery.campaign_id,
                                "media_id": discovery.media_id,
                            }),
                        ))
                        .await;
                    completed += 1;
                }
                Err(e) => {
                    tracing::warn!(discovery_id = discovery.id, error = %e, "enrichment failed");
                    self.store
                        .discoveries
                        .update_enrichment_status(
                            discovery.id,
                            outreach_common::StageStatus::Failed,
                            Some(&e.to_string()),
                        )
                        .await?;
                }
            }
        }

        Ok(completed)
    }

    async fn enrich_one(&self, media_id: i64) -> Result<()> {
        let media = self
            .store
            .media
            .get(media_id)
            .await?
            .ok_or_else(|| OutreachError::DataMissing(format!("media {media_id} not found")))?;

        self.ingest_recent_episodes(&media).await?;
        let transcribed = self.transcribe_top_episodes(media_id).await?;
        self.store.media.recompile_episode_summaries(media_id).await?;

        let host_names = self.extract_host_names(&media).await.unwrap_or_default();
        let quality_score = self.score_quality(transcribed, &host_names, &media.social_urls);
        let episode_count = self.store.episodes.count_for_media(media_id).await?.max(0) as u32;

        self.store
            .media
            .update_enrichment(media_id, None, &host_names, quality_score, episode_count)
            .await?;
        Ok(())
    }

    /// Pulls the adapter's latest episodes for a media row that hasn't been
    /// ingested yet. A media row already carrying episodes is left alone —
    /// episode sync is the scheduler's job, not re-enrichment's.
    async fn ingest_recent_episodes(&self, media: &Media) -> Result<()> {
        if self.store.episodes.count_for_media(media.media_id).await? > 0 {
            return Ok(());
        }

        let Some((source, external_id)) = media.external_ids.iter().next() else {
            return Ok(());
        };
        let Some(adapter) = self.adapters.iter().find(|a| a.name() == source) else {
            return Ok(());
        };

        let raw_episodes = adapter
            .list_episodes(external_id, TOP_K_EPISODES as u32)
            .await
            .map_err(|e| OutreachError::TransientExternal(e.to_string()))?;

        for ep in raw_episodes {
            self.store
                .episodes
                .upsert(NewEpisode {
                    media_id: media.media_id,
                    source_api: source.clone(),
                    external_episode_id: ep.external_episode_id,
                    title: ep.title,
                    publish_date: ep.publish_date,
                    duration_seconds: ep.duration_seconds,
                    summary: ep.summary,
                })
                .await?;
        }
        Ok(())
    }

    /// Transcribes up to [`MAX_TRANSCRIPTIONS`] of the most recent episodes
    /// that don't already have a transcript. Returns the number of episodes
    /// with a transcript afterward (old or new).
    async fn transcribe_top_episodes(&self, media_id: i64) -> Result<usize> {
        let episodes = self.store.episodes.for_media(media_id).await?;
        let top: Vec<_> = episodes.into_iter().take(TOP_K_EPISODES as usize).collect();

        let already_transcribed = top.iter().filter(|e| e.transcript.is_some()).count();
        let mut newly_transcribed = 0usize;

        let Some((source, external_id)) = self
            .store
            .media
            .get(media_id)
            .await?
            .and_then(|m| m.external_ids.iter().next().map(|(s, i)| (s.clone(), i.clone())))
        else {
            return Ok(already_transcribed);
        };
        let Some(adapter) = self.adapters.iter().find(|a| a.name() == source) else {
            return Ok(already_transcribed);
        };

        let raw_episodes = adapter
            .list_episodes(&external_id, TOP_K_EPISODES as u32)
            .await
            .unwrap_or_default();

        for episode in top.iter().filter(|e| e.transcript.is_none()) {
            if newly_transcribed >= MAX_TRANSCRIPTIONS {
                break;
            }
            let Some(audio_url) = raw_episodes
                .iter()
                .find(|r| r.external_episode_id == episode.external_episode_id)
                .and_then(|r| r.audio_url.as_deref())
            else {
                continue;
            };

            match self.transcriber.transcribe(audio_url).await {
                Ok(text) => {
                    self.store.episodes.set_transcript(episode.episode_id, &text).await?;
                    let summary = self
                        .llm
                        .complete(
                            "Summarize this podcast episode transcript in two to three sentences \
                             for someone deciding whether to pitch a guest to this show.",
                            &text,
                        )
                        .await
                        .ok();
                    if let Some(summary) = &summary {
                        self.store.episodes.set_ai_summary(episode.episode_id, summary).await?;
                    }

                    let analysis = self.analyze_episode(&episode.title, &text).await.unwrap_or_default();
                    // Embed the summary when we have one — shorter and more semantically
                    // dense than the raw transcript, and cheaper to embed. Falls back to
                    // the transcript itself if summarization failed.
                    let embed_source = summary.as_deref().unwrap_or(&text);
                    let embedding = crate::matching::embed_text(self.llm.as_ref(), embed_source)
                        .await
                        .unwrap_or_default();
                    self.store
                        .episodes
                        .set_themes_and_embedding(
                            episode.episode_id,
                            &analysis.themes,
                            &analysis.keywords,
                            &embedding,
                        )
                        .await?;

                    newly_transcribed += 1;
                }
                Err(e) => {
                    tracing::warn!(episode_id = episode.episode_id, error = %e, "transcription failed");
                }
            }
        }

        Ok(already_transcribed + newly_transcribed)
    }

    /// Schema-bound extraction of the themes and keywords an episode covers,
    /// from its transcript — persisted via `EpisodeStore::set_themes_and_embedding`
    /// so the vetting agent's evidence aggregation (`vetting::build_evidence`) has
    /// real per-episode signal to fold over instead of empty arrays.
    async fn analyze_episode(&self, title: &str, transcript: &str) -> Option<EpisodeAnalysis> {
        let system = "You identify the themes and keywords a podcast episode covers from its \
                      transcript, for matching PR pitches to relevant shows. Keep each list \
                      short (at most 8 items) and specific to the episode's actual content.";
        let user = format!("Episode: {title}\nTranscript:\n{transcript}");
        extract(self.llm.as_ref(), system, &user).await.ok()
    }

    async fn extract_host_names(&self, media: &Media) -> Option<Vec<HostName>> {
        let description = media.description.as_deref().unwrap_or("");
        let summaries = media.episode_summaries_compiled.as_deref().unwrap_or("");
        if description.is_empty() && summaries.is_empty() {
            return None;
        }

        let system = "You identify the named hosts of a podcast from its description and \
                      episode summaries. Only name people clearly presented as hosts, not \
                      guests. Give each a confidence between 0 and 1.";
        let user = format!(
            "Podcast: {}\nDescription: {description}\nEpisode summaries:\n{summaries}",
            media.name
        );

        let extraction: HostExtraction = extract(self.llm.as_ref(), system, &user).await.ok()?;
        Some(extraction.hosts)
    }

    /// Weighted blend of transcript depth, host-name confidence, and
    /// audience-signal availability. `None` below
    /// [`MIN_TRANSCRIBED_FOR_QUALITY`] transcribed episodes — there isn't
    /// enough evidence yet to assign a score at all, per spec.
    fn score_quality(&self, transcribed_count: usize, host_names: &[HostName], social_urls: &[String]) -> Option<f32> {
        if transcribed_count < MIN_TRANSCRIBED_FOR_QUALITY {
            return None;
        }
        let depth = (transcribed_count as f32 / TOP_K_EPISODES as f32).min(1.0);
        let host_confidence = if host_names.is_empty() {
            0.0
        } else {
            host_names.iter().map(|h| h.confidence).sum::<f32>() / host_names.len() as f32
        };
        let audience_signal = (social_urls.len() as f32 / AUDIENCE_SIGNAL_SATURATION).min(1.0);

        let score = QUALITY_WEIGHT_DEPTH * depth
            + QUALITY_WEIGHT_HOST_CONFIDENCE * host_confidence
            + QUALITY_WEIGHT_AUDIENCE_SIGNAL * audience_signal;

        Some(score.min(1.0))
    }

    /// Generates and stores the AI description for a batch of discoveries
    /// whose profile enrichment has completed but still lack one, under the
    /// dedicated `acquire_ai_description_batch` lock so two schedulers
    /// ticking at once never describe the same podcast twice.
    pub async fn run_ai_description_batch(&self, limit: i64) -> Result<u32> {
        let batch = self.store.discoveries.acquire_ai_description_batch(limit).await?;
        let mut written = 0u32;

        for discovery in batch {
            let result = self.write_ai_description(discovery.media_id).await;
            match result {
                Ok(()) => written += 1,
                Err(e) => {
                    tracing::warn!(discovery_id = discovery.id, error = %e, "ai description failed");
                }
            }
            self.store
                .discoveries
                .release_ai_description_lock(discovery.id)
                .await?;
        }

        Ok(written)
    }

    async fn write_ai_description(&self, media_id: i64) -> Result<()> {
        let media = self
            .store
            .media
            .get(media_id)
            .await?
            .ok_or_else(|| OutreachError::DataMissing(format!("media {media_id} not found")))?;

        let system = "Write a concise description of this podcast for a PR pitch, 200 words \
                      or fewer. Focus on the show's format, audience, and the kind of guest \
                      it features.";
        let user = format!(
            "Podcast: {}\nDescription: {}\nEpisode summaries:\n{}",
            media.name,
            media.description.as_deref().unwrap_or(""),
            media.episode_summaries_compiled.as_deref().unwrap_or(""),
        );

        let description = self
            .llm
            .complete(system, &user)
            .await
            .map_err(|e| OutreachError::TransientExternal(e.to_string()))?;
        let trimmed = truncate_words(&description, 200);

        self.store.media.set_ai_description(media_id, &trimmed).await?;
        Ok(())
    }
}

fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        text.trim().to_string()
    } else {
        words[..max_words].join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_words_leaves_short_text_untouched() {
        assert_eq!(truncate_words("a short sentence", 200), "a short sentence");
    }

    #[test]
    fn truncate_words_cuts_at_the_limit() {
        let text = (0..10).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        assert_eq!(truncate_words(&text, 5), "0 1 2 3 4");
    }

    fn quality_score(n: usize, host_names: &[HostName], social_urls: &[String]) -> Option<f32> {
        if n < MIN_TRANSCRIBED_FOR_QUALITY {
            return None;
        }
        let depth = (n as f32 / TOP_K_EPISODES as f32).min(1.0);
        let host_confidence = if host_names.is_empty() {
            0.0
        } else {
            host_names.iter().map(|h| h.confidence).sum::<f32>() / host_names.len() as f32
        };
        let audience_signal = (social_urls.len() as f32 / AUDIENCE_SIGNAL_SATURATION).min(1.0);
        let score = QUALITY_WEIGHT_DEPTH * depth
            + QUALITY_WEIGHT_HOST_CONFIDENCE * host_confidence
            + QUALITY_WEIGHT_AUDIENCE_SIGNAL * audience_signal;
        Some(score.min(1.0))
    }

    #[test]
    fn score_quality_is_none_below_minimum_transcripts() {
        assert!(quality_score(1, &[], &[]).is_none());
        assert!(quality_score(2, &[], &[]).is_none());
        assert!(quality_score(3, &[], &[]).is_some());
    }

    #[test]
    fn score_quality_rewards_host_confidence_and_audience_signal() {
        let hosts = vec![HostName { name: "A".to_string(), confidence: 1.0 }];
        let social = vec!["https://x.com/show".to_string(), "https://instagram.com/show".to_string()];
        assert!(quality_score(5, &hosts, &social) > quality_score(5, &[], &[]));
    }

    #[test]
    fn score_quality_never_exceeds_one() {
        let hosts = vec![
            HostName { name: "A".to_string(), confidence: 1.0 },
            HostName { name: "B".to_string(), confidence: 1.0 },
        ];
        let social = vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];
        assert!(quality_score(5, &hosts, &social).unwrap() <= 1.0);
    }
}
