//! Match Creator (C6): turns a vetted, high-scoring discovery into a
//! `MatchSuggestion` a human reviews before the client ever sees it. Quota
//! enforcement happens first, inside the same transaction as the write
//! itself (see `MatchStore::create_match_and_mark_discovery`), and is the
//! only step that can reject the whole operation; everything after it is
//! bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use outreach_ai::LlmClient;
use outreach_common::{cosine_similarity, Campaign, Episode, OutreachError, Plan, Result};
use outreach_events::{DomainEvent, EventBus, EventKind};
use outreach_store::{CreateMatchOutcome, NewMatch, Store};
use uuid::Uuid;

/// How many of a media's most recent episodes (with an embedding) are
/// considered when picking the best matching one for a match suggestion.
const MAX_EPISODES_CONSIDERED: usize = 20;

/// What a scoped match-creation pass did, so a caller driving it inline
/// (the auto-discovery controller) can tell an exhausted quota apart from a
/// quiet run with nothing left to match.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchRunOutcome {
    pub created: u32,
    pub quota_exhausted: bool,
}

pub struct MatchCreator {
    store: Store,
    llm: Arc<dyn LlmClient>,
    events: EventBus,
}

impl MatchCreator {
    pub fn new(store: Store, llm: Arc<dyn LlmClient>, events: EventBus) -> Self {
        Self { store, llm, events }
    }

    /// Creates matches for up to `limit` vetted discoveries scoring at or
    /// above `min_vetting_score`, across every campaign with work queued.
    /// Returns the number of matches created. Publishes one
    /// `ClientMatchesReady` event per campaign that actually got a match
    /// out of this pass, with a genuine `matches_created` count.
    pub async fn run(&self, min_vetting_score: i32, limit: i64) -> Result<u32> {
        let batch = self
            .store
            .discoveries
            .ready_for_match_creation(min_vetting_score, limit)
            .await?;
        let mut created_per_campaign: HashMap<Uuid, u32> = HashMap::new();
        let mut created = 0u32;

        for discovery in batch {
            let campaign = match self.store.campaigns.get(discovery.campaign_id).await? {
                Some(c) => c,
                None => continue,
            };

            match self.try_create_match(&discovery, &campaign).await? {
                MatchRunOutcome { created: 1, .. } => {
                    created += 1;
                    *created_per_campaign.entry(campaign.campaign_id).or_insert(0) += 1;
                }
                MatchRunOutcome { quota_exhausted: true, .. } => {
                    self.events
                        .publish(DomainEvent::new(
                            EventKind::ClientLimitReached,
                            "client_profile",
                            campaign.person_id.to_string(),
                            serde_json::json!({ "campaign_id": discovery.campaign_id }),
                        ))
                        .await;
                }
                _ => {}
            }
        }

        for (campaign_id, matches_created) in created_per_campaign {
            self.events
                .publish(DomainEvent::new(
                    EventKind::ClientMatchesReady,
                    "campaign",
                    campaign_id.to_string(),
                    serde_json::json!({ "campaign_id": campaign_id, "matches_created": matches_created }),
                ))
                .await;
        }

        Ok(created)
    }

    /// Same match-creation pass as [`run`], scoped to a single campaign.
    /// Used by the auto-discovery controller to run match creation inline
    /// right after a discovery sweep, so the controller can observe quota
    /// exhaustion directly instead of waiting for the independently
    /// scheduled [`run`] to notice it. Stops as soon as the campaign's
    /// quota is hit rather than continuing to spin through the rest of the
    /// batch.
    pub async fn run_for_campaign(
        &self,
        campaign_id: Uuid,
        min_vetting_score: i32,
        limit: i64,
    ) -> Result<MatchRunOutcome> {
        let Some(campaign) = self.store.campaigns.get(campaign_id).await? else {
            return Ok(MatchRunOutcome::default());
        };

        let batch = self
            .store
            .discoveries
            .ready_for_match_creation_for_campaign(campaign_id, min_vetting_score, limit)
            .await?;

        let mut created = 0u32;
        let mut quota_exhausted = false;

        for discovery in batch {
            let outcome = self.try_create_match(&discovery, &campaign).await?;
            created += outcome.created;
            if outcome.quota_exhausted {
                quota_exhausted = true;
                self.events
                    .publish(DomainEvent::new(
                        EventKind::ClientLimitReached,
                        "client_profile",
                        campaign.person_id.to_string(),
                        serde_json::json!({ "campaign_id": campaign_id }),
                    ))
                    .await;
                break;
            }
        }

        if created > 0 {
            self.events
                .publish(DomainEvent::new(
                    EventKind::ClientMatchesReady,
                    "campaign",
                    campaign_id.to_string(),
                    serde_json::json!({ "campaign_id": campaign_id, "matches_created": created }),
                ))
                .await;
        }

        Ok(MatchRunOutcome { created, quota_exhausted })
    }

    /// Attempts to create a match for one vetted discovery. The quota check
    /// and the write happen together inside
    /// `MatchStore::create_match_and_mark_discovery`'s transaction, so a
    /// `created: 0, quota_exhausted: true` result means nothing was written
    /// at all, not a write that was later rolled back by a second query.
    async fn try_create_match(&self, discovery: &outreach_common::CampaignMediaDiscovery, campaign: &Campaign) -> Result<MatchRunOutcome> {
        let best_episode = self.best_matching_episode(&campaign.embedding, discovery.media_id).await?;

        let vetting_score = discovery.vetting_score.unwrap_or(0);
        let vetting_reasoning = discovery.vetting_reasoning.clone().unwrap_or_default();

        let new_match = NewMatch {
            campaign_id: discovery.campaign_id,
            media_id: discovery.media_id,
            match_score: vetting_score as f32 / 100.0,
            matched_keywords: vec![discovery.discovery_keyword.clone()],
            ai_reasoning: vetting_reasoning.clone(),
            vetting_score,
            vetting_reasoning,
            vetting_checklist: discovery.vetting_criteria.clone().unwrap_or(serde_json::json!({})),
            best_matching_episode_id: best_episode.map(|(id, _)| id),
        };

        let outcome = self
            .store
            .matches
            .create_match_and_mark_discovery(new_match, discovery.id, campaign.person_id)
            .await?;

        let (match_suggestion, review_task_id) = match outcome {
            CreateMatchOutcome::Created(m, t) => (m, t),
            CreateMatchOutcome::QuotaExceeded => {
                return Ok(MatchRunOutcome { created: 0, quota_exhausted: true });
            }
        };

        self.store
            .discoveries
            .mark_review_task_created(discovery.id, review_task_id)
            .await?;

        let plan = self.store.client_profiles.get(campaign.person_id).await?.map(|p| p.plan);
        if matches!(plan, Some(Plan::PaidBasic) | Some(Plan::PaidPremium)) {
            self.store
                .campaigns
                .increment_weekly_auto_discovery_matches(campaign.campaign_id, 1)
                .await?;
        }

        self.events
            .publish(DomainEvent::new(
                EventKind::MatchCreated,
                "match_suggestion",
                match_suggestion.match_id.to_string(),
                serde_json::json!({
                    "campaign_id": discovery.campaign_id,
                    "media_id": discovery.media_id,
                    "vetting_score": discovery.vetting_score,
                }),
            ))
            .await;

        Ok(MatchRunOutcome { created: 1, quota_exhausted: false })
    }

    /// Resolves (embedding a fresh one from the ideal profile if the
    /// campaign doesn't have one cached) the campaign's vector, then picks
    /// the best matching episode via [`best_matching_episode_id`].
    async fn best_matching_episode(
        &self,
        campaign_embedding: &Option<Vec<f32>>,
        media_id: i64,
    ) -> Result<Option<(i64, f32)>> {
        let Some(query) = campaign_embedding.clone() else {
            return Ok(None);
        };
        let episodes = self.store.episodes.for_media(media_id).await?;
        Ok(best_matching_episode_id(&episodes, &query))
    }
}

/// Pure episode-matching core: picks the episode whose embedding is most
/// cosine-similar to `query_embedding`, among up to
/// [`MAX_EPISODES_CONSIDERED`] of the media's most recent episodes that have
/// one. Ties broken by newest `publish_date` first (input is assumed to
/// already be publish-date-descending, as [`EpisodeStore::for_media`]
/// returns it).
pub fn best_matching_episode_id(episodes: &[Episode], query_embedding: &[f32]) -> Option<(i64, f32)> {
    // `max_by` returns the *last* equally-maximal element; since `episodes`
    // arrives newest-first, folding by hand with a strict `>` keeps the
    // first (newest) episode on a tie instead of the oldest.
    episodes
        .iter()
        .take(MAX_EPISODES_CONSIDERED)
        .filter_map(|e| e.embedding.as_ref().map(|emb| (e.episode_id, cosine_similarity(emb, query_embedding))))
        .fold(None, |best: Option<(i64, f32)>, (id, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((id, score)),
        })
}

/// Helper used by the enrichment orchestrator when it needs an embedding
/// for freshly transcribed episode text (themes/keywords are left to the
/// caller; this just wraps the LLM client's embed call with the pipeline's
/// error taxonomy).
pub async fn embed_text(llm: &dyn LlmClient, text: &str) -> Result<Vec<f32>> {
    llm.embed(text)
        .await
        .map_err(|e| OutreachError::TransientExternal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn episode(id: i64, embedding: Option<Vec<f32>>, days_ago: i64) -> Episode {
        Episode {
            episode_id: id,
            media_id: 1,
            source_api: "test".to_string(),
            external_episode_id: id.to_string(),
            title: "ep".to_string(),
            publish_date: Some(Utc.timestamp_opt(1_700_000_000 - days_ago * 86_400, 0).unwrap()),
            duration_seconds: None,
            summary: None,
            transcript: None,
            ai_episode_summary: None,
            themes: vec![],
            keywords: vec![],
            embedding,
        }
    }

    #[test]
    fn picks_highest_cosine_similarity() {
        let episodes = vec![
            episode(1, Some(vec![1.0, 0.0]), 0),
            episode(2, Some(vec![0.0, 1.0]), 1),
        ];
        let query = vec![0.0, 1.0];
        let (best_id, score) = best_matching_episode_id(&episodes, &query).unwrap();
        assert_eq!(best_id, 2);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn skips_episodes_without_an_embedding() {
        let episodes = vec![episode(1, None, 0), episode(2, Some(vec![1.0, 0.0]), 0)];
        let (best_id, _) = best_matching_episode_id(&episodes, &[1.0, 0.0]).unwrap();
        assert_eq!(best_id, 2);
    }

    #[test]
    fn returns_none_when_no_episode_has_an_embedding() {
        let episodes = vec![episode(1, None, 0)];
        assert!(best_matching_episode_id(&episodes, &[1.0, 0.0]).is_none());
    }

    #[test]
    fn considers_only_the_most_recent_window() {
        let mut episodes: Vec<Episode> = (0..25)
            .map(|i| episode(i, Some(vec![0.0, 1.0]), i))
            .collect();
        // The one truly identical match sits outside the considered window.
        episodes.push(episode(999, Some(vec![1.0, 0.0]), 100));
        episodes.sort_by_key(|e| std::cmp::Reverse(e.publish_date));
        let (best_id, _) = best_matching_episode_id(&episodes, &[1.0, 0.0]).unwrap();
        assert_ne!(best_id, 999);
    }
}
