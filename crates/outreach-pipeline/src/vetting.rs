//! Vetting Agent (C5): scores an enriched podcast against a campaign's ideal
//! guest profile. A checklist is generated once per campaign-ish criteria
//! set, each criterion scored independently against the show's evidence,
//! then combined into a single weighted number the match creator gates on.

use std::collections::HashMap;
use std::sync::Arc;

use outreach_ai::{extract, LlmClient};
use outreach_common::{Campaign, Episode, Media, OutreachError, Result};
use outreach_events::{DomainEvent, EventBus, EventKind};
use outreach_store::Store;
use schemars::JsonSchema;
use serde::Deserialize;

/// How many of a media's most recent episodes are described individually in
/// the evidence block handed to the scoring call.
const MAX_EVIDENCE_EPISODES: usize = 5;

/// Transient LLM failures get this many attempts before the vetting attempt
/// is abandoned for this run (it stays `pending` and the next sweep retries).
const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct VettingCriterion {
    name: String,
    #[schemars(range(min = 1.0, max = 5.0))]
    weight: f32,
    description: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ChecklistResponse {
    criteria: Vec<VettingCriterion>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CriterionScore {
    score: u32,
    justification: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ScoringResponse {
    criterion_scores: Vec<CriterionScore>,
    final_summary: String,
    topic_match_analysis: String,
    matched_expertise: Vec<String>,
}

pub struct VettingAgent {
    store: Store,
    llm: Arc<dyn LlmClient>,
    events: EventBus,
}

impl VettingAgent {
    pub fn new(store: Store, llm: Arc<dyn LlmClient>, events: EventBus) -> Self {
        Self { store, llm, events }
    }

    /// Vets up to `limit` discoveries acquired from the shared vetting queue.
    /// Returns the number that completed (scored or cleanly failed).
    pub async fn run(&self, limit: i64) -> Result<u32> {
        let batch = self.store.discoveries.acquire_vetting_batch(limit).await?;
        let mut processed = 0u32;

        for discovery in batch {
            let campaign = match self.store.campaigns.get(discovery.campaign_id).await? {
                Some(c) => c,
                None => {
                    self.store
                        .discoveries
                        .fail_vetting(discovery.id, "campaign no longer exists")
                        .await?;
                    processed += 1;
                    continue;
                }
            };
            let media = match self.store.media.get(discovery.media_id).await? {
                Some(m) => m,
                None => {
                    self.store
                        .discoveries
                        .fail_vetting(discovery.id, "media no longer exists")
                        .await?;
                    processed += 1;
                    continue;
                }
            };

            match self.vet_one(&campaign, &media).await {
                Ok((score, reasoning, criteria_json, topic_match, expertise)) => {
                    self.store
                        .discoveries
                        .update_vetting_results(
                            discovery.id,
                            score,
                            &reasoning,
                            &criteria_json,
                            Some(&topic_match),
                            &expertise,
                        )
                        .await?;
                    self.events
                        .publish(DomainEvent::new(
                            EventKind::VettingCompleted,
                            "campaign_media_discovery",
                            discovery.id.to_string(),
                            serde_json::json!({
                                "campaign_id": discovery.campaign_id,
                                "media_id": discovery.media_id,
                                "vetting_score": score,
                            }),
                        ))
                        .await;
                }
                Err(e) => {
                    tracing::warn!(discovery_id = discovery.id, error = %e, "vetting failed");
                    self.store
                        .discoveries
                        .fail_vetting(discovery.id, &e.to_string())
                        .await?;
                }
            }
            processed += 1;
        }

        Ok(processed)
    }

    async fn vet_one(
        &self,
        campaign: &Campaign,
        media: &Media,
    ) -> Result<(i32, String, serde_json::Value, String, Vec<String>)> {
        let ideal = campaign
            .ideal_podcast_description
            .as_deref()
            .ok_or_else(|| OutreachError::DataMissing("campaign has no ideal profile".to_string()))?;

        let checklist = self.generate_checklist(ideal, campaign).await?;
        let episodes = self.store.episodes.for_media(media.media_id).await?;
        let evidence = build_evidence(media, &episodes);
        let scoring = self.score_against_checklist(ideal, &checklist, &evidence).await?;

        if scoring.criterion_scores.len() != checklist.criteria.len() {
            return Err(OutreachError::Logic(
                "scoring response criteria count mismatch".to_string(),
            ));
        }

        let weighted: f32 = checklist
            .criteria
            .iter()
            .zip(scoring.criterion_scores.iter())
            .map(|(c, s)| c.weight * s.score as f32)
            .sum();
        let total_weight: f32 = checklist.criteria.iter().map(|c| c.weight).sum();
        let final_score = if total_weight > 0.0 {
            (weighted / total_weight).round().clamp(0.0, 100.0) as i32
        } else {
            0
        };

        let criteria_json = serde_json::json!(checklist
            .criteria
            .iter()
            .zip(scoring.criterion_scores.iter())
            .map(|(c, s)| serde_json::json!({
                "name": c.name,
                "weight": c.weight,
                "score": s.score,
                "justification": s.justification,
            }))
            .collect::<Vec<_>>());

        Ok((
            final_score,
            scoring.final_summary,
            criteria_json,
            scoring.topic_match_analysis,
            scoring.matched_expertise,
        ))
    }

    async fn generate_checklist(&self, ideal: &str, campaign: &Campaign) -> Result<ChecklistResponse> {
        let system = "You build a 7 to 10 item vetting checklist for whether a podcast is a \
                      good fit to pitch a guest to, based on the guest's ideal podcast \
                      profile. Each criterion needs a short name, a weight from 1 to 5 \
                      (5 being most important to this guest's fit), and a one-sentence \
                      description of what a good match looks like.";
        let questionnaire = campaign
            .questionnaire_responses
            .as_ref()
            .map(|q| serde_json::to_string(q).unwrap_or_default())
            .unwrap_or_default();
        let user = format!("Ideal podcast profile: {ideal}\nGuest questionnaire: {questionnaire}");

        self.retrying_extract(system, &user).await
    }

    async fn score_against_checklist(
        &self,
        ideal: &str,
        checklist: &ChecklistResponse,
        evidence: &str,
    ) -> Result<ScoringResponse> {
        let system = "You score a podcast against each criterion in a vetting checklist, 0 to \
                      100, with a short justification per criterion. Then write a final \
                      summary, a topic-match analysis comparing the guest's expertise to this \
                      show's recent topics, and the specific expertise areas that matched.";
        let criteria_text = checklist
            .criteria
            .iter()
            .map(|c| format!("- {} (weight {}): {}", c.name, c.weight, c.description))
            .collect::<Vec<_>>()
            .join("\n");
        let user = format!(
            "Ideal podcast profile: {ideal}\n\nChecklist:\n{criteria_text}\n\nEvidence:\n{evidence}"
        );

        self.retrying_extract(system, &user).await
    }

    async fn retrying_extract<T: outreach_ai::StructuredOutput>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match extract(self.llm.as_ref(), system, user).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let jitter_ms = rand::random::<u64>() % 500;
                    let delay = std::time::Duration::from_secs(2u64.pow(attempt.min(5)))
                        + std::time::Duration::from_millis(jitter_ms);
                    tracing::warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "vetting llm call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(OutreachError::TransientExternal(e.to_string())),
            }
        }
    }
}

/// Builds the structured text block the scoring call judges the show
/// against: an overview (name, descriptions, category, hosts, quality
/// score, social-link count), up to [`MAX_EVIDENCE_EPISODES`] recent
/// episodes individually (title, date, summary, themes, keywords), and
/// aggregate theme/keyword frequencies across every episode on file — not
/// just the ones rendered individually — so a theme that recurs across many
/// older episodes still shows up even once the per-episode list truncates.
/// A free function (not a method) so it's unit-testable without a `Store`.
fn build_evidence(media: &Media, episodes: &[Episode]) -> String {
    let hosts = if media.host_names.is_empty() {
        "unknown".to_string()
    } else {
        media
            .host_names
            .iter()
            .map(|h| format!("{} ({:.0}% confidence)", h.name, h.confidence * 100.0))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let overview = format!(
        "Podcast: {}\nCategory: {}\nLanguage: {}\nDescription: {}\nAI description: {}\n\
         Hosts: {hosts}\nQuality score: {}\nEpisode count: {}\nSocial links: {}",
        media.name,
        media.category.as_deref().unwrap_or("unknown"),
        media.language.as_deref().unwrap_or("unknown"),
        media.description.as_deref().unwrap_or(""),
        media.ai_description.as_deref().unwrap_or(""),
        media
            .quality_score
            .map(|q| format!("{q:.2}"))
            .unwrap_or_else(|| "unknown".to_string()),
        media.episode_count.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()),
        media.social_urls.len(),
    );

    let recent = episodes
        .iter()
        .take(MAX_EVIDENCE_EPISODES)
        .enumerate()
        .map(|(i, ep)| {
            format!(
                "{}. \"{}\" ({}) — {}\n   Themes: {}\n   Keywords: {}",
                i + 1,
                ep.title,
                ep.publish_date
                    .map(|d| d.date_naive().to_string())
                    .unwrap_or_else(|| "unknown date".to_string()),
                ep.ai_episode_summary.as_deref().or(ep.summary.as_deref()).unwrap_or("(no summary)"),
                if ep.themes.is_empty() { "none".to_string() } else { ep.themes.join(", ") },
                if ep.keywords.is_empty() { "none".to_string() } else { ep.keywords.join(", ") },
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut theme_freq: HashMap<&str, u32> = HashMap::new();
    let mut keyword_freq: HashMap<&str, u32> = HashMap::new();
    for ep in episodes {
        for t in &ep.themes {
            *theme_freq.entry(t.as_str()).or_insert(0) += 1;
        }
        for k in &ep.keywords {
            *keyword_freq.entry(k.as_str()).or_insert(0) += 1;
        }
    }
    let frequencies = format!(
        "Theme frequencies: {}\nKeyword frequencies: {}",
        format_frequencies(&theme_freq),
        format_frequencies(&keyword_freq),
    );

    let compiled = media.episode_summaries_compiled.as_deref().unwrap_or("");

    format!(
        "{overview}\n\nRecent episodes:\n{}\n\n{frequencies}\n\nCompiled episode summaries:\n{compiled}",
        if recent.is_empty() { "(none ingested yet)".to_string() } else { recent },
    )
}

/// Renders a term→count map as `"term (n), term (n), …"`, most frequent
/// first, ties broken alphabetically so the output is deterministic (and
/// therefore diffable/testable) despite `HashMap` iteration order.
fn format_frequencies(freq: &HashMap<&str, u32>) -> String {
    if freq.is_empty() {
        return "none".to_string();
    }
    let mut entries: Vec<(&str, u32)> = freq.iter().map(|(k, v)| (*k, *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries
        .into_iter()
        .map(|(term, count)| format!("{term} ({count})"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria(weights: &[f32], scores: &[u32]) -> (f32, f32) {
        let weighted: f32 = weights.iter().zip(scores).map(|(w, s)| w * *s as f32).sum();
        let total: f32 = weights.iter().sum();
        (weighted, total)
    }

    #[test]
    fn weighted_score_rounds_and_clamps() {
        let (weighted, total) = criteria(&[0.5, 0.5], &[100, 0]);
        let score = (weighted / total).round().clamp(0.0, 100.0) as i32;
        assert_eq!(score, 50);
    }

    #[test]
    fn weighted_score_handles_uneven_weights() {
        let (weighted, total) = criteria(&[0.7, 0.3], &[90, 10]);
        let score = (weighted / total).round().clamp(0.0, 100.0) as i32;
        assert_eq!(score, 66);
    }

    #[test]
    fn frequencies_sort_by_count_then_alphabetically() {
        let mut freq = HashMap::new();
        freq.insert("pricing", 3u32);
        freq.insert("saas", 3u32);
        freq.insert("marketing", 1u32);
        assert_eq!(format_frequencies(&freq), "pricing (3), saas (3), marketing (1)");
    }

    #[test]
    fn frequencies_empty_map_reads_none() {
        assert_eq!(format_frequencies(&HashMap::new()), "none");
    }

    fn media_fixture() -> Media {
        Media {
            media_id: 1,
            rss_url: None,
            external_ids: Default::default(),
            name: "The SaaS Pricing Show".to_string(),
            description: Some("A show about pricing".to_string()),
            ai_description: None,
            host_names: vec![],
            contact_email: None,
            category: Some("Business".to_string()),
            language: Some("en".to_string()),
            episode_count: Some(42),
            quality_score: Some(0.75),
            social_urls: vec!["https://twitter.com/example".to_string()],
            episode_summaries_compiled: None,
            last_enriched_timestamp: None,
        }
    }

    #[test]
    fn evidence_includes_overview_fields() {
        let evidence = build_evidence(&media_fixture(), &[]);
        assert!(evidence.contains("The SaaS Pricing Show"));
        assert!(evidence.contains("Business"));
        assert!(evidence.contains("0.75"));
        assert!(evidence.contains("Social links: 1"));
        assert!(evidence.contains("(none ingested yet)"));
    }

    #[test]
    fn evidence_aggregates_theme_frequencies_beyond_the_rendered_window() {
        use chrono::{TimeZone, Utc};
        let episodes: Vec<Episode> = (0..7)
            .map(|i| Episode {
                episode_id: i,
                media_id: 1,
                source_api: "test".to_string(),
                external_episode_id: i.to_string(),
                title: format!("Episode {i}"),
                publish_date: Some(Utc.timestamp_opt(1_700_000_000 - i * 86_400, 0).unwrap()),
                duration_seconds: None,
                summary: None,
                transcript: None,
                ai_episode_summary: Some("summary".to_string()),
                themes: vec!["pricing".to_string()],
                keywords: vec![],
                embedding: None,
            })
            .collect();
        let evidence = build_evidence(&media_fixture(), &episodes);
        // 7 episodes all tagged "pricing" but only MAX_EVIDENCE_EPISODES are
        // individually rendered; the frequency count still reflects all 7.
        assert!(evidence.contains("Theme frequencies: pricing (7)"));
    }
}
