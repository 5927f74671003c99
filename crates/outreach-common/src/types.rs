//! Core entity types shared across the pipeline, store, and scheduler crates.
//! The store crate maps these onto relational tables.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Implements `Display`/`FromStr`/serde for a fieldless enum as its snake_case name.
/// The store crate persists these as plain `TEXT` columns and round-trips through
/// this pair of impls rather than a Postgres enum type, so adding a variant never
/// requires an `ALTER TYPE` migration.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $str),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($str => Ok($name::$variant)),+,
                    other => Err(format!("unknown {} value: {other}", stringify!($name))),
                }
            }
        }
    };
}

string_enum!(AutoDiscoveryStatus {
    Disabled => "disabled",
    Pending => "pending",
    Running => "running",
    Paused => "paused",
    Completed => "completed",
    Error => "error",
});

string_enum!(StageStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Failed => "failed",
});

string_enum!(MatchStatus {
    PendingVetting => "pending_vetting",
    PendingHumanReview => "pending_human_review",
    PendingClientReview => "pending_client_review",
    ClientApproved => "client_approved",
    ClientRejected => "client_rejected",
    RejectedByAi => "rejected_by_ai",
});

string_enum!(ReviewTaskType {
    MatchSuggestion => "match_suggestion",
    MatchSuggestionVetting => "match_suggestion_vetting",
    PitchReview => "pitch_review",
});

string_enum!(ReviewTaskStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Completed => "completed",
    Failed => "failed",
});

string_enum!(Plan {
    Free => "free",
    PaidBasic => "paid_basic",
    PaidPremium => "paid_premium",
});

impl Plan {
    pub fn is_free(&self) -> bool {
        matches!(self, Plan::Free)
    }
}

// ---------------------------------------------------------------------------
// Questionnaire blob
// ---------------------------------------------------------------------------

/// Semi-structured, partially populated client questionnaire.
///
/// Every field is `Option` so the vetting agent can tell "client never answered
/// this" (`None`) from "client answered and it happens to be empty" (`Some(vec![])`)
/// and fall back gracefully to the ideal description alone when the whole blob is
/// absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionnaireResponses {
    pub expertise_topics: Option<Vec<String>>,
    pub suggested_topics: Option<Vec<String>>,
    pub key_messages: Option<Vec<String>>,
    pub audience_requirements: Option<String>,
    pub previous_show_types: Option<Vec<String>>,
    pub promotion_items: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Embedding: accept multiple on-wire encodings, normalise on read
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingWire {
    List(Vec<f32>),
    Bracketed(String),
}

impl EmbeddingWire {
    /// Normalise either wire encoding into a flat `Vec<f32>`.
    pub fn normalise(&self) -> Vec<f32> {
        match self {
            EmbeddingWire::List(v) => v.clone(),
            EmbeddingWire::Bracketed(s) => s
                .trim_matches(|c| c == '[' || c == ']')
                .split(',')
                .filter_map(|part| part.trim().parse::<f32>().ok())
                .collect(),
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

// ---------------------------------------------------------------------------
// Campaign
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub campaign_id: Uuid,
    pub person_id: Uuid,
    pub keywords: Vec<String>,
    pub ideal_podcast_description: Option<String>,
    pub questionnaire_responses: Option<QuestionnaireResponses>,
    pub embedding: Option<Vec<f32>>,
    pub auto_discovery_enabled: bool,
    pub auto_discovery_status: AutoDiscoveryStatus,
    pub auto_discovery_last_run: Option<DateTime<Utc>>,
    pub auto_discovery_last_heartbeat: Option<DateTime<Utc>>,
    pub auto_discovery_error: Option<String>,
    pub auto_discovery_progress: serde_json::Value,
    pub auto_discovery_matches_this_week: u32,
}

/// Weekly auto-discovery match cap for paid plans (spec's `200 - auto_weekly_count`),
/// tracked separately from the free-plan `weekly_match_allowance` since paid plans
/// don't carry one.
pub const PAID_AUTO_DISCOVERY_WEEKLY_CAP: u32 = 200;

impl Campaign {
    /// A campaign is ready to be vetted/discovered against only with a described
    /// ideal guest profile; absent one, pipeline stages should raise `DataMissing`
    /// rather than guess.
    pub fn has_ideal_description(&self) -> bool {
        self.ideal_podcast_description
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    /// How many more matches this campaign's auto-discovery run may create this
    /// week: the free-plan weekly match allowance for free plans, or the flat
    /// paid-plan auto-discovery cap for paid ones. The auto-discovery controller
    /// stops creating matches (and pauses) once this reaches zero.
    pub fn remaining_auto_discovery_matches(&self, profile: &ClientProfile) -> u32 {
        match profile.plan {
            Plan::Free => profile
                .weekly_match_allowance
                .saturating_sub(profile.current_weekly_matches),
            Plan::PaidBasic | Plan::PaidPremium => {
                PAID_AUTO_DISCOVERY_WEEKLY_CAP.saturating_sub(self.auto_discovery_matches_this_week)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HostName {
    pub name: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub media_id: i64,
    pub rss_url: Option<String>,
    pub external_ids: HashMap<String, String>,
    pub name: String,
    pub description: Option<String>,
    pub ai_description: Option<String>,
    pub host_names: Vec<HostName>,
    pub contact_email: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub episode_count: Option<u32>,
    pub quality_score: Option<f32>,
    pub social_urls: Vec<String>,
    pub episode_summaries_compiled: Option<String>,
    pub last_enriched_timestamp: Option<DateTime<Utc>>,
}

impl Media {
    /// Minimum host-name confidence required before a discovery is eligible for
    /// vetting.
    pub const MIN_HOST_NAME_CONFIDENCE: f32 = 0.8;

    pub fn host_names_confident(&self) -> bool {
        !self.host_names.is_empty()
            && self
                .host_names
                .iter()
                .all(|h| h.confidence >= Self::MIN_HOST_NAME_CONFIDENCE)
    }
}

// ---------------------------------------------------------------------------
// Episode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub episode_id: i64,
    pub media_id: i64,
    pub source_api: String,
    pub external_episode_id: String,
    pub title: String,
    pub publish_date: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u32>,
    pub summary: Option<String>,
    pub transcript: Option<String>,
    pub ai_episode_summary: Option<String>,
    pub themes: Vec<String>,
    pub keywords: Vec<String>,
    pub embedding: Option<Vec<f32>>,
}

// ---------------------------------------------------------------------------
// CampaignMediaDiscovery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignMediaDiscovery {
    pub id: i64,
    pub campaign_id: Uuid,
    pub media_id: i64,
    pub discovery_keyword: String,
    pub enrichment_status: StageStatus,
    pub enrichment_error: Option<String>,
    pub vetting_status: StageStatus,
    pub vetting_error: Option<String>,
    pub vetting_score: Option<i32>,
    pub vetting_reasoning: Option<String>,
    pub vetting_criteria: Option<serde_json::Value>,
    pub topic_match_analysis: Option<String>,
    pub matched_expertise: Vec<String>,
    pub match_created: bool,
    pub match_suggestion_id: Option<i64>,
    pub review_task_created: bool,
    pub review_task_id: Option<i64>,
    pub processing_lock: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub enrichment_completed_at: Option<DateTime<Utc>>,
    pub vetted_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// MatchSuggestion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSuggestion {
    pub match_id: i64,
    pub campaign_id: Uuid,
    pub media_id: i64,
    pub match_score: f32,
    pub matched_keywords: Vec<String>,
    pub ai_reasoning: String,
    pub vetting_score: i32,
    pub vetting_reasoning: String,
    pub vetting_checklist: serde_json::Value,
    pub best_matching_episode_id: Option<i64>,
    pub status: MatchStatus,
    pub client_approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ReviewTask
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewTask {
    pub review_task_id: i64,
    pub task_type: ReviewTaskType,
    pub related_id: i64,
    pub campaign_id: Uuid,
    pub status: ReviewTaskStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ClientProfile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientProfile {
    pub person_id: Uuid,
    pub plan: Plan,
    pub weekly_discovery_allowance: u32,
    pub current_weekly_discoveries: u32,
    pub daily_discovery_allowance: u32,
    pub current_daily_discoveries: u32,
    pub weekly_match_allowance: u32,
    pub current_weekly_matches: u32,
    pub auto_discovery_matches_this_week: u32,
    pub last_weekly_reset: DateTime<Utc>,
    pub last_daily_reset: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_wire_normalises_both_encodings() {
        let list = EmbeddingWire::List(vec![1.0, 2.0, 3.0]);
        assert_eq!(list.normalise(), vec![1.0, 2.0, 3.0]);

        let bracketed = EmbeddingWire::Bracketed("[1.0, 2.0, 3.0]".to_string());
        assert_eq!(bracketed.normalise(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_mismatched_lengths_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0, 2.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    fn sample_campaign() -> Campaign {
        Campaign {
            campaign_id: Uuid::nil(),
            person_id: Uuid::nil(),
            keywords: vec![],
            ideal_podcast_description: None,
            questionnaire_responses: None,
            embedding: None,
            auto_discovery_enabled: true,
            auto_discovery_status: AutoDiscoveryStatus::Pending,
            auto_discovery_last_run: None,
            auto_discovery_last_heartbeat: None,
            auto_discovery_error: None,
            auto_discovery_progress: serde_json::json!({}),
            auto_discovery_matches_this_week: 0,
        }
    }

    fn sample_profile(plan: Plan) -> ClientProfile {
        ClientProfile {
            person_id: Uuid::nil(),
            plan,
            weekly_discovery_allowance: 50,
            current_weekly_discoveries: 0,
            daily_discovery_allowance: 10,
            current_daily_discoveries: 0,
            weekly_match_allowance: 20,
            current_weekly_matches: 5,
            auto_discovery_matches_this_week: 0,
            last_weekly_reset: Utc::now(),
            last_daily_reset: Utc::now(),
        }
    }

    #[test]
    fn remaining_auto_discovery_matches_uses_weekly_allowance_for_free_plans() {
        let campaign = sample_campaign();
        let profile = sample_profile(Plan::Free);
        assert_eq!(campaign.remaining_auto_discovery_matches(&profile), 15);
    }

    #[test]
    fn remaining_auto_discovery_matches_uses_flat_cap_for_paid_plans() {
        let mut campaign = sample_campaign();
        campaign.auto_discovery_matches_this_week = 190;
        let profile = sample_profile(Plan::PaidBasic);
        assert_eq!(campaign.remaining_auto_discovery_matches(&profile), 10);
    }

    #[test]
    fn remaining_auto_discovery_matches_saturates_at_zero() {
        let mut campaign = sample_campaign();
        campaign.auto_discovery_matches_this_week = 250;
        let profile = sample_profile(Plan::PaidPremium);
        assert_eq!(campaign.remaining_auto_discovery_matches(&profile), 0);
    }

    #[test]
    fn host_names_confident_requires_all_above_threshold() {
        let mut media = sample_media();
        media.host_names = vec![
            HostName { name: "A".into(), confidence: 0.9 },
            HostName { name: "B".into(), confidence: 0.85 },
        ];
        assert!(media.host_names_confident());

        media.host_names[1].confidence = 0.5;
        assert!(!media.host_names_confident());
    }

    #[test]
    fn status_enums_round_trip_through_str() {
        use std::str::FromStr;
        assert_eq!(StageStatus::from_str("in_progress").unwrap(), StageStatus::InProgress);
        assert_eq!(StageStatus::InProgress.as_str(), "in_progress");
        assert!(StageStatus::from_str("bogus").is_err());
        assert_eq!(
            MatchStatus::from_str("pending_client_review").unwrap(),
            MatchStatus::PendingClientReview
        );
    }

    #[test]
    fn host_names_confident_false_when_empty() {
        let media = sample_media();
        assert!(!media.host_names_confident());
    }

    fn sample_media() -> Media {
        Media {
            media_id: 1,
            rss_url: None,
            external_ids: HashMap::new(),
            name: "Test".into(),
            description: None,
            ai_description: None,
            host_names: vec![],
            contact_email: None,
            category: None,
            language: None,
            episode_count: None,
            quality_score: None,
            social_urls: vec![],
            episode_summaries_compiled: None,
            last_enriched_timestamp: None,
        }
    }
}
