//! The outreach pipeline (C3-C6): discovery, enrichment, vetting, and match
//! creation. Each stage is its own struct over a shared [`Store`] handle,
//! polled by the scheduler rather than driving itself.

pub mod discovery;
pub mod enrichment;
pub mod matching;
pub mod transcription;
pub mod vetting;

pub use discovery::DiscoveryFetcher;
pub use enrichment::EnrichmentOrchestrator;
pub use matching::{best_matching_episode_id, embed_text, MatchCreator, MatchRunOutcome};
pub use transcription::{HttpTranscriber, MockTranscriber, Transcriber};
pub use vetting::VettingAgent;
