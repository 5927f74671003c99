//! Health checker (C10): idempotent repair passes that reconcile state a
//! crash could have left inconsistent. Every pass here is safe to run
//! repeatedly and safe to run concurrently with the live pipeline — none of
//! them touch a row the live passes currently hold a processing lock on.

use outreach_store::Store;
use tracing::info;

/// Processing locks and `in_progress` vetting rows older than this are
/// assumed abandoned by a crashed worker. Matches spec.md §4.10(c).
const STALE_LOCK_MINUTES: i64 = 60;

/// `enrichment_status = 'in_progress'` rows whose media row already shows a
/// newer enrichment timestamp are assumed to have lost only their own
/// status update, not the underlying work. Matches spec.md §4.10(b).
const STALLED_ENRICHMENT_MINUTES: i64 = 5;

/// Vetting failures older than this are retried automatically, provided
/// their error doesn't look like a permanent data problem. Matches
/// spec.md §4.10(d).
const STALE_VETTING_FAILURE_HOURS: i64 = 2;

/// Client profiles whose `last_weekly_reset` is this many days stale are
/// flagged in the report, though the reset itself always runs on the
/// scheduler's own weekly task rather than from here.
const STALE_WEEKLY_RESET_DAYS: i64 = 8;

/// Found-vs-fixed counts for one health-check pass over the whole system.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct HealthReport {
    pub stale_locks_cleared: u64,
    pub stalled_enrichments_advanced: u64,
    pub stale_vetting_failures_retried: u64,
    pub missing_summaries_recompiled: u64,
    pub profiles_with_stale_weekly_reset: usize,
}

pub struct HealthChecker {
    store: Store,
}

impl HealthChecker {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Runs every repair pass once and returns what it found and fixed.
    /// Intended to run from the background pool on its own cadence, never
    /// inline with request-serving paths.
    pub async fn run(&self) -> outreach_common::Result<HealthReport> {
        let stale_locks_cleared = self.store.discoveries.cleanup_stale_locks(STALE_LOCK_MINUTES).await?;
        if stale_locks_cleared > 0 {
            info!(stale_locks_cleared, "health check cleared stale processing locks");
        }

        let stalled_enrichments_advanced = self
            .store
            .discoveries
            .advance_stalled_after_media_enrichment(STALLED_ENRICHMENT_MINUTES)
            .await?;
        if stalled_enrichments_advanced > 0 {
            info!(stalled_enrichments_advanced, "health check advanced stalled enrichment rows");
        }

        let stale_vetting_failures_retried = self
            .store
            .discoveries
            .reset_stale_vetting_failures(STALE_VETTING_FAILURE_HOURS)
            .await?;
        if stale_vetting_failures_retried > 0 {
            info!(stale_vetting_failures_retried, "health check requeued stale vetting failures");
        }

        let missing_summaries_recompiled = self.store.media.recompile_all_missing_summaries().await?;
        if missing_summaries_recompiled > 0 {
            info!(missing_summaries_recompiled, "health check recompiled missing episode summaries");
        }

        let stale_resets = self
            .store
            .client_profiles
            .stale_weekly_resets(STALE_WEEKLY_RESET_DAYS)
            .await?;
        let profiles_with_stale_weekly_reset = stale_resets.len();
        if profiles_with_stale_weekly_reset > 0 {
            info!(
                profiles_with_stale_weekly_reset,
                "health check found client profiles with a stale weekly reset"
            );
        }

        Ok(HealthReport {
            stale_locks_cleared,
            stalled_enrichments_advanced,
            stale_vetting_failures_retried,
            missing_summaries_recompiled,
            profiles_with_stale_weekly_reset,
        })
    }

    /// Manual "revet" tool: requeues failed vetting rows and reopened
    /// rejected-by-AI matches for one campaign. Never run on a schedule —
    /// an operator calls this explicitly when a campaign's upstream data
    /// (ideal profile, keywords) has just been fixed and old failures
    /// deserve another pass.
    pub async fn revet_campaign(&self, campaign_id: uuid::Uuid) -> outreach_common::Result<RevetReport> {
        let vetting_failures_requeued = self.store.discoveries.revet_failed(campaign_id).await?;
        let matches_reopened = self.store.matches.revet_rejected_by_ai(campaign_id).await?;
        Ok(RevetReport { vetting_failures_requeued, matches_reopened })
    }
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct RevetReport {
    pub vetting_failures_requeued: u64,
    pub matches_reopened: u64,
}
