//! Auto-discovery controller (C8): drives each enabled campaign's
//! discovery run through `disabled -> pending -> running -> {completed |
//! paused | error} -> pending`, with crash recovery for runs that never
//! reach a terminal state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use outreach_common::{AutoDiscoveryStatus, OutreachError, Plan, Result};
use outreach_events::{DomainEvent, EventBus, EventKind};
use outreach_pipeline::{DiscoveryFetcher, MatchCreator};
use outreach_store::Store;
use tracing::{info, warn};
use uuid::Uuid;

/// A running sweep sends a heartbeat on this cadence so
/// [`AutoDiscoveryController::recover_stuck`] can tell a live run from a
/// crashed one. Matches spec.md §4.8 step 2 ("every 30 s").
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// A campaign's discovery run is reclaimed if its heartbeat goes this long
/// without an update.
const HEARTBEAT_STALE_MINUTES: i64 = 5;

/// Independent of heartbeat: a run past this wall-clock age is reclaimed
/// even if something is still renewing its heartbeat, so one campaign can
/// never monopolize the controller indefinitely.
const RUN_STALE_MINUTES: i64 = 25;

/// `error` campaigns are eligible to retry once their error is this old,
/// per spec.md §4.8's crash-recovery rule ("status=error older than 2h is
/// reset to pending").
const ERROR_RETRY_HOURS: i64 = 2;

/// Sane upper bound on discoveries created per sweep per campaign,
/// regardless of quota headroom — the actual per-sweep budget is the
/// campaign's computed `remaining_auto_discovery_matches`, capped at this.
const MAX_DISCOVERIES_PER_SWEEP: u32 = 25;

/// Matches created per campaign per sweep by the inline match-creation
/// pass, independent of the discovery cap above.
const MAX_MATCHES_PER_SWEEP: i64 = 25;

/// Outcome of one campaign's inline C3 -> C6 run, enough for the controller
/// to decide `completed` vs `paused` vs `error` and to publish an accurate
/// completion progress payload.
struct CampaignRunOutcome {
    discoveries_created: u32,
    matches_created: u32,
    quota_exhausted: bool,
}

pub struct AutoDiscoveryController {
    store: Store,
    fetcher: Arc<DiscoveryFetcher>,
    match_creator: Arc<MatchCreator>,
    events: EventBus,
    vetting_threshold: i32,
}

impl AutoDiscoveryController {
    /// `match_creator` runs match creation (C6) for a campaign inline,
    /// right after that campaign's discovery sweep (C3), so quota
    /// exhaustion and genuine match counts are observed synchronously
    /// instead of waiting on the independently scheduled `match_creation`
    /// task to notice them. `vetting_threshold` is the minimum vetting
    /// score a discovery needs to be eligible for that inline pass, the
    /// same threshold the scheduled `match_creation` task uses.
    pub fn new(
        store: Store,
        fetcher: Arc<DiscoveryFetcher>,
        match_creator: Arc<MatchCreator>,
        events: EventBus,
        vetting_threshold: i32,
    ) -> Self {
        Self {
            store,
            fetcher,
            match_creator,
            events,
            vetting_threshold,
        }
    }

    /// One controller sweep: recovers any stuck runs, then claims and runs
    /// every campaign currently due. Returns the number of campaigns swept.
    pub async fn sweep(&self, max_campaigns: i64) -> Result<u32> {
        self.recover().await?;

        let due = self.store.campaigns.due_for_auto_discovery(max_campaigns).await?;
        let mut prioritized = Vec::with_capacity(due.len());
        for campaign in due {
            let plan = self
                .store
                .client_profiles
                .get(campaign.person_id)
                .await?
                .map(|p| p.plan)
                .unwrap_or(Plan::Free);
            prioritized.push((campaign, plan));
        }
        // Paid plans run first within a sweep; ties keep the store's
        // least-recently-run ordering.
        prioritized.sort_by_key(|(_, plan)| plan.is_free());

        let mut swept = 0u32;
        for (campaign, _) in prioritized {
            if !self.store.campaigns.try_claim_for_running(campaign.campaign_id).await? {
                continue;
            }
            swept += 1;
            self.run_one(campaign.campaign_id).await;
        }
        Ok(swept)
    }

    /// Runs one already-claimed campaign to completion, heartbeating while
    /// it works and recording whatever terminal status it ends in. Errors
    /// from the pipeline itself never propagate past this call — they're
    /// recorded on the campaign row instead, since a single campaign's
    /// failure must never abort the sweep.
    async fn run_one(&self, campaign_id: Uuid) {
        let campaigns = self.store.campaigns.clone();
        let heartbeat_campaigns = campaigns.clone();
        let heartbeat = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                ticker.tick().await;
                if heartbeat_campaigns.record_heartbeat(campaign_id).await.is_err() {
                    return;
                }
            }
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(RUN_STALE_MINUTES as u64 * 60),
            self.run_campaign_pipeline(campaign_id),
        )
        .await;

        heartbeat.abort();

        match outcome {
            Ok(Ok(result)) if result.quota_exhausted => {
                info!(
                    %campaign_id,
                    discoveries_created = result.discoveries_created,
                    matches_created = result.matches_created,
                    "auto-discovery sweep paused on an exhausted match quota"
                );
                let _ = campaigns
                    .set_auto_discovery_status(
                        campaign_id,
                        AutoDiscoveryStatus::Paused,
                        Some("weekly auto-discovery match quota exhausted"),
                    )
                    .await;
            }
            Ok(Ok(result)) => {
                info!(
                    %campaign_id,
                    discoveries_created = result.discoveries_created,
                    matches_created = result.matches_created,
                    "auto-discovery sweep completed"
                );
                let progress = serde_json::json!({
                    "last_discoveries_created": result.discoveries_created,
                    "last_matches_created": result.matches_created,
                    "last_run_at": Utc::now(),
                });
                let _ = campaigns.record_run_completed(campaign_id, &progress).await;
            }
            Ok(Err(e)) => {
                warn!(%campaign_id, error = %e, "auto-discovery sweep failed");
                let status = if e.is_quota() {
                    AutoDiscoveryStatus::Paused
                } else {
                    AutoDiscoveryStatus::Error
                };
                let _ = campaigns
                    .set_auto_discovery_status(campaign_id, status, Some(&e.to_string()))
                    .await;
            }
            Err(_) => {
                warn!(%campaign_id, "auto-discovery sweep exceeded its wall-clock cap");
                let _ = campaigns
                    .set_auto_discovery_status(
                        campaign_id,
                        AutoDiscoveryStatus::Error,
                        Some("sweep exceeded its wall-clock cap"),
                    )
                    .await;
            }
        }
    }

    /// The inline C3 -> C6 pipeline for one campaign: finds new media (C3),
    /// then immediately attempts match creation (C6) against whatever in
    /// this campaign is already vetted and ready, scoped to this campaign's
    /// own discovery budget. Enrichment (C4) and vetting (C5) stay on their
    /// own independently scheduled tasks — a discovery created by this run
    /// becomes match-creation-eligible on a later sweep once it's worked
    /// through them, the same path a manually-triggered discovery takes.
    async fn run_campaign_pipeline(&self, campaign_id: Uuid) -> Result<CampaignRunOutcome> {
        let campaign = self
            .store
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or_else(|| OutreachError::DataMissing(format!("campaign {campaign_id} not found")))?;
        let profile = self
            .store
            .client_profiles
            .get(campaign.person_id)
            .await?
            .ok_or_else(|| OutreachError::DataMissing(format!("client profile for {campaign_id} not found")))?;

        let remaining_matches = campaign.remaining_auto_discovery_matches(&profile);
        let discovery_budget = remaining_matches.min(MAX_DISCOVERIES_PER_SWEEP);

        let _ = self
            .store
            .campaigns
            .record_progress(
                campaign_id,
                &serde_json::json!({
                    "stage": "fetching_podcasts",
                    "discovery_budget": discovery_budget,
                }),
            )
            .await;

        let discoveries_created = self.fetcher.run(campaign_id, discovery_budget).await?;

        let match_outcome = self
            .match_creator
            .run_for_campaign(campaign_id, self.vetting_threshold, MAX_MATCHES_PER_SWEEP)
            .await?;

        Ok(CampaignRunOutcome {
            discoveries_created,
            matches_created: match_outcome.created,
            quota_exhausted: match_outcome.quota_exhausted || remaining_matches == 0,
        })
    }

    /// Crash recovery: reclaims campaigns stuck in `running` and campaigns
    /// stuck in `error` long enough to deserve another try. Safe to call on
    /// every sweep and at startup.
    pub async fn recover(&self) -> Result<()> {
        let reclaimed = self
            .store
            .campaigns
            .reset_stuck_running(HEARTBEAT_STALE_MINUTES, RUN_STALE_MINUTES)
            .await?;
        if reclaimed > 0 {
            info!(reclaimed, "reclaimed campaigns stuck in running");
        }
        let retried = self.store.campaigns.reset_stale_errors(ERROR_RETRY_HOURS).await?;
        if retried > 0 {
            info!(retried, "returned stale error campaigns to pending");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paid_plans_sort_before_free_plans() {
        let mut plans = vec![Plan::Free, Plan::PaidBasic, Plan::Free, Plan::PaidPremium];
        plans.sort_by_key(|p| p.is_free());
        assert!(!plans[0].is_free());
        assert!(!plans[1].is_free());
        assert!(plans[2].is_free());
        assert!(plans[3].is_free());
    }
}
