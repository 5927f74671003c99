//! Transactional persistence for the outreach pipeline (C1).
//!
//! Each entity gets its own typed store module; [`Store`] bundles them behind
//! a single handle so callers that need more than one table (the pipeline,
//! the scheduler) don't have to thread five pool-backed structs around.

pub mod campaigns;
pub mod client_profiles;
pub mod discoveries;
pub mod episodes;
pub mod matches;
pub mod media;
pub mod pool;
pub mod review_tasks;

pub use campaigns::CampaignStore;
pub use client_profiles::ClientProfileStore;
pub use discoveries::DiscoveryStore;
pub use episodes::{EpisodeStore, NewEpisode};
pub use matches::{CreateMatchOutcome, MatchStore, NewMatch};
pub use media::{MediaStore, NewMedia};
pub use review_tasks::{HydratedReviewTask, MatchSuggestionLoader, ReviewTaskStore};

use async_graphql::dataloader::DataLoader;
use outreach_common::{Config, Result};
use sqlx::PgPool;

/// Every entity store, backed by one `PgPool`. Cheaply cloneable.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    pub campaigns: CampaignStore,
    pub media: MediaStore,
    pub episodes: EpisodeStore,
    pub discoveries: DiscoveryStore,
    pub matches: MatchStore,
    pub review_tasks: ReviewTaskStore,
    pub client_profiles: ClientProfileStore,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self {
            campaigns: CampaignStore::new(pool.clone()),
            media: MediaStore::new(pool.clone()),
            episodes: EpisodeStore::new(pool.clone()),
            discoveries: DiscoveryStore::new(pool.clone()),
            matches: MatchStore::new(pool.clone()),
            review_tasks: ReviewTaskStore::new(pool.clone()),
            client_profiles: ClientProfileStore::new(pool.clone()),
            pool,
        }
    }

    /// Cheapest possible liveness check: round-trips the pool without
    /// touching any table. Backs the HTTP `/health` endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Connects the foreground (request-serving) pool and runs migrations.
    /// The background pool is constructed separately by whichever binary
    /// role needs it (scheduler, controller) via [`pool::connect_background`]
    /// — the two must never share a pool.
    pub async fn connect_foreground(config: &Config) -> Result<Self> {
        let pool = pool::connect_foreground(config).await?;
        pool::migrate(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn connect_background(config: &Config) -> Result<Self> {
        let pool = pool::connect_background(config).await?;
        Ok(Self::new(pool))
    }

    /// A fresh batching loader for hydrating match-suggestion payloads onto
    /// a page of review tasks. Cheap to build per call: it holds nothing but
    /// a cloned `MatchStore`, and batches only the keys requested within the
    /// `load_many` call it backs.
    pub fn match_suggestion_loader(&self) -> DataLoader<MatchSuggestionLoader> {
        DataLoader::new(
            MatchSuggestionLoader { store: self.matches.clone() },
            tokio::spawn,
        )
    }
}
