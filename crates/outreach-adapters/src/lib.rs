//! External podcast-directory integrations (C2): a uniform [`SourceAdapter`]
//! trait over ListenNotes-shaped and Podscan-shaped providers, plus an RSS
//! feed fallback for contact-email discovery.

pub mod error;
pub mod listen_notes;
pub mod mock;
pub mod podscan;
pub mod rss;
pub mod traits;

pub use error::{retry_with_backoff, AdapterError};
pub use listen_notes::ListenNotesAdapter;
pub use mock::MockAdapter;
pub use podscan::PodscanAdapter;
pub use rss::RssEmailDiscovery;
pub use traits::{RawEpisode, RawPodcast, SearchPage, SearchParams, SourceAdapter};
