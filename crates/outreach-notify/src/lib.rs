//! Client-facing notification fan-out (C9, client half): bridges the
//! pipeline's in-process event bus to WebSocket-connected clients, grouped
//! by `(user_id, campaign_id)`. Delivery is best-effort; a client that
//! misses an update while disconnected picks its current state back up
//! through the ordinary read APIs, not through this channel.

pub mod hub;
pub mod registry;
pub mod types;
pub mod ws;

pub use hub::NotifyHub;
pub use registry::ConnectionRegistry;
pub use types::{Notification, Priority};
pub use ws::{notifications_ws, Subscription};
