//! Background orchestration (C7, C8, C10): the task catalog and tick loop
//! that drive the pipeline's polling stages, the auto-discovery controller's
//! per-campaign state machine, and the health checker's repair passes.
//! Nothing in this crate talks to the outside world directly — it calls
//! into `outreach-pipeline` and `outreach-store`, which do.

pub mod catalog;
pub mod controller;
pub mod health;
pub mod tick;

pub use catalog::{default_catalog, ScheduleKind, TaskSpec};
pub use controller::AutoDiscoveryController;
pub use health::{HealthChecker, HealthReport, RevetReport};
pub use tick::{Scheduler, SchedulerBuilder};
