//! Research pipeline engine: ingestion, planning, execution, resolution,
//! ranking, and review. Everything here is generic over the store traits so
//! the same code runs against Postgres in production and the in-memory store
//! in tests.

pub mod orchestrator;
pub mod payload;
pub mod pipeline;
pub mod planner;
pub mod ranking;
pub mod resolution;
pub mod review;
pub mod worker;

pub use orchestrator::{cancel_run, retry_run, start_run, CancelOutcome};
pub use planner::PlannerConfig;
pub use worker::{Worker, WorkerConfig};
