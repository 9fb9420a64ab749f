//! Message processing pipeline.
//!
//! Each outer iteration:
//! 1. `MessageRouter::process_cycle()` scans the shared folder once
//! 2. Every `Instance` reads its routed queue
//! 3. `ItemStrategy` creates or updates a work item per message
//!
//! Per-message failures stay inside their instance.

pub mod instance;
pub mod runner;
pub mod strategy;

pub use instance::{InboxReport, Instance};
pub use runner::{IterationReport, Runner, RunnerSettings};
pub use strategy::{ItemOutcome, ItemStrategy};
