//! Monitoring engine module - the background worker behind every check
//!
//! This module is responsible for:
//! - Validating raw check records
//! - Probing HTTP/HTTPS targets with a per-check timeout
//! - Deciding up/down state and whether to alert
//! - Scheduling the probe and log rotation sweeps

pub mod checker;
pub mod executor;
pub mod processor;
pub mod scheduler;
pub mod types;
pub mod validation;

pub use checker::{Checker, HttpChecker};
pub use executor::{MonitoringExecutor, SweepSummary};
pub use processor::OutcomeProcessor;
pub use scheduler::WorkerScheduler;
pub use types::{Check, CheckOutcome, CheckState, LogEntry};
pub use validation::{ValidationError, validate_check_data};
