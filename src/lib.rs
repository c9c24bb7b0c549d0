//! examgrade: batch grader for archived exam submissions
//! Extracts every candidate archive, locates the expected files, validates each
//! with its checker and reports one Passed/Failed/Errored line per candidate
//!
//! # Architecture
//!
//! ## Archives ([`archive`])
//! - Recursive discovery of `.tar`/`.tar.gz` submissions
//! - Extraction that reports failures instead of propagating them
//!
//! ## Grading Core ([`core`])
//! - [`core::locator`]: Deterministic expected-file lookup in a workspace
//! - [`core::processor`]: Type-state pipeline (locate, check, classify)
//! - [`core::batch`]: Worker pool, progress and guarded cleanup
//!
//! ## Checkers ([`checkers`])
//! - [`checkers::registry`]: Expected-file key to checker mapping
//! - [`checkers::schedule`]: Crontab validation
//! - [`checkers::sales_log`]: Sales log pattern validation
//! - [`checkers::script`]: Candidate script execution
//! - [`checkers::service`]: Candidate web service probing
//!
//! ## Execution Control ([`exec`])
//! - [`exec::runner`]: Bounded one-shot subprocesses
//! - [`exec::service`]: Long-lived services with SIGTERM/SIGKILL shutdown
//! - [`exec::ports`]: Per-port leases for services sharing fixed ports
//!
//! ## Safety & Cleanup ([`safety`])
//! - [`safety::workspace`]: Run-scoped extraction root
//! - [`safety::cleanup`]: Idempotent cleanup guard
//! - [`safety::interrupt`]: SIGINT/SIGTERM interruption flag
//!
//! ## Configuration ([`config`])
//! - [`config::profiles`]: Corrector profiles (expected files per exam)
//! - [`config::settings`]: Settings file and defaults
//! - [`config::validator`]: Fail-fast startup validation
//! - [`config::types`]: Shared result and error types
//!
//! ## Reporting ([`report`])
//! - Grid table and JSON export

pub mod archive;
pub mod checkers;
pub mod cli;
pub mod config;
pub mod core;
pub mod exec;
pub mod report;
pub mod safety;

pub use config::types::{CandidateResult, CandidateStatus, CheckOutcome, GradeError, Result};
