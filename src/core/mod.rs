//! Exam-agnostic grading core.
//!
//! Core owns the per-candidate pipeline (locate, check, classify) and the
//! batch orchestration around it. What makes a file valid lives in
//! checkers.

pub mod batch;
pub mod locator;
pub mod processor;
pub mod types;
