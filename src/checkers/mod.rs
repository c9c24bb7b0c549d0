//! File checkers.
//!
//! The grading pipeline stays exam-agnostic. Each expected file is validated
//! by a [`checker::Checker`] looked up by key in a [`registry::CheckerRegistry`].

pub mod checker;
pub mod registry;
pub mod sales_log;
pub mod schedule;
pub mod script;
pub mod service;
