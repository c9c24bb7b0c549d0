//! Safety and cleanup
//!
//! Run-scoped extraction roots, idempotent cleanup and signal-driven
//! interruption.

pub mod cleanup;
pub mod interrupt;
pub mod workspace;
