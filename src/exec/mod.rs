//! Process execution for checkers
//!
//! Bounded one-shot runs, long-lived services, and the port leases that
//! serialize services sharing a fixed port.

pub mod ports;
pub mod runner;
pub mod service;
