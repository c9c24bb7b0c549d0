//! Configuration
//!
//! Corrector profiles, settings loading, and startup validation.

pub mod profiles;
pub mod settings;
pub mod types;
pub mod validator;
