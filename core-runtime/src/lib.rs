//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the synchronization core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//! - Metrics aggregation
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the other crates depend on.
//! It establishes the logging conventions, the typed progress events a run
//! broadcasts, and the validated configuration a service is built from.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;

pub use error::{Error, Result};
