//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (e.g., `core-service`, `core-sync`, `provider-local`).
//! Host applications can depend on `datasync-workspace` and enable the documented
//! features without needing to wire each crate individually.

#[cfg(feature = "local-provider")]
pub use core_service as service;

#[cfg(feature = "local-provider")]
pub use provider_local as local;

#[cfg(feature = "core-only")]
pub use core_sync as sync;
