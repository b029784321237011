//! ---
//! udm_section: "01-core-functionality"
//! udm_subsection: "module"
//! udm_type: "source"
//! udm_scope: "code"
//! udm_description: "Shared runtime utilities: configuration and logging."
//! udm_version: "v0.0.0-prealpha"
//! udm_owner: "tbd"
//! ---
//! Shared runtime utilities for the update manager workspace.
//! This crate exposes configuration loading and tracing setup consumed by
//! the orchestration core and by the outer service layers.

pub mod config;
pub mod logging;

pub use config::{
    LoadedConfig, LoggingConfig, OrchestrationConfig, UpdateManagerConfig,
};
pub use logging::{activity_span, init_tracing, phase_span, LogFormat};
