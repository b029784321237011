//! ---
//! udm_section: "03-update-orchestration"
//! udm_subsection: "module"
//! udm_type: "source"
//! udm_scope: "code"
//! udm_description: "Concurrent orchestration of multi-domain device updates."
//! udm_version: "v0.0.0-prealpha"
//! udm_owner: "tbd"
//! ---
//! Update orchestration core.
//!
//! This crate drives a set of domain agents in lock-step through the ordered
//! update phases (identification, download, update, activation, cleanup),
//! aggregates their feedback into a single monotonic device-level status
//! stream, gates irreversible phases on owner consent, and coordinates
//! rollback and reboot handling. Transports, envelope parsing, and the
//! digital-twin surface live outside this crate; they reach the core through
//! the contracts defined in `udm-api`.

#![warn(missing_docs)]

pub mod errors;
pub mod orchestrator;
pub mod phase;

mod feedback;
mod operation;

pub use errors::OrchestrationError;
pub use orchestrator::UpdateOrchestrator;
pub use phase::UpdatePhase;
