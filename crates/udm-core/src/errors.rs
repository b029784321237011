//! ---
//! udm_section: "03-update-orchestration"
//! udm_subsection: "module"
//! udm_type: "source"
//! udm_scope: "code"
//! udm_description: "Concurrent orchestration of multi-domain device updates."
//! udm_version: "v0.0.0-prealpha"
//! udm_owner: "tbd"
//! ---
use thiserror::Error;

use crate::phase::UpdatePhase;

/// Failure kinds surfaced in the message field of aggregated feedback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestrationError {
    /// The manifest targets no domain known to the agent registry.
    #[error("the desired state manifest does not contain any supported domain")]
    NoSupportedDomain,
    /// A new activity was requested while another one is still active.
    #[error("another update operation is already in progress")]
    UpdateAlreadyInProgress,
    /// A phase did not complete within the configured phase timeout.
    #[error("phase {0} timed out")]
    PhaseTimedOut(UpdatePhase),
    /// The owner denied the pending command.
    #[error("owner consent denied")]
    OwnerConsentDenied,
    /// No owner decision arrived within the configured consent timeout.
    #[error("owner consent timed out")]
    OwnerConsentTimedOut,
    /// A participant reported a terminal failure.
    #[error("domain {domain} failed: {reason}")]
    DomainFailed {
        /// The failing domain.
        domain: String,
        /// The failure reason reported by the domain agent.
        reason: String,
    },
    /// The caller cancelled the operation.
    #[error("update operation cancelled")]
    Cancelled,
    /// A rollback command did not terminate within the phase timeout.
    #[error("rollback did not complete for domain {0}")]
    RollbackFailed(String),
    /// The owner-consent request could not be published.
    #[error("cannot request owner consent: {0}")]
    ConsentRequestFailed(String),
}
