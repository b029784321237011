//! ---
//! udm_section: "03-update-orchestration"
//! udm_subsection: "module"
//! udm_type: "source"
//! udm_scope: "code"
//! udm_description: "Concurrent orchestration of multi-domain device updates."
//! udm_version: "v0.0.0-prealpha"
//! udm_owner: "tbd"
//! ---
use std::fmt;

use udm_api::types::{CommandType, StatusType};

/// Coordinated steps of the ordered update sequence.
///
/// Every phase owns a coordination gate on the active operation. `Rollback`
/// is never part of the healthy sequence; it is entered only after a failure
/// and only for the domains that applied part of their baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdatePhase {
    /// Domain agents identify the actions required by the manifest.
    Identification,
    /// Artifacts are downloaded.
    Download,
    /// Downloaded artifacts are installed.
    Update,
    /// Installed components are activated.
    Activation,
    /// Partially applied baselines are reverted after a failure.
    Rollback,
    /// Activity resources are released; always the last phase.
    Cleanup,
}

impl UpdatePhase {
    /// Phases executed in order for a healthy operation.
    pub const ORDERED: [UpdatePhase; 5] = [
        UpdatePhase::Identification,
        UpdatePhase::Download,
        UpdatePhase::Update,
        UpdatePhase::Activation,
        UpdatePhase::Cleanup,
    ];

    /// Every phase owning a coordination gate, in no particular order.
    pub const ALL: [UpdatePhase; 6] = [
        UpdatePhase::Identification,
        UpdatePhase::Download,
        UpdatePhase::Update,
        UpdatePhase::Activation,
        UpdatePhase::Rollback,
        UpdatePhase::Cleanup,
    ];

    /// Device-level status announced when the phase is entered.
    pub const fn entry_status(self) -> Option<StatusType> {
        match self {
            UpdatePhase::Identification => Some(StatusType::Identifying),
            UpdatePhase::Download => Some(StatusType::Running),
            UpdatePhase::Update => Some(StatusType::Updating),
            UpdatePhase::Activation => Some(StatusType::Activating),
            UpdatePhase::Rollback | UpdatePhase::Cleanup => None,
        }
    }

    /// Per-domain status that completes the phase successfully.
    pub const fn success_status(self) -> StatusType {
        match self {
            UpdatePhase::Identification => StatusType::Identified,
            UpdatePhase::Download => StatusType::Downloaded,
            UpdatePhase::Update => StatusType::Updated,
            UpdatePhase::Activation => StatusType::Activated,
            UpdatePhase::Rollback => StatusType::RollbackSuccess,
            UpdatePhase::Cleanup => StatusType::CleanupSuccess,
        }
    }

    /// Per-domain status recorded when an agent invocation fails in this phase.
    pub const fn failure_status(self) -> StatusType {
        match self {
            UpdatePhase::Identification => StatusType::IdentificationFailed,
            UpdatePhase::Download => StatusType::DownloadFailure,
            UpdatePhase::Update => StatusType::UpdateFailure,
            UpdatePhase::Activation => StatusType::ActivationFailure,
            UpdatePhase::Rollback => StatusType::RollbackFailure,
            UpdatePhase::Cleanup => StatusType::CleanupFailure,
        }
    }

    /// Agent command driving the phase; identification uses `apply` instead.
    pub const fn command(self) -> Option<CommandType> {
        match self {
            UpdatePhase::Identification => None,
            UpdatePhase::Download => Some(CommandType::Download),
            UpdatePhase::Update => Some(CommandType::Update),
            UpdatePhase::Activation => Some(CommandType::Activate),
            UpdatePhase::Rollback => Some(CommandType::Rollback),
            UpdatePhase::Cleanup => Some(CommandType::Cleanup),
        }
    }

    /// Whether a domain status satisfies this phase's completion gate.
    ///
    /// Terminal failures never satisfy a gate; they travel through the error
    /// channel instead. Rollback and cleanup reports satisfy their phase on
    /// failure as well, since both outcomes terminate the wait.
    pub fn is_satisfied_by(self, status: StatusType) -> bool {
        !status.is_terminal_failure() && status.rank() >= self.success_status().rank()
    }
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdatePhase::Identification => "identification",
            UpdatePhase::Download => "download",
            UpdatePhase::Update => "update",
            UpdatePhase::Activation => "activation",
            UpdatePhase::Rollback => "rollback",
            UpdatePhase::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_sequence_ends_with_cleanup() {
        assert_eq!(UpdatePhase::ORDERED.first(), Some(&UpdatePhase::Identification));
        assert_eq!(UpdatePhase::ORDERED.last(), Some(&UpdatePhase::Cleanup));
        assert!(!UpdatePhase::ORDERED.contains(&UpdatePhase::Rollback));
    }

    #[test]
    fn gates_accept_success_and_later_statuses_only() {
        assert!(UpdatePhase::Download.is_satisfied_by(StatusType::Downloaded));
        assert!(UpdatePhase::Download.is_satisfied_by(StatusType::Activated));
        assert!(!UpdatePhase::Download.is_satisfied_by(StatusType::Downloading));
        assert!(!UpdatePhase::Download.is_satisfied_by(StatusType::DownloadFailure));
    }

    #[test]
    fn cleanup_gate_is_satisfied_by_both_outcomes() {
        assert!(UpdatePhase::Cleanup.is_satisfied_by(StatusType::CleanupSuccess));
        assert!(UpdatePhase::Cleanup.is_satisfied_by(StatusType::CleanupFailure));
        assert!(UpdatePhase::Rollback.is_satisfied_by(StatusType::RollbackFailure));
    }

    #[test]
    fn entry_statuses_match_the_announced_sequence() {
        assert_eq!(
            UpdatePhase::Download.entry_status(),
            Some(StatusType::Running)
        );
        assert_eq!(UpdatePhase::Cleanup.entry_status(), None);
        assert_eq!(UpdatePhase::Rollback.command(), Some(CommandType::Rollback));
        assert_eq!(UpdatePhase::Identification.command(), None);
    }
}
