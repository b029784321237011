//! ---
//! udm_section: "02-api-data-model"
//! udm_subsection: "module"
//! udm_type: "source"
//! udm_scope: "code"
//! udm_description: "Shared data model and external contracts for update coordination."
//! udm_version: "v0.0.0-prealpha"
//! udm_owner: "tbd"
//! ---
//! Manifest, action, and status types shared across the workspace.

use std::cmp::Ordering;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Identifier and version of one unit of software within a domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Component identifier, unique within its domain.
    pub id: String,
    /// Target or reported version.
    pub version: String,
}

/// Free-form configuration attached to domains and components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
    /// Configuration key.
    pub key: String,
    /// Configuration value, passed through verbatim.
    pub value: String,
}

/// A component together with its per-component configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentWithConfig {
    /// The targeted component.
    #[serde(flatten)]
    pub component: Component,
    /// Per-component configuration entries.
    #[serde(default)]
    pub config: Vec<KeyValuePair>,
}

/// Target state for a single domain within the desired-state manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    /// Domain name, administered by exactly one domain agent.
    pub id: String,
    /// Domain-level configuration entries.
    #[serde(default)]
    pub config: Vec<KeyValuePair>,
    /// Components targeted at this domain, in manifest order.
    #[serde(default)]
    pub components: Vec<ComponentWithConfig>,
}

/// Optional sub-grouping of components treated as one unit of installation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    /// Baseline title, referenced in per-baseline feedback.
    pub title: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Precondition expression, passed through unchanged.
    #[serde(default)]
    pub preconditions: String,
    /// Component identifiers grouped under this baseline.
    #[serde(default)]
    pub components: Vec<String>,
}

/// Declarative target for the whole device across all domains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    /// Baselines grouping components across the manifest.
    #[serde(default)]
    pub baselines: Vec<Baseline>,
    /// Per-domain target states, in manifest order.
    #[serde(default)]
    pub domains: Vec<Domain>,
}

impl DesiredState {
    /// Project the manifest into one sub-manifest per domain.
    ///
    /// A domain is emitted iff it targets at least one component. Ordering is
    /// stable: domains keep manifest order and each sub-manifest preserves
    /// the component order of the input.
    pub fn split_per_domains(&self) -> IndexMap<String, DesiredState> {
        let mut per_domain = IndexMap::new();
        for domain in &self.domains {
            if domain.components.is_empty() {
                continue;
            }
            per_domain.insert(
                domain.id.clone(),
                DesiredState {
                    baselines: Vec::new(),
                    domains: vec![domain.clone()],
                },
            );
        }
        per_domain
    }
}

/// Kind of change a domain agent plans for one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Install a component that is not present yet.
    Add,
    /// Replace an installed component with the target version.
    Update,
    /// Remove an installed component.
    Remove,
    /// Restore a component to its previous state.
    Restore,
    /// The change requires a device reboot to take effect.
    Reboot,
}

/// Per-component progress reported by a domain agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// The action was identified but not started.
    #[default]
    Identified,
    /// Artifact download in progress.
    Downloading,
    /// Artifact download finished.
    DownloadSuccess,
    /// Artifact download failed.
    DownloadFailure,
    /// Installation in progress.
    Updating,
    /// Installation finished.
    UpdateSuccess,
    /// Installation failed.
    UpdateFailure,
    /// Activation in progress.
    Activating,
    /// Activation finished.
    ActivationSuccess,
    /// Activation failed.
    ActivationFailure,
    /// Component removed.
    Removed,
    /// Component removal failed.
    RemovalFailure,
}

/// One planned or in-flight change for a single component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// The component this action applies to.
    pub component: Component,
    /// Kind of change.
    pub action_type: ActionType,
    /// Current progress of the action.
    #[serde(default)]
    pub status: ActionStatus,
    /// Progress percentage in the range 0..=100.
    #[serde(default)]
    pub progress: u8,
    /// Human-readable progress or failure message.
    #[serde(default)]
    pub message: String,
}

/// Per-domain and device-level statuses, totally ordered by [`StatusType::rank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusType {
    /// Identification of required actions is running.
    Identifying,
    /// All required actions were identified.
    Identified,
    /// Identification failed; terminal for the reporting domain.
    IdentificationFailed,
    /// The operation is suspended awaiting an owner-consent decision.
    WaitingForOwnerConsent,
    /// Baseline execution started.
    Running,
    /// Artifact download in progress.
    Downloading,
    /// All artifacts downloaded.
    Downloaded,
    /// Download failed; terminal for the reporting domain.
    DownloadFailure,
    /// Installation in progress.
    Updating,
    /// Installation finished.
    Updated,
    /// Installation failed; terminal for the reporting domain.
    UpdateFailure,
    /// Activation in progress.
    Activating,
    /// Activation finished.
    Activated,
    /// Activation failed; terminal for the reporting domain.
    ActivationFailure,
    /// The update activity finished successfully.
    Completed,
    /// The update activity finished with a failure.
    Incomplete,
    /// The update activity was superseded before completion.
    Superseded,
    /// Rollback of a partially applied baseline finished.
    RollbackSuccess,
    /// Rollback of a partially applied baseline failed.
    RollbackFailure,
    /// Post-operation cleanup finished.
    CleanupSuccess,
    /// Post-operation cleanup failed.
    CleanupFailure,
}

impl StatusType {
    /// Integer rank realising the total status order.
    ///
    /// Terminal failures rank above every progress status so that a failed
    /// domain never holds back the aggregate of the healthy ones; rollback
    /// and cleanup reports rank above the failures so a failed domain can
    /// still advance into them.
    pub const fn rank(self) -> u8 {
        match self {
            StatusType::Identifying => 0,
            StatusType::Identified => 1,
            StatusType::WaitingForOwnerConsent => 2,
            StatusType::Running => 3,
            StatusType::Downloading => 4,
            StatusType::Downloaded => 5,
            StatusType::Updating => 6,
            StatusType::Updated => 7,
            StatusType::Activating => 8,
            StatusType::Activated => 9,
            StatusType::Completed => 10,
            StatusType::IdentificationFailed => 11,
            StatusType::DownloadFailure => 12,
            StatusType::UpdateFailure => 13,
            StatusType::ActivationFailure => 14,
            StatusType::Incomplete => 15,
            StatusType::Superseded => 16,
            StatusType::RollbackSuccess => 17,
            StatusType::RollbackFailure => 18,
            StatusType::CleanupSuccess => 19,
            StatusType::CleanupFailure => 20,
        }
    }

    /// Whether this status terminally fails the reporting scope.
    pub const fn is_terminal_failure(self) -> bool {
        matches!(
            self,
            StatusType::IdentificationFailed
                | StatusType::DownloadFailure
                | StatusType::UpdateFailure
                | StatusType::ActivationFailure
                | StatusType::Incomplete
                | StatusType::Superseded
        )
    }
}

impl PartialOrd for StatusType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StatusType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// Commands dispatched to domain agents after identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    /// Download all artifacts of the identified actions.
    Download,
    /// Install the downloaded artifacts.
    Update,
    /// Activate the installed components.
    Activate,
    /// Revert a partially applied baseline.
    Rollback,
    /// Release resources held by the activity.
    Cleanup,
    /// The activity was cancelled by the caller; stop ongoing work.
    Cancel,
}

/// Status feedback for one domain or for the device as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredStateFeedback {
    /// Activity this feedback belongs to.
    pub activity_id: String,
    /// Baseline the feedback refers to; empty for whole-domain feedback.
    #[serde(default)]
    pub baseline: String,
    /// Reported status.
    pub status: StatusType,
    /// Failure reason or progress message.
    #[serde(default)]
    pub message: String,
    /// Latest known actions of the reporting scope.
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Owner decision on a pending consent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    /// The owner approved the pending command.
    Approved,
    /// The owner denied the pending command.
    Denied,
}

/// Consent request published before an irreversible phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerConsent {
    /// The command awaiting approval.
    pub command: CommandType,
    /// Actions that would be executed if the command is approved.
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Owner response to a previously published consent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerConsentFeedback {
    /// The owner's decision.
    pub status: ConsentStatus,
}
