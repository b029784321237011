//! ---
//! udm_section: "02-api-data-model"
//! udm_subsection: "module"
//! udm_type: "source"
//! udm_scope: "code"
//! udm_description: "Shared data model and external contracts for update coordination."
//! udm_version: "v0.0.0-prealpha"
//! udm_owner: "tbd"
//! ---
//! Contracts between the orchestration core and its external collaborators.

use async_trait::async_trait;

use crate::types::{
    Action, CommandType, DesiredState, DesiredStateFeedback, OwnerConsent, OwnerConsentFeedback,
};

/// Unified interface implemented by every domain agent.
///
/// An agent administers exactly one domain. Invocation errors returned here
/// cover only the failure to start an operation; phase outcomes arrive
/// asynchronously as desired-state feedback.
#[async_trait]
pub trait UpdateAgent: Send + Sync {
    /// Name of the administered domain.
    fn name(&self) -> &str;

    /// Begin identification of the actions required to reach `desired_state`.
    async fn apply(&self, activity_id: &str, desired_state: &DesiredState) -> anyhow::Result<()>;

    /// Execute a phase command for the given activity and baseline.
    async fn command(
        &self,
        activity_id: &str,
        baseline: &str,
        command: CommandType,
    ) -> anyhow::Result<()>;

    /// Return the current software inventory of the domain.
    async fn get(&self, _activity_id: &str) -> anyhow::Result<Vec<Action>> {
        anyhow::bail!("inventory retrieval is not supported by this agent")
    }
}

/// Consumer of desired-state feedback events.
///
/// The orchestration core implements this for per-domain intake; callers
/// implement it to receive the aggregated device-level stream.
pub trait DesiredStateFeedbackHandler: Send + Sync {
    /// Handle one feedback event published for `domain`.
    fn handle_desired_state_feedback_event(&self, domain: &str, feedback: &DesiredStateFeedback);
}

/// Consumer of owner-consent decisions delivered by the transport layer.
pub trait OwnerConsentHandler: Send + Sync {
    /// Handle an owner decision for the given activity.
    ///
    /// `timestamp` is the epoch-millisecond publication time reported by the
    /// transport.
    fn handle_owner_consent_feedback(
        &self,
        activity_id: &str,
        timestamp: i64,
        feedback: &OwnerConsentFeedback,
    );
}

/// Client used to publish owner-consent requests.
#[async_trait]
pub trait OwnerConsentClient: Send + Sync {
    /// Publish a consent request describing the pending command.
    async fn send_owner_consent(
        &self,
        activity_id: &str,
        consent: &OwnerConsent,
    ) -> anyhow::Result<()>;
}

/// Hook performing the device reboot after a completed update.
#[async_trait]
pub trait RebootHandler: Send + Sync {
    /// Reboot the device. Implementations may never return.
    async fn reboot(&self) -> anyhow::Result<()>;
}
