//! ---
//! udm_section: "03-update-orchestration"
//! udm_subsection: "module"
//! udm_type: "source"
//! udm_scope: "code"
//! udm_description: "Concurrent orchestration of multi-domain device updates."
//! udm_version: "v0.0.0-prealpha"
//! udm_owner: "tbd"
//! ---
//! Intake of per-domain feedback and owner-consent decisions.
//!
//! The transport layer routes events here without knowing about operation
//! internals. Events for unknown activities or domains are logged and
//! dropped; nothing in this module panics on malformed input.

use tracing::{debug, warn};
use udm_api::agent::{DesiredStateFeedbackHandler, OwnerConsentHandler};
use udm_api::types::{ConsentStatus, DesiredStateFeedback, OwnerConsentFeedback};

use crate::orchestrator::UpdateOrchestrator;

impl DesiredStateFeedbackHandler for UpdateOrchestrator {
    fn handle_desired_state_feedback_event(&self, domain: &str, feedback: &DesiredStateFeedback) {
        let Some(operation) = self.active_operation() else {
            debug!(
                domain = %domain,
                activity_id = %feedback.activity_id,
                "no active update operation; dropping feedback"
            );
            return;
        };
        if operation.activity_id() != feedback.activity_id {
            warn!(
                domain = %domain,
                activity_id = %feedback.activity_id,
                active = %operation.activity_id(),
                "feedback for unknown activity dropped"
            );
            return;
        }
        operation.handle_domain_feedback(domain, feedback, self.reboot_enabled());
    }
}

impl OwnerConsentHandler for UpdateOrchestrator {
    fn handle_owner_consent_feedback(
        &self,
        activity_id: &str,
        timestamp: i64,
        feedback: &OwnerConsentFeedback,
    ) {
        let Some(operation) = self.active_operation() else {
            debug!(activity_id, "no active update operation; dropping owner consent");
            return;
        };
        if operation.activity_id() != activity_id {
            warn!(
                activity_id,
                active = %operation.activity_id(),
                "owner consent for unknown activity dropped"
            );
            return;
        }
        debug!(activity_id, timestamp, decision = ?feedback.status, "owner consent received");
        operation.resolve_owner_consent(feedback.status == ConsentStatus::Approved);
    }
}
