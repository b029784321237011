//! ---
//! udm_section: "03-update-orchestration"
//! udm_subsection: "module"
//! udm_type: "source"
//! udm_scope: "code"
//! udm_description: "Concurrent orchestration of multi-domain device updates."
//! udm_version: "v0.0.0-prealpha"
//! udm_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};
use udm_api::agent::{
    DesiredStateFeedbackHandler, OwnerConsentClient, RebootHandler, UpdateAgent,
};
use udm_api::types::{CommandType, DesiredState, DesiredStateFeedback, OwnerConsent, StatusType};
use udm_common::config::OrchestrationConfig;
use udm_common::logging::{activity_span, phase_span};

use crate::errors::OrchestrationError;
use crate::operation::{OperationWaiters, UpdateOperation, DEVICE};
use crate::phase::UpdatePhase;

/// Entry point coordinating one update activity at a time.
///
/// The orchestrator splits a desired-state manifest across the registered
/// domain agents, drives all participants through the ordered phases, pauses
/// at the owner-consent checkpoints, aggregates per-domain feedback into a
/// device-level stream, and performs rollback and reboot handling.
pub struct UpdateOrchestrator {
    cfg: OrchestrationConfig,
    consent_client: Option<Arc<dyn OwnerConsentClient>>,
    reboot_handler: Option<Arc<dyn RebootHandler>>,
    operation: Mutex<Option<Arc<UpdateOperation>>>,
}

impl UpdateOrchestrator {
    /// Create an orchestrator with the given policy configuration.
    pub fn new(cfg: OrchestrationConfig) -> Self {
        Self {
            cfg,
            consent_client: None,
            reboot_handler: None,
            operation: Mutex::new(None),
        }
    }

    /// Attach the client used to publish owner-consent requests.
    #[must_use]
    pub fn with_consent_client(mut self, client: Arc<dyn OwnerConsentClient>) -> Self {
        self.consent_client = Some(client);
        self
    }

    /// Attach the hook performing the device reboot after completed updates.
    #[must_use]
    pub fn with_reboot_handler(mut self, handler: Arc<dyn RebootHandler>) -> Self {
        self.reboot_handler = Some(handler);
        self
    }

    /// Apply a desired-state manifest across the registered domain agents.
    ///
    /// Runs synchronously with respect to the caller until the activity
    /// terminates and returns whether it completed successfully. Exactly one
    /// terminal feedback (`Completed` or `Incomplete`) is emitted per call.
    /// A second call while an activity is active is rejected with
    /// `UpdateAlreadyInProgress`; the activity stays active through the
    /// reboot delay and the reboot hook, so the rejection also covers that
    /// window.
    pub async fn apply(
        &self,
        token: CancellationToken,
        agents: &HashMap<String, Arc<dyn UpdateAgent>>,
        activity_id: &str,
        desired_state: &DesiredState,
        callback: Arc<dyn DesiredStateFeedbackHandler>,
    ) -> bool {
        let (operation, mut waiters) =
            match self.setup_operation(agents, activity_id, desired_state, Arc::clone(&callback)) {
                Ok(pair) => pair,
                Err(error) => {
                    warn!(activity_id, error = %error, "rejecting update request");
                    callback.handle_desired_state_feedback_event(
                        DEVICE,
                        &DesiredStateFeedback {
                            activity_id: activity_id.to_owned(),
                            baseline: String::new(),
                            status: StatusType::Incomplete,
                            message: error.to_string(),
                            actions: Vec::new(),
                        },
                    );
                    return false;
                }
            };
        let success = async {
            info!(
                participants = operation.participants().len(),
                "starting update operation"
            );
            let success = self.execute(&token, &operation, &mut waiters).await;
            if success {
                self.reboot_if_required(&operation).await;
            }
            success
        }
        .instrument(activity_span(activity_id))
        .await;
        self.dispose_operation();
        success
    }

    fn setup_operation(
        &self,
        agents: &HashMap<String, Arc<dyn UpdateAgent>>,
        activity_id: &str,
        desired_state: &DesiredState,
        callback: Arc<dyn DesiredStateFeedbackHandler>,
    ) -> Result<(Arc<UpdateOperation>, OperationWaiters), OrchestrationError> {
        let mut slot = self.operation.lock();
        if slot.is_some() {
            return Err(OrchestrationError::UpdateAlreadyInProgress);
        }
        let (operation, waiters) =
            UpdateOperation::new(agents, activity_id, desired_state, callback)?;
        *slot = Some(Arc::clone(&operation));
        Ok((operation, waiters))
    }

    fn dispose_operation(&self) {
        *self.operation.lock() = None;
    }

    pub(crate) fn active_operation(&self) -> Option<Arc<UpdateOperation>> {
        self.operation.lock().clone()
    }

    pub(crate) fn reboot_enabled(&self) -> bool {
        self.cfg.reboot_enabled
    }

    async fn execute(
        &self,
        token: &CancellationToken,
        operation: &Arc<UpdateOperation>,
        waiters: &mut OperationWaiters,
    ) -> bool {
        operation.emit_device_feedback(true);
        let mut outcome = self.run_update_phases(token, operation, waiters).await;
        if let Err(error) = &outcome {
            warn!(error = %error, "update operation failed; starting recovery");
            operation.record_failure(error);
            if matches!(error, OrchestrationError::Cancelled) {
                self.notify_cancel(operation);
            } else {
                self.run_rollback(operation, waiters)
                    .instrument(phase_span(UpdatePhase::Rollback))
                    .await;
            }
        }
        if let Err(error) = self
            .run_cleanup(operation, waiters)
            .instrument(phase_span(UpdatePhase::Cleanup))
            .await
        {
            if outcome.is_ok() {
                operation.record_failure(&error);
                outcome = Err(error);
            } else {
                warn!(error = %error, "cleanup did not terminate");
            }
        }
        if outcome.is_ok() {
            operation.update_status(StatusType::Completed);
        }
        operation.emit_device_feedback(true);
        info!(success = outcome.is_ok(), "update operation finished");
        outcome.is_ok()
    }

    async fn run_update_phases(
        &self,
        token: &CancellationToken,
        operation: &Arc<UpdateOperation>,
        waiters: &mut OperationWaiters,
    ) -> Result<(), OrchestrationError> {
        for phase in UpdatePhase::ORDERED {
            if phase == UpdatePhase::Cleanup {
                // cleanup always runs, also after failures; see execute()
                break;
            }
            async {
                if let Some(command) = phase.command() {
                    if self.cfg.owner_consent_commands.contains(&command) {
                        self.await_owner_consent(command, token, operation, waiters)
                            .await?;
                    }
                }
                if let Some(entry) = phase.entry_status() {
                    if operation.update_status(entry) {
                        operation.emit_device_feedback(false);
                    }
                }
                operation.begin_phase(phase);
                self.dispatch_phase(phase, operation);
                self.await_phase_gate(phase, token, operation, waiters).await
            }
            .instrument(phase_span(phase))
            .await?;
            debug!(phase = %phase, "phase completed");
        }
        Ok(())
    }

    fn dispatch_phase(&self, phase: UpdatePhase, operation: &Arc<UpdateOperation>) {
        match phase.command() {
            None => {
                for (domain, agent) in operation.participants() {
                    let Some(state_per_domain) = operation.sub_state(domain) else {
                        continue;
                    };
                    let domain = domain.clone();
                    let agent = Arc::clone(agent);
                    let operation = Arc::clone(operation);
                    tokio::spawn(
                        async move {
                            debug!(domain = %domain, "dispatching apply");
                            if let Err(error) =
                                agent.apply(operation.activity_id(), &state_per_domain).await
                            {
                                warn!(domain = %domain, error = %error, "agent apply invocation failed");
                                operation.mark_domain_failed(&domain, phase, &error.to_string());
                            }
                        }
                        .instrument(Span::current()),
                    );
                }
            }
            Some(command) => {
                let domains: Vec<String> = operation.participants().keys().cloned().collect();
                self.dispatch_command(command, Some(phase), operation, &domains);
            }
        }
    }

    fn dispatch_command(
        &self,
        command: CommandType,
        phase: Option<UpdatePhase>,
        operation: &Arc<UpdateOperation>,
        domains: &[String],
    ) {
        for domain in domains {
            let Some(agent) = operation.participants().get(domain) else {
                continue;
            };
            let agent = Arc::clone(agent);
            let domain = domain.clone();
            let operation = Arc::clone(operation);
            tokio::spawn(
                async move {
                    debug!(domain = %domain, command = ?command, "dispatching command");
                    if let Err(error) = agent.command(operation.activity_id(), "", command).await {
                        warn!(
                            domain = %domain,
                            command = ?command,
                            error = %error,
                            "agent command invocation failed"
                        );
                        if let Some(phase) = phase {
                            operation.mark_domain_failed(&domain, phase, &error.to_string());
                        }
                    }
                }
                .instrument(Span::current()),
            );
        }
    }

    async fn await_phase_gate(
        &self,
        phase: UpdatePhase,
        token: &CancellationToken,
        operation: &Arc<UpdateOperation>,
        waiters: &mut OperationWaiters,
    ) -> Result<(), OrchestrationError> {
        let gate = waiters
            .phase_gates
            .get_mut(&phase)
            .expect("every phase owns a gate");
        tokio::select! {
            biased;
            _ = waiters.err_gate.recv() => Err(stored_failure(operation)),
            _ = token.cancelled() => Err(OrchestrationError::Cancelled),
            _ = gate.recv() => Ok(()),
            _ = sleep(self.cfg.phase_timeout) => Err(OrchestrationError::PhaseTimedOut(phase)),
        }
    }

    async fn await_owner_consent(
        &self,
        command: CommandType,
        token: &CancellationToken,
        operation: &Arc<UpdateOperation>,
        waiters: &mut OperationWaiters,
    ) -> Result<(), OrchestrationError> {
        let Some(client) = self.consent_client.as_ref() else {
            return Err(OrchestrationError::ConsentRequestFailed(
                "no owner consent client configured".into(),
            ));
        };
        if operation.update_status(StatusType::WaitingForOwnerConsent) {
            operation.emit_device_feedback(false);
        }
        let consent = OwnerConsent {
            command,
            actions: operation.collected_actions(),
        };
        info!(command = ?command, "requesting owner consent");
        client
            .send_owner_consent(operation.activity_id(), &consent)
            .await
            .map_err(|error| OrchestrationError::ConsentRequestFailed(error.to_string()))?;
        tokio::select! {
            biased;
            _ = waiters.err_gate.recv() => Err(stored_failure(operation)),
            _ = token.cancelled() => Err(OrchestrationError::Cancelled),
            decision = waiters.consent_gate.recv() => match decision {
                Some(true) => {
                    info!("owner approved the update");
                    Ok(())
                }
                _ => Err(OrchestrationError::OwnerConsentDenied),
            },
            _ = sleep(self.cfg.owner_consent_timeout) => Err(OrchestrationError::OwnerConsentTimedOut),
        }
    }

    async fn run_rollback(&self, operation: &Arc<UpdateOperation>, waiters: &mut OperationWaiters) {
        let candidates = operation.rollback_candidates();
        if candidates.is_empty() {
            debug!("no domain requires rollback");
            return;
        }
        info!(domains = ?candidates, "rolling back partially applied domains");
        operation.set_rollback_domains(candidates.clone());
        operation.begin_phase(UpdatePhase::Rollback);
        self.dispatch_command(
            CommandType::Rollback,
            Some(UpdatePhase::Rollback),
            operation,
            &candidates,
        );
        let gate = waiters
            .phase_gates
            .get_mut(&UpdatePhase::Rollback)
            .expect("every phase owns a gate");
        tokio::select! {
            _ = gate.recv() => {
                debug!("rollback finished");
            }
            _ = sleep(self.cfg.phase_timeout) => {
                for domain in operation.unfinished_rollbacks() {
                    let error = OrchestrationError::RollbackFailed(domain.clone());
                    warn!(domain = %domain, error = %error, "rollback incomplete");
                }
            }
        }
    }

    async fn run_cleanup(
        &self,
        operation: &Arc<UpdateOperation>,
        waiters: &mut OperationWaiters,
    ) -> Result<(), OrchestrationError> {
        operation.begin_phase(UpdatePhase::Cleanup);
        let domains: Vec<String> = operation.participants().keys().cloned().collect();
        self.dispatch_command(
            CommandType::Cleanup,
            Some(UpdatePhase::Cleanup),
            operation,
            &domains,
        );
        let gate = waiters
            .phase_gates
            .get_mut(&UpdatePhase::Cleanup)
            .expect("every phase owns a gate");
        tokio::select! {
            _ = gate.recv() => Ok(()),
            _ = sleep(self.cfg.phase_timeout) => {
                Err(OrchestrationError::PhaseTimedOut(UpdatePhase::Cleanup))
            }
        }
    }

    fn notify_cancel(&self, operation: &Arc<UpdateOperation>) {
        let domains: Vec<String> = operation.participants().keys().cloned().collect();
        self.dispatch_command(CommandType::Cancel, None, operation, &domains);
    }

    async fn reboot_if_required(&self, operation: &Arc<UpdateOperation>) {
        if !operation.reboot_required() {
            return;
        }
        let Some(handler) = self.reboot_handler.as_ref() else {
            warn!("reboot required but no reboot handler configured");
            return;
        };
        info!(delay = ?self.cfg.reboot_after, "update requires reboot");
        sleep(self.cfg.reboot_after).await;
        if let Err(error) = handler.reboot().await {
            error!(error = %error, "reboot request failed");
        }
    }
}

fn stored_failure(operation: &UpdateOperation) -> OrchestrationError {
    operation
        .failure()
        .unwrap_or_else(|| OrchestrationError::DomainFailed {
            domain: "unknown".into(),
            reason: "unreported failure".into(),
        })
}
