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

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use udm_api::agent::{DesiredStateFeedbackHandler, UpdateAgent};
use udm_api::types::{Action, ActionType, DesiredState, DesiredStateFeedback, StatusType};

use crate::errors::OrchestrationError;
use crate::phase::UpdatePhase;

/// Scope name used for aggregated device-level feedback.
pub(crate) const DEVICE: &str = "device";

/// In-memory record of a single in-flight update activity.
///
/// The operation is the only shared mutable object of the core. All status
/// and action bookkeeping happens under the internal lock; the lock is never
/// held across a channel send or an agent call. Gates are single-slot
/// channels: sends are non-blocking and duplicates are discarded.
pub(crate) struct UpdateOperation {
    activity_id: String,
    participants: IndexMap<String, Arc<dyn UpdateAgent>>,
    states_per_domain: IndexMap<String, DesiredState>,
    callback: Arc<dyn DesiredStateFeedbackHandler>,
    state: Mutex<OperationState>,
    phase_gates: HashMap<UpdatePhase, mpsc::Sender<bool>>,
    err_gate: mpsc::Sender<bool>,
    consent_gate: mpsc::Sender<bool>,
}

struct OperationState {
    status: StatusType,
    domains: IndexMap<String, StatusType>,
    /// Highest non-failure status each domain ever reported; drives rollback
    /// eligibility after a failure.
    reached: IndexMap<String, StatusType>,
    actions: IndexMap<String, IndexMap<String, Action>>,
    failure: Option<OrchestrationError>,
    current_phase: Option<UpdatePhase>,
    rollback_domains: Vec<String>,
    reboot_required: bool,
    last_emitted: Option<(StatusType, Vec<Action>)>,
}

/// Receive sides of the operation's single-slot gates, held by the
/// coordinator for the lifetime of the activity.
pub(crate) struct OperationWaiters {
    pub(crate) phase_gates: HashMap<UpdatePhase, mpsc::Receiver<bool>>,
    pub(crate) err_gate: mpsc::Receiver<bool>,
    pub(crate) consent_gate: mpsc::Receiver<bool>,
}

fn advance(slot: &mut StatusType, status: StatusType) -> bool {
    if status.rank() > slot.rank() {
        *slot = status;
        true
    } else {
        false
    }
}

impl UpdateOperation {
    pub(crate) fn new(
        agents: &HashMap<String, Arc<dyn UpdateAgent>>,
        activity_id: &str,
        desired_state: &DesiredState,
        callback: Arc<dyn DesiredStateFeedbackHandler>,
    ) -> Result<(Arc<Self>, OperationWaiters), OrchestrationError> {
        let mut participants = IndexMap::new();
        let mut states_per_domain = IndexMap::new();
        let mut domains = IndexMap::new();
        for (domain, state_per_domain) in desired_state.split_per_domains() {
            let Some(agent) = agents.get(&domain) else {
                warn!(domain = %domain, "cannot find update agent for domain");
                continue;
            };
            participants.insert(domain.clone(), Arc::clone(agent));
            states_per_domain.insert(domain.clone(), state_per_domain);
            domains.insert(domain, StatusType::Identifying);
        }
        if participants.is_empty() {
            return Err(OrchestrationError::NoSupportedDomain);
        }

        let mut phase_gates = HashMap::new();
        let mut phase_waiters = HashMap::new();
        for phase in UpdatePhase::ALL {
            let (tx, rx) = mpsc::channel(1);
            phase_gates.insert(phase, tx);
            phase_waiters.insert(phase, rx);
        }
        let (err_tx, err_rx) = mpsc::channel(1);
        let (consent_tx, consent_rx) = mpsc::channel(1);

        let reached = domains.clone();
        let operation = Arc::new(Self {
            activity_id: activity_id.to_owned(),
            participants,
            states_per_domain,
            callback,
            state: Mutex::new(OperationState {
                status: StatusType::Identifying,
                domains,
                reached,
                actions: IndexMap::new(),
                failure: None,
                current_phase: None,
                rollback_domains: Vec::new(),
                reboot_required: false,
                last_emitted: None,
            }),
            phase_gates,
            err_gate: err_tx,
            consent_gate: consent_tx,
        });
        let waiters = OperationWaiters {
            phase_gates: phase_waiters,
            err_gate: err_rx,
            consent_gate: consent_rx,
        };
        Ok((operation, waiters))
    }

    pub(crate) fn activity_id(&self) -> &str {
        &self.activity_id
    }

    pub(crate) fn participants(&self) -> &IndexMap<String, Arc<dyn UpdateAgent>> {
        &self.participants
    }

    pub(crate) fn sub_state(&self, domain: &str) -> Option<DesiredState> {
        self.states_per_domain.get(domain).cloned()
    }

    /// Monotonic device-status update; downgrades are silently dropped.
    pub(crate) fn update_status(&self, status: StatusType) -> bool {
        let mut state = self.state.lock();
        advance(&mut state.status, status)
    }

    pub(crate) fn failure(&self) -> Option<OrchestrationError> {
        self.state.lock().failure.clone()
    }

    fn has_failure(&self) -> bool {
        self.state.lock().failure.is_some()
    }

    /// Record the first failure of the operation and move it to `Incomplete`.
    pub(crate) fn record_failure(&self, error: &OrchestrationError) {
        let mut state = self.state.lock();
        if state.failure.is_none() {
            state.failure = Some(error.clone());
        }
        advance(&mut state.status, StatusType::Incomplete);
    }

    pub(crate) fn reboot_required(&self) -> bool {
        self.state.lock().reboot_required
    }

    /// Resolve the pending owner-consent wait. A duplicate decision is
    /// discarded by the single-slot gate.
    pub(crate) fn resolve_owner_consent(&self, approved: bool) {
        if self.consent_gate.try_send(approved).is_err() {
            debug!(activity_id = %self.activity_id, "duplicate owner consent decision dropped");
        }
    }

    fn signal_error(&self) {
        let _ = self.err_gate.try_send(true);
    }

    /// Enter a phase: arm its gate and re-evaluate it immediately so that
    /// feedback which arrived ahead of the coordinator is not lost.
    pub(crate) fn begin_phase(&self, phase: UpdatePhase) {
        {
            let mut state = self.state.lock();
            state.current_phase = Some(phase);
        }
        self.evaluate_phase_gate();
    }

    pub(crate) fn set_rollback_domains(&self, domains: Vec<String>) {
        self.state.lock().rollback_domains = domains;
    }

    /// Participants whose baseline progressed far enough to need reverting.
    pub(crate) fn rollback_candidates(&self) -> Vec<String> {
        let state = self.state.lock();
        state
            .reached
            .iter()
            .filter(|(_, status)| status.rank() >= StatusType::Downloaded.rank())
            .map(|(domain, _)| domain.clone())
            .collect()
    }

    /// Rollback participants that have not reported a rollback outcome yet.
    pub(crate) fn unfinished_rollbacks(&self) -> Vec<String> {
        let state = self.state.lock();
        state
            .rollback_domains
            .iter()
            .filter(|domain| {
                state
                    .domains
                    .get(*domain)
                    .is_some_and(|status| !UpdatePhase::Rollback.is_satisfied_by(*status))
            })
            .cloned()
            .collect()
    }

    /// Record an invocation failure for a domain as the phase's failure
    /// status; terminal failures also wake the error gate.
    pub(crate) fn mark_domain_failed(&self, domain: &str, phase: UpdatePhase, reason: &str) {
        let failure_status = phase.failure_status();
        let mut signal = false;
        {
            let mut state = self.state.lock();
            if let Some(slot) = state.domains.get_mut(domain) {
                advance(slot, failure_status);
            }
            if failure_status.is_terminal_failure() {
                if state.failure.is_none() {
                    state.failure = Some(OrchestrationError::DomainFailed {
                        domain: domain.to_owned(),
                        reason: reason.to_owned(),
                    });
                }
                signal = true;
            }
        }
        if signal {
            self.signal_error();
        }
        self.evaluate_phase_gate();
    }

    /// Intake of one per-domain feedback event (already matched against the
    /// active activity by the orchestrator).
    pub(crate) fn handle_domain_feedback(
        &self,
        domain: &str,
        feedback: &DesiredStateFeedback,
        reboot_enabled: bool,
    ) {
        if !self.participants.contains_key(domain) {
            warn!(
                domain = %domain,
                activity_id = %self.activity_id,
                "feedback from domain outside the active operation; dropping"
            );
            return;
        }
        let mut failed = false;
        {
            let mut state = self.state.lock();
            if reboot_enabled
                && feedback
                    .actions
                    .iter()
                    .any(|action| action.action_type == ActionType::Reboot)
            {
                state.reboot_required = true;
            }
            let entries: IndexMap<String, Action> = feedback
                .actions
                .iter()
                .map(|action| (action.component.id.clone(), action.clone()))
                .collect();
            state.actions.insert(domain.to_owned(), entries);

            if let Some(slot) = state.domains.get_mut(domain) {
                if advance(slot, feedback.status) {
                    debug!(domain = %domain, status = ?feedback.status, "domain status advanced");
                    if feedback.status.is_terminal_failure() {
                        if state.failure.is_none() {
                            let reason = if feedback.message.is_empty() {
                                format!("{:?}", feedback.status)
                            } else {
                                feedback.message.clone()
                            };
                            state.failure = Some(OrchestrationError::DomainFailed {
                                domain: domain.to_owned(),
                                reason,
                            });
                        }
                        failed = true;
                    } else if let Some(reached) = state.reached.get_mut(domain) {
                        advance(reached, feedback.status);
                    }
                } else {
                    debug!(
                        domain = %domain,
                        status = ?feedback.status,
                        "stale domain status dropped"
                    );
                }
            }
        }
        if failed {
            self.signal_error();
        } else if !self.has_failure() {
            // Device-level progress follows the least-advanced participant.
            // Terminal and post-completion statuses are announced by the
            // coordinator alone.
            let aggregate = self.aggregate_status();
            if aggregate.rank() < StatusType::Completed.rank() {
                self.update_status(aggregate);
            }
            self.emit_device_feedback(false);
        }
        self.evaluate_phase_gate();
    }

    /// Least-advanced status across all participants.
    pub(crate) fn aggregate_status(&self) -> StatusType {
        let state = self.state.lock();
        state
            .domains
            .values()
            .copied()
            .min()
            .unwrap_or(state.status)
    }

    /// Latest reported actions of all participants, in participant order and
    /// component-insertion order within a domain.
    pub(crate) fn collected_actions(&self) -> Vec<Action> {
        let state = self.state.lock();
        state
            .actions
            .values()
            .flat_map(|per_component| per_component.values().cloned())
            .collect()
    }

    /// Wake the coordinator if the current phase's completion condition holds.
    pub(crate) fn evaluate_phase_gate(&self) {
        let satisfied_phase = {
            let state = self.state.lock();
            let Some(phase) = state.current_phase else {
                return;
            };
            let satisfied = match phase {
                UpdatePhase::Rollback => state.rollback_domains.iter().all(|domain| {
                    state
                        .domains
                        .get(domain)
                        .is_some_and(|status| phase.is_satisfied_by(*status))
                }),
                _ => state
                    .domains
                    .values()
                    .all(|status| phase.is_satisfied_by(*status)),
            };
            satisfied.then_some(phase)
        };
        if let Some(phase) = satisfied_phase {
            if let Some(gate) = self.phase_gates.get(&phase) {
                let _ = gate.try_send(true);
            }
        }
    }

    /// Emit one aggregated device-level feedback event.
    ///
    /// Unforced emissions are suppressed unless the device status or the
    /// collected action set changed since the previous emission; the terminal
    /// emission is always forced.
    pub(crate) fn emit_device_feedback(&self, forced: bool) {
        let event = {
            let mut state = self.state.lock();
            let actions: Vec<Action> = state
                .actions
                .values()
                .flat_map(|per_component| per_component.values().cloned())
                .collect();
            let status = state.status;
            let changed = state
                .last_emitted
                .as_ref()
                .map_or(true, |(last_status, last_actions)| {
                    *last_status != status || *last_actions != actions
                });
            if !forced && !changed {
                return;
            }
            state.last_emitted = Some((status, actions.clone()));
            DesiredStateFeedback {
                activity_id: self.activity_id.clone(),
                baseline: String::new(),
                status,
                message: state
                    .failure
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                actions,
            }
        };
        self.callback
            .handle_desired_state_feedback_event(DEVICE, &event);
    }

    #[cfg(test)]
    pub(crate) fn domain_status(&self, domain: &str) -> Option<StatusType> {
        self.state.lock().domains.get(domain).copied()
    }

    #[cfg(test)]
    pub(crate) fn status(&self) -> StatusType {
        self.state.lock().status
    }
}
