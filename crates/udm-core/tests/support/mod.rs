//! ---
//! udm_section: "03-update-orchestration"
//! udm_subsection: "module"
//! udm_type: "source"
//! udm_scope: "code"
//! udm_description: "Concurrent orchestration of multi-domain device updates."
//! udm_version: "v0.0.0-prealpha"
//! udm_owner: "tbd"
//! ---
//! Scripted in-memory collaborators shared by the orchestrator tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use udm_api::agent::{
    DesiredStateFeedbackHandler, OwnerConsentClient, RebootHandler, UpdateAgent,
};
use udm_api::types::{
    Action, ActionType, CommandType, Component, ComponentWithConfig, ConsentStatus, DesiredState,
    DesiredStateFeedback, Domain, OwnerConsent, OwnerConsentFeedback, StatusType,
};
use udm_common::config::OrchestrationConfig;
use udm_core::UpdateOrchestrator;

/// Orchestration configuration with timeouts suited for tests.
pub fn test_config() -> OrchestrationConfig {
    OrchestrationConfig {
        reboot_enabled: false,
        reboot_after: Duration::ZERO,
        phase_timeout: Duration::from_secs(2),
        owner_consent_commands: Vec::new(),
        owner_consent_timeout: Duration::from_secs(2),
    }
}

/// Build a manifest targeting one component per listed domain.
pub fn desired_state(domains: &[&str]) -> DesiredState {
    DesiredState {
        baselines: Vec::new(),
        domains: domains
            .iter()
            .map(|domain| Domain {
                id: (*domain).to_owned(),
                config: Vec::new(),
                components: vec![ComponentWithConfig {
                    component: Component {
                        id: format!("{domain}-service"),
                        version: "2.0.0".into(),
                    },
                    config: Vec::new(),
                }],
            })
            .collect(),
    }
}

/// An action updating the named component.
pub fn update_action(component: &str) -> Action {
    Action {
        component: Component {
            id: component.to_owned(),
            version: "2.0.0".into(),
        },
        action_type: ActionType::Update,
        status: Default::default(),
        progress: 0,
        message: String::new(),
    }
}

/// An action flagging that the device must reboot.
pub fn reboot_action(component: &str) -> Action {
    Action {
        action_type: ActionType::Reboot,
        ..update_action(component)
    }
}

pub fn registry(agents: &[Arc<ScriptedAgent>]) -> HashMap<String, Arc<dyn UpdateAgent>> {
    agents
        .iter()
        .map(|agent| {
            (
                agent.name().to_owned(),
                Arc::clone(agent) as Arc<dyn UpdateAgent>,
            )
        })
        .collect()
}

/// Callback recording every aggregated feedback event.
#[derive(Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<(String, DesiredStateFeedback)>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(String, DesiredStateFeedback)> {
        self.events.lock().clone()
    }

    pub fn statuses(&self) -> Vec<StatusType> {
        self.events
            .lock()
            .iter()
            .map(|(_, feedback)| feedback.status)
            .collect()
    }

    pub fn last(&self) -> Option<DesiredStateFeedback> {
        self.events.lock().last().map(|(_, feedback)| feedback.clone())
    }
}

impl DesiredStateFeedbackHandler for RecordingCallback {
    fn handle_desired_state_feedback_event(&self, domain: &str, feedback: &DesiredStateFeedback) {
        self.events
            .lock()
            .push((domain.to_owned(), feedback.clone()));
    }
}

/// Assert the device-level status stream is monotonic, allowing only the
/// final transition into `Incomplete`.
pub fn assert_monotonic(statuses: &[StatusType]) {
    for (index, pair) in statuses.windows(2).enumerate() {
        if pair[1] == StatusType::Incomplete {
            assert_eq!(
                index + 2,
                statuses.len(),
                "Incomplete must be the terminal status: {statuses:?}"
            );
            continue;
        }
        assert!(
            pair[0].rank() <= pair[1].rank(),
            "status stream regressed from {:?} to {:?}: {statuses:?}",
            pair[0],
            pair[1]
        );
    }
}

/// One scripted feedback response emitted by a [`ScriptedAgent`].
#[derive(Clone)]
pub struct Response {
    pub status: StatusType,
    pub message: String,
    pub actions: Vec<Action>,
    pub delay: Duration,
}

/// A successful progress report.
pub fn report(status: StatusType) -> Response {
    Response {
        status,
        message: String::new(),
        actions: Vec::new(),
        delay: Duration::ZERO,
    }
}

/// A report carrying actions.
pub fn report_with_actions(status: StatusType, actions: Vec<Action>) -> Response {
    Response {
        actions,
        ..report(status)
    }
}

/// A failure report with a reason.
pub fn failure_report(status: StatusType, message: &str) -> Response {
    Response {
        message: message.to_owned(),
        ..report(status)
    }
}

/// A report emitted after a delay.
pub fn delayed_report(status: StatusType, delay: Duration) -> Response {
    Response {
        delay,
        ..report(status)
    }
}

/// Invocations observed by a scripted agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    Apply,
    Command(CommandType),
}

/// Domain agent double feeding scripted feedback back into the orchestrator.
pub struct ScriptedAgent {
    domain: String,
    sink: Mutex<Option<Arc<UpdateOrchestrator>>>,
    on_apply: Mutex<Vec<Response>>,
    on_command: Mutex<HashMap<CommandType, Vec<Response>>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedAgent {
    pub fn new(domain: &str) -> Arc<Self> {
        Arc::new(Self {
            domain: domain.to_owned(),
            sink: Mutex::new(None),
            on_apply: Mutex::new(Vec::new()),
            on_command: Mutex::new(HashMap::new()),
            invocations: Mutex::new(Vec::new()),
        })
    }

    /// An agent that walks every phase successfully.
    pub fn happy(domain: &str) -> Arc<Self> {
        let agent = Self::new(domain);
        agent.script_apply(vec![report(StatusType::Identified)]);
        agent.script_command(
            CommandType::Download,
            vec![
                report(StatusType::Downloading),
                report(StatusType::Downloaded),
            ],
        );
        agent.script_command(
            CommandType::Update,
            vec![report(StatusType::Updating), report(StatusType::Updated)],
        );
        agent.script_command(
            CommandType::Activate,
            vec![report(StatusType::Activating), report(StatusType::Activated)],
        );
        agent.script_command(CommandType::Rollback, vec![report(StatusType::RollbackSuccess)]);
        agent.script_command(CommandType::Cleanup, vec![report(StatusType::CleanupSuccess)]);
        agent
    }

    /// Wire the agent to the orchestrator it reports feedback to.
    pub fn attach(&self, sink: Arc<UpdateOrchestrator>) {
        *self.sink.lock() = Some(sink);
    }

    pub fn script_apply(&self, responses: Vec<Response>) {
        *self.on_apply.lock() = responses;
    }

    pub fn script_command(&self, command: CommandType, responses: Vec<Response>) {
        self.on_command.lock().insert(command, responses);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    pub fn received(&self, invocation: Invocation) -> bool {
        self.invocations.lock().contains(&invocation)
    }

    async fn replay(&self, activity_id: &str, responses: Vec<Response>) {
        let sink = self.sink.lock().clone();
        let Some(sink) = sink else {
            panic!("scripted agent {} used before attach()", self.domain);
        };
        for response in responses {
            if !response.delay.is_zero() {
                tokio::time::sleep(response.delay).await;
            }
            sink.handle_desired_state_feedback_event(
                &self.domain,
                &DesiredStateFeedback {
                    activity_id: activity_id.to_owned(),
                    baseline: String::new(),
                    status: response.status,
                    message: response.message.clone(),
                    actions: response.actions.clone(),
                },
            );
        }
    }
}

#[async_trait]
impl UpdateAgent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.domain
    }

    async fn apply(&self, activity_id: &str, _: &DesiredState) -> anyhow::Result<()> {
        self.invocations.lock().push(Invocation::Apply);
        let responses = self.on_apply.lock().clone();
        self.replay(activity_id, responses).await;
        Ok(())
    }

    async fn command(
        &self,
        activity_id: &str,
        _: &str,
        command: CommandType,
    ) -> anyhow::Result<()> {
        self.invocations.lock().push(Invocation::Command(command));
        let responses = self
            .on_command
            .lock()
            .get(&command)
            .cloned()
            .unwrap_or_default();
        self.replay(activity_id, responses).await;
        Ok(())
    }
}

/// Consent client recording requests and optionally answering them.
pub struct RecordingConsentClient {
    sink: Mutex<Option<Arc<UpdateOrchestrator>>>,
    decision: Option<ConsentStatus>,
    requests: Mutex<Vec<(String, OwnerConsent)>>,
}

impl RecordingConsentClient {
    /// `decision` of `None` leaves every request unanswered.
    pub fn new(decision: Option<ConsentStatus>) -> Arc<Self> {
        Arc::new(Self {
            sink: Mutex::new(None),
            decision,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn attach(&self, sink: Arc<UpdateOrchestrator>) {
        *self.sink.lock() = Some(sink);
    }

    pub fn requests(&self) -> Vec<(String, OwnerConsent)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl OwnerConsentClient for RecordingConsentClient {
    async fn send_owner_consent(
        &self,
        activity_id: &str,
        consent: &OwnerConsent,
    ) -> anyhow::Result<()> {
        self.requests
            .lock()
            .push((activity_id.to_owned(), consent.clone()));
        if let Some(decision) = self.decision {
            let sink = self.sink.lock().clone();
            if let Some(sink) = sink {
                use udm_api::agent::OwnerConsentHandler;
                sink.handle_owner_consent_feedback(
                    activity_id,
                    0,
                    &OwnerConsentFeedback { status: decision },
                );
            }
        }
        Ok(())
    }
}

/// Reboot hook recording the device-level statuses visible at call time.
pub struct RecordingReboot {
    callback: Arc<RecordingCallback>,
    calls: Mutex<Vec<Vec<StatusType>>>,
}

impl RecordingReboot {
    pub fn new(callback: Arc<RecordingCallback>) -> Arc<Self> {
        Arc::new(Self {
            callback,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Vec<StatusType>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RebootHandler for RecordingReboot {
    async fn reboot(&self) -> anyhow::Result<()> {
        self.calls.lock().push(self.callback.statuses());
        Ok(())
    }
}
