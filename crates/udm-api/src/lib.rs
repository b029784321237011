//! ---
//! udm_section: "02-api-data-model"
//! udm_subsection: "module"
//! udm_type: "source"
//! udm_scope: "code"
//! udm_description: "Shared data model and external contracts for update coordination."
//! udm_version: "v0.0.0-prealpha"
//! udm_owner: "tbd"
//! ---
//! Shared vocabulary of the update manager workspace.
//!
//! This crate defines the desired-state manifest model, the ordered status
//! taxonomy exchanged between domain agents and the orchestration core, and
//! the contracts implemented by external collaborators (domain agents, the
//! owner-consent client, the reboot hook, feedback consumers).

#![warn(missing_docs)]

pub mod agent;
pub mod types;

pub use agent::{
    DesiredStateFeedbackHandler, OwnerConsentClient, OwnerConsentHandler, RebootHandler,
    UpdateAgent,
};
pub use types::{
    Action, ActionStatus, ActionType, Baseline, CommandType, Component, ComponentWithConfig,
    ConsentStatus, DesiredState, DesiredStateFeedback, Domain, KeyValuePair, OwnerConsent,
    OwnerConsentFeedback, StatusType,
};
