//! # Intake Core
//!
//! Patient identity resolution and visit registration:
//! - Demographic normalisation ([`normalize`])
//! - Match scoring and identity resolution against the registry ([`MatchScorer`],
//!   [`IdentityResolver`])
//! - The registration state machine ([`Orchestrator`]) with resumable progress
//!
//! **No transport concerns**: HTTP clients for a concrete registry live in `registry-client`;
//! binaries and servers live in `intake-cli` and the root crate. Everything here talks to the
//! registry through the [`RegistryClient`] trait.

pub mod config;
pub mod constants;
pub mod demographics;
pub mod error;
pub mod matching;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use config::{ConfigFile, EligibilityPolicy, IntakeConfig, MatchWeights, PayerSettings};
pub use demographics::{
    normalize, Address, Demographics, PersonName, Phone, PhoneUse, RawDemographics,
};
pub use error::{
    ConfigError, ConfigResult, RegistrationError, RegistryError, RegistryResult, ValidationError,
};
pub use matching::{MatchFactors, MatchResult, MatchScorer};
pub use orchestrator::{AcceptancePolicy, Orchestrator};
pub use registry::{
    ops, CandidateRecord, CoverageRecord, EligibilityState, EligibilityStatus, EncounterRecord,
    ExternalIdentifier, RegistryClient,
};
pub use resolver::IdentityResolver;
pub use workflow::{
    EligibilityCheck, RegistrationOutcome, RegistrationReport, RegistrationRequest,
    WorkflowFailure, WorkflowProgress, WorkflowStep,
};

pub use intake_types::{Gender, NonEmptyText, ResourceId};
