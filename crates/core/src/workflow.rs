//! Registration workflow vocabulary: request, progress, report and failure.

use crate::demographics::RawDemographics;
use crate::error::RegistrationError;
use crate::registry::{ops, CoverageRecord, EligibilityStatus, EncounterRecord};
use chrono::NaiveDate;
use intake_types::{NonEmptyText, ResourceId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The workflow step a failure is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkflowStep {
    NormalizeDemographics,
    SearchPatients,
    CreatePatient,
    CreateCoverage,
    VerifyEligibility,
    CreateEncounter,
}

impl WorkflowStep {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStep::NormalizeDemographics => "normalizeDemographics",
            WorkflowStep::SearchPatients => ops::SEARCH_PATIENTS,
            WorkflowStep::CreatePatient => ops::CREATE_PATIENT,
            WorkflowStep::CreateCoverage => ops::CREATE_COVERAGE,
            WorkflowStep::VerifyEligibility => ops::VERIFY_ELIGIBILITY,
            WorkflowStep::CreateEncounter => ops::CREATE_ENCOUNTER,
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the patient identity was established.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "patient_id", rename_all = "lowercase")]
pub enum RegistrationOutcome {
    /// An existing registry patient cleared the acceptance threshold.
    Resolved(ResourceId),
    /// No acceptable match; a new patient was created.
    Created(ResourceId),
}

impl RegistrationOutcome {
    pub fn patient_id(&self) -> &ResourceId {
        match self {
            RegistrationOutcome::Resolved(id) | RegistrationOutcome::Created(id) => id,
        }
    }
}

/// Result of the eligibility step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum EligibilityCheck {
    Verified(EligibilityStatus),
    /// The check failed under the best-effort policy; the workflow continued without it.
    Unverified { reason: String },
}

/// Facts established so far by one registration.
///
/// Returned inside every [`WorkflowFailure`]; passing it back to
/// [`crate::Orchestrator::resume`] continues without repeating completed steps.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RegistrationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligibility: Option<EligibilityCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<EncounterRecord>,
}

impl WorkflowProgress {
    pub fn established_patient(&self) -> Option<&ResourceId> {
        self.outcome.as_ref().map(RegistrationOutcome::patient_id)
    }
}

/// Everything needed to register a patient for a visit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub demographics: RawDemographics,
    /// Attending practitioner.
    pub provider_id: ResourceId,
    /// Chief complaint recorded on the encounter.
    pub reason: NonEmptyText,
    /// Date of service; eligibility is only verified when present.
    #[serde(default)]
    pub service_date: Option<NaiveDate>,
}

/// Successful registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationReport {
    pub workflow_id: Uuid,
    pub outcome: RegistrationOutcome,
    pub coverage: Option<CoverageRecord>,
    pub eligibility: Option<EligibilityCheck>,
    pub encounter: EncounterRecord,
}

/// Failed registration: the step that failed, what had been established, and why.
#[derive(Debug, thiserror::Error)]
#[error("registration {workflow_id} failed at {step}: {cause}")]
pub struct WorkflowFailure {
    pub workflow_id: Uuid,
    pub step: WorkflowStep,
    pub progress: WorkflowProgress,
    #[source]
    pub cause: RegistrationError,
}

impl WorkflowFailure {
    pub fn established_patient(&self) -> Option<&ResourceId> {
        self.progress.established_patient()
    }

    /// True when resuming with the returned progress may succeed unchanged.
    pub fn is_retryable(&self) -> bool {
        self.cause.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_serialise_as_operation_names() {
        assert_eq!(
            serde_json::to_string(&WorkflowStep::VerifyEligibility).unwrap(),
            "\"verifyEligibility\""
        );
        assert_eq!(WorkflowStep::CreatePatient.to_string(), "createPatient");
        assert_eq!(
            WorkflowStep::NormalizeDemographics.to_string(),
            "normalizeDemographics"
        );
    }

    #[test]
    fn outcome_serialises_with_kind_tag() {
        let outcome = RegistrationOutcome::Created(ResourceId::parse("pat-9").unwrap());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "created", "patient_id": "pat-9" }));
    }

    #[test]
    fn progress_round_trips_as_resumption_token() {
        let progress = WorkflowProgress {
            outcome: Some(RegistrationOutcome::Resolved(
                ResourceId::parse("pat-001").unwrap(),
            )),
            eligibility: Some(EligibilityCheck::Unverified {
                reason: "registry unavailable".into(),
            }),
            ..WorkflowProgress::default()
        };
        let text = serde_json::to_string(&progress).unwrap();
        let back: WorkflowProgress = serde_json::from_str(&text).unwrap();
        assert_eq!(back, progress);
        assert_eq!(back.established_patient().map(ResourceId::as_str), Some("pat-001"));
    }

    #[test]
    fn request_rejects_blank_reason() {
        let json = r#"{
            "demographics": { "family_name": "Rodriguez", "birth_date": "1979-03-15" },
            "provider_id": "dr-sarah-chen",
            "reason": "  "
        }"#;
        assert!(serde_json::from_str::<RegistrationRequest>(json).is_err());
    }
}
