//! Registry Client seam.
//!
//! [`RegistryClient`] is the only path from the workflow to the outside world. Implementations
//! must be `Send + Sync`; one client is shared, behind an `Arc`, by every concurrent
//! registration.

use crate::demographics::Demographics;
use crate::error::{RegistryError, RegistryResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use intake_types::{Gender, ResourceId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Operation names reported in errors and logs.
pub mod ops {
    pub const SEARCH_PATIENTS: &str = "searchPatients";
    pub const CREATE_PATIENT: &str = "createPatient";
    pub const CREATE_COVERAGE: &str = "createCoverage";
    pub const VERIFY_ELIGIBILITY: &str = "verifyEligibility";
    pub const CREATE_ENCOUNTER: &str = "createEncounter";
}

const MRN_TYPE_CODE: &str = "MR";

/// An identifier held by a registry patient (MRN, payer member id, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentifier {
    pub system: Option<String>,
    pub type_code: Option<String>,
    pub value: String,
}

/// A patient as held by the registry. Read-only projection returned by a search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: ResourceId,
    pub display_name: String,
    pub family_name: Option<String>,
    pub given_names: Vec<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub identifiers: Vec<ExternalIdentifier>,
}

impl CandidateRecord {
    /// The medical record number, if the registry holds one.
    pub fn mrn(&self) -> Option<&str> {
        self.identifiers
            .iter()
            .find(|i| i.type_code.as_deref() == Some(MRN_TYPE_CODE))
            .map(|i| i.value.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageRecord {
    pub id: ResourceId,
    pub patient_id: ResourceId,
    pub payer_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EligibilityState {
    Active,
    Inactive,
    Unknown,
}

/// Result of an eligibility inquiry against a payer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityStatus {
    pub state: EligibilityState,
    pub payer_id: String,
    pub service_date: NaiveDate,
    pub plan_name: Option<String>,
    pub coverage_start: Option<NaiveDate>,
    pub coverage_end: Option<NaiveDate>,
    pub copay_cents: Option<u32>,
    pub prior_auth_required: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterRecord {
    pub id: ResourceId,
    pub patient_id: ResourceId,
    pub provider_id: ResourceId,
    pub reason: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
}

/// Typed access to the external patient registry and eligibility service.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Search patients by family name and birth date, optionally narrowed by given name.
    ///
    /// Any failure is [`RegistryError::Unavailable`]; an empty vector means no candidates.
    async fn search_patients(
        &self,
        family_name: &str,
        birth_date: NaiveDate,
        given_name: Option<&str>,
    ) -> RegistryResult<Vec<CandidateRecord>>;

    /// Create a patient and return the registry-assigned identifier.
    async fn create_patient(&self, demographics: &Demographics) -> RegistryResult<ResourceId>;

    /// Attach payer coverage to a patient and return the coverage identifier.
    async fn create_coverage(
        &self,
        patient_id: &ResourceId,
        payer_id: &str,
    ) -> RegistryResult<ResourceId>;

    async fn check_eligibility(
        &self,
        payer_id: &str,
        service_date: NaiveDate,
    ) -> RegistryResult<EligibilityStatus>;

    /// Open an encounter for the patient with the given provider.
    async fn create_encounter(
        &self,
        patient_id: &ResourceId,
        provider_id: &ResourceId,
        reason: &str,
    ) -> RegistryResult<EncounterRecord>;
}

/// Await a registry call, converting expiry of `timeout` into [`RegistryError::Unavailable`].
pub async fn within<T, F>(operation: &'static str, timeout: Duration, call: F) -> RegistryResult<T>
where
    F: Future<Output = RegistryResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(RegistryError::timed_out(operation, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(identifiers: Vec<ExternalIdentifier>) -> CandidateRecord {
        CandidateRecord {
            id: ResourceId::parse("pat-001").unwrap(),
            display_name: "Maria Rodriguez".into(),
            family_name: Some("Rodriguez".into()),
            given_names: vec!["Maria".into()],
            birth_date: NaiveDate::from_ymd_opt(1979, 3, 15),
            gender: Some(Gender::Female),
            identifiers,
        }
    }

    #[test]
    fn mrn_is_identifier_typed_mr() {
        let record = candidate(vec![
            ExternalIdentifier {
                system: Some("http://illinois.gov/medicaid".into()),
                type_code: None,
                value: "IL-MCD-88123".into(),
            },
            ExternalIdentifier {
                system: Some("urn:clinic:mrn".into()),
                type_code: Some("MR".into()),
                value: "MRN-2024-00417".into(),
            },
        ]);
        assert_eq!(record.mrn(), Some("MRN-2024-00417"));
        assert_eq!(candidate(vec![]).mrn(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn within_maps_expiry_to_unavailable() {
        let err = within(ops::CREATE_PATIENT, Duration::from_millis(50), async {
            std::future::pending::<RegistryResult<()>>().await
        })
        .await
        .unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(err.operation(), ops::CREATE_PATIENT);
    }

    #[tokio::test]
    async fn within_passes_through_completed_calls() {
        let value = within(ops::SEARCH_PATIENTS, Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
