//! In-memory registry used by the core unit tests.
//!
//! Returns a scripted candidate list from every search, records every call, and can be told to
//! fail or hang on a given operation.

use crate::demographics::Demographics;
use crate::error::{RegistryError, RegistryResult};
use crate::registry::{
    ops, CandidateRecord, EligibilityState, EligibilityStatus, EncounterRecord,
    ExternalIdentifier, RegistryClient,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use intake_types::{Gender, ResourceId};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug)]
pub enum Fault {
    Unavailable,
    Rejected,
    /// Never completes; only the caller's timeout ends the call.
    Hang,
}

#[derive(Clone, Debug)]
pub struct SearchCall {
    pub family_name: String,
    pub birth_date: NaiveDate,
    pub given_name: Option<String>,
}

#[derive(Default)]
struct State {
    candidates: Vec<CandidateRecord>,
    faults: HashMap<&'static str, Fault>,
    calls: HashMap<&'static str, usize>,
    searches: Vec<SearchCall>,
    created_patients: Vec<Demographics>,
    coverages: Vec<(ResourceId, String)>,
    encounters: Vec<EncounterRecord>,
}

#[derive(Default)]
pub struct FakeRegistry {
    state: Mutex<State>,
}

impl FakeRegistry {
    pub fn with_candidates(candidates: Vec<CandidateRecord>) -> Self {
        let registry = Self::default();
        registry.lock().candidates = candidates;
        registry
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake registry lock poisoned")
    }

    pub fn fail(&self, operation: &'static str, fault: Fault) {
        self.lock().faults.insert(operation, fault);
    }

    pub fn heal(&self, operation: &'static str) {
        self.lock().faults.remove(operation);
    }

    pub fn calls(&self, operation: &'static str) -> usize {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn searches(&self) -> Vec<SearchCall> {
        self.lock().searches.clone()
    }

    pub fn created_patients(&self) -> Vec<Demographics> {
        self.lock().created_patients.clone()
    }

    pub fn coverages(&self) -> Vec<(ResourceId, String)> {
        self.lock().coverages.clone()
    }

    pub fn encounters(&self) -> Vec<EncounterRecord> {
        self.lock().encounters.clone()
    }

    /// Count the call and return the configured fault for `operation`, if any.
    async fn enter(&self, operation: &'static str) -> RegistryResult<()> {
        let fault = {
            let mut state = self.lock();
            *state.calls.entry(operation).or_default() += 1;
            state.faults.get(operation).copied()
        };
        match fault {
            None => Ok(()),
            Some(Fault::Unavailable) => Err(RegistryError::unavailable(
                operation,
                "HTTP 503 Service Unavailable",
            )),
            Some(Fault::Rejected) => Err(RegistryError::rejected(
                operation,
                Some(422),
                "error: resource failed validation",
            )),
            Some(Fault::Hang) => std::future::pending().await,
        }
    }
}

fn generated_id(prefix: &str, n: usize) -> ResourceId {
    ResourceId::parse(&format!("{prefix}-{n}")).expect("generated id is valid")
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn search_patients(
        &self,
        family_name: &str,
        birth_date: NaiveDate,
        given_name: Option<&str>,
    ) -> RegistryResult<Vec<CandidateRecord>> {
        self.enter(ops::SEARCH_PATIENTS).await?;
        let mut state = self.lock();
        state.searches.push(SearchCall {
            family_name: family_name.to_string(),
            birth_date,
            given_name: given_name.map(str::to_string),
        });
        Ok(state.candidates.clone())
    }

    async fn create_patient(&self, demographics: &Demographics) -> RegistryResult<ResourceId> {
        self.enter(ops::CREATE_PATIENT).await?;
        let mut state = self.lock();
        state.created_patients.push(demographics.clone());
        Ok(generated_id("created", state.created_patients.len()))
    }

    async fn create_coverage(
        &self,
        patient_id: &ResourceId,
        payer_id: &str,
    ) -> RegistryResult<ResourceId> {
        self.enter(ops::CREATE_COVERAGE).await?;
        let mut state = self.lock();
        state.coverages.push((patient_id.clone(), payer_id.to_string()));
        Ok(generated_id("cov", state.coverages.len()))
    }

    async fn check_eligibility(
        &self,
        payer_id: &str,
        service_date: NaiveDate,
    ) -> RegistryResult<EligibilityStatus> {
        self.enter(ops::VERIFY_ELIGIBILITY).await?;
        Ok(EligibilityStatus {
            state: EligibilityState::Active,
            payer_id: payer_id.to_string(),
            service_date,
            plan_name: Some("Meridian Health Plan of Illinois".into()),
            coverage_start: NaiveDate::from_ymd_opt(2025, 1, 1),
            coverage_end: NaiveDate::from_ymd_opt(2026, 12, 31),
            copay_cents: Some(0),
            prior_auth_required: false,
        })
    }

    async fn create_encounter(
        &self,
        patient_id: &ResourceId,
        provider_id: &ResourceId,
        reason: &str,
    ) -> RegistryResult<EncounterRecord> {
        self.enter(ops::CREATE_ENCOUNTER).await?;
        let mut state = self.lock();
        let record = EncounterRecord {
            id: generated_id("enc", state.encounters.len() + 1),
            patient_id: patient_id.clone(),
            provider_id: provider_id.clone(),
            reason: reason.to_string(),
            status: "arrived".into(),
            started_at: Utc::now(),
        };
        state.encounters.push(record.clone());
        Ok(record)
    }
}

/// A registry patient with gender and an MRN recorded.
pub fn candidate(id: &str, given: &str, family: &str, birth_date: &str) -> CandidateRecord {
    CandidateRecord {
        id: ResourceId::parse(id).expect("valid test id"),
        display_name: format!("{given} {family}"),
        family_name: Some(family.to_string()),
        given_names: vec![given.to_string()],
        birth_date: birth_date.parse().ok(),
        gender: Some(Gender::Female),
        identifiers: vec![ExternalIdentifier {
            system: Some("urn:clinic:mrn".into()),
            type_code: Some("MR".into()),
            value: format!("MRN-{id}"),
        }],
    }
}
