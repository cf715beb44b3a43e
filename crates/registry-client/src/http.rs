//! FHIR R4 REST implementation of [`RegistryClient`].

use crate::clearinghouse::SimulatedClearinghouse;
use crate::retry::{is_transient_status, send_with_retry, RetryOutcome, RetryPolicy};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use fhir::{
    parse_reference, AddressData, Bundle, ContactPointData, ContactUse, Coverage, CoverageData,
    Encounter, EncounterData, OperationOutcome, Patient, PatientData,
};
use intake_core::{
    ops, CandidateRecord, Demographics, EligibilityStatus, EncounterRecord, ExternalIdentifier,
    IntakeConfig, PayerSettings, PhoneUse, RegistryClient, RegistryError, RegistryResult,
};
use intake_types::ResourceId;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::Response;
use std::time::Duration;
use url::Url;

const FHIR_JSON: &str = "application/fhir+json";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid registry base URL: {0}")]
    BaseUrl(#[from] url::ParseError),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Registry client speaking FHIR R4 JSON over HTTP.
#[derive(Clone, Debug)]
pub struct FhirRegistryClient {
    http: reqwest::Client,
    base: Url,
    payer: PayerSettings,
    retry: RetryPolicy,
    call_timeout: Duration,
    clearinghouse: SimulatedClearinghouse,
}

impl FhirRegistryClient {
    /// Build a client for the registry named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the base URL does not parse or the HTTP client cannot be built.
    pub fn new(config: &IntakeConfig) -> Result<Self, ClientError> {
        let mut base = Url::parse(config.registry_base_url())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.call_timeout())
            .build()?;

        Ok(Self {
            http,
            base,
            payer: config.payer().clone(),
            retry: RetryPolicy::default(),
            call_timeout: config.call_timeout(),
            clearinghouse: SimulatedClearinghouse::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clearinghouse(mut self, clearinghouse: SimulatedClearinghouse) -> Self {
        self.clearinghouse = clearinghouse;
        self
    }

    fn endpoint(&self, operation: &'static str, resource_type: &str) -> RegistryResult<Url> {
        self.base
            .join(resource_type)
            .map_err(|e| RegistryError::unavailable_from(operation, e))
    }

    /// POST a rendered resource once and return the registry's response on 2xx.
    async fn create(
        &self,
        operation: &'static str,
        resource_type: &str,
        body: String,
    ) -> RegistryResult<Created> {
        let url = self.endpoint(operation, resource_type)?;
        let response = self
            .http
            .post(url)
            .header(ACCEPT, FHIR_JSON)
            .header(CONTENT_TYPE, FHIR_JSON)
            .body(body)
            .send()
            .await
            .map_err(|e| RegistryError::unavailable_from(operation, e))?;

        if !response.status().is_success() {
            return Err(write_failure(operation, response).await);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| RegistryError::unavailable_from(operation, e))?;

        Ok(Created { body, location })
    }
}

/// A successful create response.
struct Created {
    body: String,
    location: Option<String>,
}

impl Created {
    /// Response body, unless the registry returned none (`Prefer: return=minimal`).
    fn body(&self) -> Option<&str> {
        Some(self.body.as_str()).filter(|b| !b.trim().is_empty())
    }

    /// The assigned id: from the returned resource, else from the `Location` header.
    fn assigned_id(
        &self,
        operation: &'static str,
        resource_type: &str,
        from_body: Option<ResourceId>,
    ) -> RegistryResult<ResourceId> {
        if let Some(id) = from_body {
            return Ok(id);
        }
        match &self.location {
            Some(location) => parse_reference(location, resource_type)
                .map_err(|e| RegistryError::unavailable_from(operation, e)),
            None => Err(RegistryError::unavailable(
                operation,
                format!("created {resource_type} has no id and no Location header"),
            )),
        }
    }
}

/// Map a non-2xx write response to `Unavailable` (transient) or `Rejected`.
async fn write_failure(operation: &'static str, response: Response) -> RegistryError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = OperationOutcome::summary(&body);

    if status.is_client_error() && !is_transient_status(status) {
        let message = detail.unwrap_or_else(|| format!("HTTP {status}"));
        tracing::warn!(operation, %status, "registry rejected write: {message}");
        RegistryError::rejected(operation, Some(status.as_u16()), message)
    } else {
        let message = match detail {
            Some(detail) => format!("HTTP {status}: {detail}"),
            None => format!("HTTP {status}"),
        };
        RegistryError::unavailable(operation, message)
    }
}

async fn read_failure(operation: &'static str, response: Response) -> RegistryError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = match OperationOutcome::summary(&body) {
        Some(detail) => format!("HTTP {status}: {detail}"),
        None => format!("HTTP {status}"),
    };
    RegistryError::unavailable(operation, message)
}

fn to_candidate(patient: PatientData) -> RegistryResult<CandidateRecord> {
    let id = patient.id.ok_or_else(|| {
        RegistryError::unavailable(ops::SEARCH_PATIENTS, "search returned a Patient without an id")
    })?;

    let display_name = patient
        .given
        .iter()
        .map(String::as_str)
        .chain(patient.family.as_deref())
        .collect::<Vec<_>>()
        .join(" ");

    Ok(CandidateRecord {
        id,
        display_name,
        family_name: patient.family,
        given_names: patient.given,
        birth_date: patient.birth_date,
        gender: patient.gender,
        identifiers: patient
            .identifiers
            .into_iter()
            .map(|i| ExternalIdentifier {
                system: i.system,
                type_code: i.type_code,
                value: i.value,
            })
            .collect(),
    })
}

fn to_patient_data(demographics: &Demographics) -> PatientData {
    PatientData {
        id: None,
        family: Some(demographics.family_name().display().to_string()),
        given: demographics
            .given_name()
            .map(|g| vec![g.display().to_string()])
            .unwrap_or_default(),
        birth_date: Some(demographics.birth_date()),
        gender: Some(demographics.gender()),
        telecom: demographics
            .phones()
            .iter()
            .map(|p| ContactPointData {
                value: p.number().to_string(),
                use_type: Some(match p.use_type() {
                    PhoneUse::Home => ContactUse::Home,
                    PhoneUse::Work => ContactUse::Work,
                }),
            })
            .collect(),
        address: demographics
            .address()
            .map(|a| AddressData {
                line: a.line().map(str::to_string).into_iter().collect(),
                city: a.city().map(str::to_string),
                state: a.region().map(str::to_string),
                postal_code: a.postal_code().map(str::to_string),
            })
            .into_iter()
            .collect(),
        identifiers: vec![],
    }
}

/// An encode failure is a defect in the request, so it is not retryable.
fn encode_failure(operation: &'static str, err: fhir::FhirError) -> RegistryError {
    RegistryError::rejected(operation, None, format!("could not encode request: {err}"))
}

#[async_trait]
impl RegistryClient for FhirRegistryClient {
    async fn search_patients(
        &self,
        family_name: &str,
        birth_date: NaiveDate,
        given_name: Option<&str>,
    ) -> RegistryResult<Vec<CandidateRecord>> {
        let operation = ops::SEARCH_PATIENTS;
        let url = self.endpoint(operation, "Patient")?;
        let attempt_timeout = self.retry.attempt_timeout(self.call_timeout);

        let mut query = vec![
            ("family", family_name.to_string()),
            ("birthdate", birth_date.format("%Y-%m-%d").to_string()),
        ];
        if let Some(given) = given_name {
            query.push(("given", given.to_string()));
        }

        let outcome = send_with_retry(
            || {
                self.http
                    .get(url.clone())
                    .header(ACCEPT, FHIR_JSON)
                    .query(&query)
                    .timeout(attempt_timeout)
            },
            &self.retry,
        )
        .await;

        let response = match outcome {
            RetryOutcome::Success(response) => response,
            RetryOutcome::HttpError(response) => return Err(read_failure(operation, response).await),
            RetryOutcome::ConnectionError { attempts, source } => {
                tracing::warn!(attempts, "registry search failed: {source}");
                return Err(RegistryError::unavailable_from(operation, source));
            }
        };

        let body = response
            .text()
            .await
            .map_err(|e| RegistryError::unavailable_from(operation, e))?;
        let set = Bundle::parse_search(&body)
            .map_err(|e| RegistryError::unavailable_from(operation, e))?;

        if set.next_page.is_some() {
            // Identity resolution issues a single search request; later pages are not fetched.
            tracing::warn!(
                total = set.total,
                returned = set.patients.len(),
                "search results span multiple pages; only the first page is scored"
            );
        }

        set.patients.into_iter().map(to_candidate).collect()
    }

    async fn create_patient(&self, demographics: &Demographics) -> RegistryResult<ResourceId> {
        let operation = ops::CREATE_PATIENT;
        let body = Patient::render(&to_patient_data(demographics))
            .map_err(|e| encode_failure(operation, e))?;

        let created = self.create(operation, "Patient", body).await?;
        let from_body = match created.body() {
            Some(text) => Patient::parse(text)
                .map_err(|e| RegistryError::unavailable_from(operation, e))?
                .id,
            None => None,
        };
        created.assigned_id(operation, "Patient", from_body)
    }

    async fn create_coverage(
        &self,
        patient_id: &ResourceId,
        payer_id: &str,
    ) -> RegistryResult<ResourceId> {
        let operation = ops::CREATE_COVERAGE;
        let data = CoverageData::active(
            patient_id.clone(),
            payer_id,
            self.payer.display.as_str(),
            self.payer.identifier_system.as_str(),
        );
        let body = Coverage::render(&data).map_err(|e| encode_failure(operation, e))?;

        let created = self.create(operation, "Coverage", body).await?;
        let from_body = match created.body() {
            Some(text) => Coverage::parse(text)
                .map_err(|e| RegistryError::unavailable_from(operation, e))?
                .id,
            None => None,
        };
        created.assigned_id(operation, "Coverage", from_body)
    }

    async fn check_eligibility(
        &self,
        payer_id: &str,
        service_date: NaiveDate,
    ) -> RegistryResult<EligibilityStatus> {
        let status = self.clearinghouse.check(payer_id, service_date);
        tracing::debug!(state = ?status.state, %service_date, "clearinghouse eligibility response");
        Ok(status)
    }

    async fn create_encounter(
        &self,
        patient_id: &ResourceId,
        provider_id: &ResourceId,
        reason: &str,
    ) -> RegistryResult<EncounterRecord> {
        let operation = ops::CREATE_ENCOUNTER;
        let requested = EncounterData::arrived(
            patient_id.clone(),
            provider_id.clone(),
            reason,
            Utc::now(),
        );
        let body = Encounter::render(&requested).map_err(|e| encode_failure(operation, e))?;

        let created = self.create(operation, "Encounter", body).await?;
        let stored = match created.body() {
            Some(text) => Some(
                Encounter::parse(text).map_err(|e| RegistryError::unavailable_from(operation, e))?,
            ),
            None => None,
        };
        let id = created.assigned_id(
            operation,
            "Encounter",
            stored.as_ref().and_then(|e| e.id.clone()),
        )?;
        let data = stored.unwrap_or(requested);

        Ok(EncounterRecord {
            id,
            patient_id: data.subject,
            provider_id: data.practitioner.unwrap_or_else(|| provider_id.clone()),
            reason: data.reason_text.unwrap_or_else(|| reason.to_string()),
            status: data.status,
            started_at: data.period_start.unwrap_or_else(Utc::now),
        })
    }
}
