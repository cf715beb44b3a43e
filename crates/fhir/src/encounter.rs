//! FHIR Encounter wire model for visit initialisation.
//!
//! Registration opens an ambulatory encounter in `arrived` status, attended by one
//! practitioner, with the chief complaint carried as free-text reason.

use crate::datatypes::{
    parse_reference, CodeableConceptWire, CodingWire, PeriodWire, ReferenceWire,
};
use crate::{expect_resource_type, from_json_str, FhirError, FhirResult};
use chrono::{DateTime, Utc};
use intake_types::ResourceId;
use serde::{Deserialize, Serialize};

const ACT_CODE_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v3-ActCode";
const PARTICIPATION_TYPE_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/v3-ParticipationType";

/// Domain-level carrier for an encounter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncounterData {
    pub id: Option<ResourceId>,
    pub status: String,
    pub class_code: String,
    pub subject: ResourceId,
    /// Attending practitioner.
    pub practitioner: Option<ResourceId>,
    pub period_start: Option<DateTime<Utc>>,
    pub reason_text: Option<String>,
}

impl EncounterData {
    /// Builds an `arrived` ambulatory encounter starting at `started_at`.
    pub fn arrived(
        subject: ResourceId,
        practitioner: ResourceId,
        reason: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            status: "arrived".into(),
            class_code: "AMB".into(),
            subject,
            practitioner: Some(practitioner),
            period_start: Some(started_at),
            reason_text: Some(reason.into()),
        }
    }
}

/// Encounter resource operations.
pub struct Encounter;

impl Encounter {
    /// Parse an Encounter resource.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if the body is not an Encounter, the subject is missing, or any
    /// reference or timestamp is malformed.
    pub fn parse(json_text: &str) -> FhirResult<EncounterData> {
        let wire: EncounterWire = from_json_str(json_text, "Encounter")?;
        expect_resource_type(&wire.resource_type, "Encounter")?;

        let id = wire
            .id
            .as_deref()
            .map(ResourceId::parse)
            .transpose()
            .map_err(|e| FhirError::Translation(format!("Invalid encounter ID: {e}")))?;

        let subject = wire
            .subject
            .and_then(|s| s.reference)
            .ok_or_else(|| FhirError::Translation("Encounter has no subject reference".into()))
            .and_then(|r| parse_reference(&r, "Patient"))?;

        let practitioner = wire
            .participant
            .iter()
            .find_map(|p| p.individual.as_ref().and_then(|i| i.reference.as_deref()))
            .map(|r| parse_reference(r, "Practitioner"))
            .transpose()?;

        let period_start = wire
            .period
            .and_then(|p| p.start)
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| FhirError::Translation(format!("Invalid period.start: {e}")))
            })
            .transpose()?;

        Ok(EncounterData {
            id,
            status: wire.status,
            class_code: wire.class.and_then(|c| c.code).unwrap_or_default(),
            subject,
            practitioner,
            period_start,
            reason_text: wire.reason_code.into_iter().find_map(|r| r.text),
        })
    }

    /// Render an Encounter resource as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if serialisation fails.
    pub fn render(data: &EncounterData) -> FhirResult<String> {
        let wire = EncounterWire {
            resource_type: "Encounter".into(),
            id: data.id.as_ref().map(ResourceId::to_string),
            status: data.status.clone(),
            class: Some(CodingWire {
                system: Some(ACT_CODE_SYSTEM.into()),
                code: Some(data.class_code.clone()),
                display: (data.class_code == "AMB").then(|| "ambulatory".to_string()),
            }),
            subject: Some(ReferenceWire::to("Patient", &data.subject)),
            participant: data
                .practitioner
                .iter()
                .map(|p| ParticipantWire {
                    type_: vec![CodeableConceptWire::coded(PARTICIPATION_TYPE_SYSTEM, "ATND")],
                    individual: Some(ReferenceWire::to("Practitioner", p)),
                })
                .collect(),
            period: data.period_start.map(|start| PeriodWire {
                start: Some(start.to_rfc3339()),
                end: None,
            }),
            reason_code: data
                .reason_text
                .iter()
                .map(|text| CodeableConceptWire {
                    coding: vec![],
                    text: Some(text.clone()),
                })
                .collect(),
        };
        serde_json::to_string(&wire)
            .map_err(|e| FhirError::Translation(format!("Failed to serialise encounter: {e}")))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct EncounterWire {
    #[serde(rename = "resourceType")]
    resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    class: Option<CodingWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<ReferenceWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    participant: Vec<ParticipantWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    period: Option<PeriodWire>,

    #[serde(rename = "reasonCode", default, skip_serializing_if = "Vec::is_empty")]
    reason_code: Vec<CodeableConceptWire>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct ParticipantWire {
    #[serde(rename = "type", default, skip_serializing_if = "Vec::is_empty")]
    type_: Vec<CodeableConceptWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    individual: Option<ReferenceWire>,
}
