//! FHIR Coverage wire model for payer enrolment records.
//!
//! The registration workflow only ever writes one shape of Coverage: an active, subsidised
//! coverage whose subscriber and beneficiary are the registered patient, identified by the
//! payer's member identifier.

use crate::datatypes::{parse_reference, CodeableConceptWire, IdentifierWire, ReferenceWire};
use crate::{expect_resource_type, from_json_str, FhirError, FhirResult};
use intake_types::ResourceId;
use serde::{Deserialize, Serialize};

const ACT_CODE_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v3-ActCode";

/// Subsidised-coverage type code used for Medicaid-style enrolment.
pub const SUBSIDISED_COVERAGE_CODE: &str = "SUBSIDMC";

/// Domain-level carrier for a coverage record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverageData {
    pub id: Option<ResourceId>,
    pub status: String,
    pub beneficiary: ResourceId,
    pub payor_display: String,
    pub member_system: String,
    pub member_id: String,
}

impl CoverageData {
    /// Builds an active subsidised coverage for `patient`.
    pub fn active(
        patient: ResourceId,
        member_id: impl Into<String>,
        payor_display: impl Into<String>,
        member_system: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            status: "active".into(),
            beneficiary: patient,
            payor_display: payor_display.into(),
            member_system: member_system.into(),
            member_id: member_id.into(),
        }
    }
}

/// Coverage resource operations.
pub struct Coverage;

impl Coverage {
    /// Parse a Coverage resource (typically the registry's create response).
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if the body is not a Coverage, or the beneficiary reference or
    /// member identifier is missing.
    pub fn parse(json_text: &str) -> FhirResult<CoverageData> {
        let wire: CoverageWire = from_json_str(json_text, "Coverage")?;
        expect_resource_type(&wire.resource_type, "Coverage")?;

        let id = wire
            .id
            .as_deref()
            .map(ResourceId::parse)
            .transpose()
            .map_err(|e| FhirError::Translation(format!("Invalid coverage ID: {e}")))?;

        let beneficiary = wire
            .beneficiary
            .reference
            .as_deref()
            .ok_or_else(|| FhirError::Translation("Coverage has no beneficiary reference".into()))
            .and_then(|r| parse_reference(r, "Patient"))?;

        let member = wire.identifier.into_iter().find(|i| i.value.is_some());
        let (member_system, member_id) = match member {
            Some(i) => (i.system.unwrap_or_default(), i.value.unwrap_or_default()),
            None => {
                return Err(FhirError::Translation(
                    "Coverage has no member identifier".into(),
                ))
            }
        };

        Ok(CoverageData {
            id,
            status: wire.status,
            beneficiary,
            payor_display: wire
                .payor
                .into_iter()
                .find_map(|p| p.display)
                .unwrap_or_default(),
            member_system,
            member_id,
        })
    }

    /// Render a Coverage resource as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if serialisation fails.
    pub fn render(data: &CoverageData) -> FhirResult<String> {
        let patient_ref = ReferenceWire::to("Patient", &data.beneficiary);
        let wire = CoverageWire {
            resource_type: "Coverage".into(),
            id: data.id.as_ref().map(ResourceId::to_string),
            identifier: vec![IdentifierWire {
                system: Some(data.member_system.clone()),
                value: Some(data.member_id.clone()),
                ..IdentifierWire::default()
            }],
            status: data.status.clone(),
            type_: Some(CodeableConceptWire::coded(
                ACT_CODE_SYSTEM,
                SUBSIDISED_COVERAGE_CODE,
            )),
            subscriber: Some(patient_ref.clone()),
            beneficiary: patient_ref,
            payor: vec![ReferenceWire::display(&data.payor_display)],
        };
        serde_json::to_string(&wire)
            .map_err(|e| FhirError::Translation(format!("Failed to serialise coverage: {e}")))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct CoverageWire {
    #[serde(rename = "resourceType")]
    resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    identifier: Vec<IdentifierWire>,

    status: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    type_: Option<CodeableConceptWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    subscriber: Option<ReferenceWire>,

    beneficiary: ReferenceWire,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    payor: Vec<ReferenceWire>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> ResourceId {
        ResourceId::parse("pat-001").unwrap()
    }

    #[test]
    fn renders_subsidised_coverage_for_patient() {
        let data = CoverageData::active(
            patient(),
            "IL987654321",
            "Illinois Medicaid",
            "http://illinois.gov/medicaid",
        );
        let json = Coverage::render(&data).expect("render coverage");
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["resourceType"], "Coverage");
        assert_eq!(value["status"], "active");
        assert_eq!(value["type"]["coding"][0]["code"], "SUBSIDMC");
        assert_eq!(value["subscriber"]["reference"], "Patient/pat-001");
        assert_eq!(value["beneficiary"]["reference"], "Patient/pat-001");
        assert_eq!(value["payor"][0]["display"], "Illinois Medicaid");
        assert_eq!(value["identifier"][0]["value"], "IL987654321");
    }

    #[test]
    fn parses_created_coverage() {
        let input = r#"{
            "resourceType": "Coverage",
            "id": "cov-9",
            "status": "active",
            "identifier": [{ "system": "http://illinois.gov/medicaid", "value": "IL987654321" }],
            "beneficiary": { "reference": "Patient/pat-001" },
            "payor": [{ "display": "Illinois Medicaid" }]
        }"#;

        let data = Coverage::parse(input).expect("parse coverage");
        assert_eq!(data.id.unwrap().as_str(), "cov-9");
        assert_eq!(data.beneficiary, patient());
        assert_eq!(data.member_id, "IL987654321");
        assert_eq!(data.payor_display, "Illinois Medicaid");
    }

    #[test]
    fn rejects_coverage_without_member_identifier() {
        let input = r#"{
            "resourceType": "Coverage",
            "status": "active",
            "beneficiary": { "reference": "Patient/pat-001" }
        }"#;
        let err = Coverage::parse(input).unwrap_err();
        assert!(matches!(err, FhirError::Translation(msg) if msg.contains("member identifier")));
    }
}
