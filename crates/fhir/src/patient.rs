//! FHIR Patient wire models and translation helpers.
//!
//! Responsibilities:
//! - Define the domain-level [`PatientData`] carrier used by the registry client
//! - Define the JSON wire model for the Patient elements the workflow reads or writes
//! - Translate between the two, validating dates, gender codes and ids on the way in
//!
//! Notes:
//! - Only the first `official` name (or the first name if none is official) is surfaced
//! - Partial birth dates (`1979`, `1979-03`) are legal FHIR but cannot be compared exactly, so
//!   they translate to `None`

use crate::datatypes::{CodeableConceptWire, IdentifierWire};
use crate::{expect_resource_type, from_json_str, from_json_value, FhirError, FhirResult};
use chrono::NaiveDate;
use intake_types::{Gender, ResourceId};
use serde::{Deserialize, Serialize};

// ============================================================================
// Public domain-level types
// ============================================================================

/// Purpose of a contact point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactUse {
    Home,
    Work,
    Mobile,
}

impl ContactUse {
    fn to_wire(self) -> &'static str {
        match self {
            ContactUse::Home => "home",
            ContactUse::Work => "work",
            ContactUse::Mobile => "mobile",
        }
    }

    fn from_wire(s: &str) -> Option<Self> {
        match s {
            "home" => Some(ContactUse::Home),
            "work" => Some(ContactUse::Work),
            "mobile" => Some(ContactUse::Mobile),
            _ => None,
        }
    }
}

/// A phone number attached to a patient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactPointData {
    pub value: String,
    pub use_type: Option<ContactUse>,
}

/// A postal address (home use).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressData {
    pub line: Vec<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

/// An external identifier held against a patient (MRN, national id, payer id).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentifierData {
    pub system: Option<String>,
    /// First code of `Identifier.type` (for example `MR` for a medical record number).
    pub type_code: Option<String>,
    pub value: String,
}

/// Domain-level carrier for patient data (flat structure).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatientData {
    /// Registry id. `None` when rendering a create request.
    pub id: Option<ResourceId>,
    pub family: Option<String>,
    pub given: Vec<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub telecom: Vec<ContactPointData>,
    pub address: Vec<AddressData>,
    pub identifiers: Vec<IdentifierData>,
}

// ============================================================================
// Public Patient operations
// ============================================================================

/// Patient resource operations.
///
/// Zero-sized type used for namespacing; all methods are associated functions.
pub struct Patient;

impl Patient {
    /// Parse a Patient resource from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if:
    /// - the JSON does not match the wire schema (the failing path is reported),
    /// - resourceType is not "Patient",
    /// - id, gender or birthDate are malformed.
    pub fn parse(json_text: &str) -> FhirResult<PatientData> {
        let wire: PatientWire = from_json_str(json_text, "Patient")?;
        wire_to_domain(wire)
    }

    /// Parse a Patient resource from an already-decoded JSON value.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Patient::parse`].
    pub fn from_value(value: serde_json::Value) -> FhirResult<PatientData> {
        let wire: PatientWire = from_json_value(value, "Patient")?;
        wire_to_domain(wire)
    }

    /// Render a Patient resource as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if serialisation fails.
    pub fn render(data: &PatientData) -> FhirResult<String> {
        let wire = domain_to_wire(data);
        serde_json::to_string(&wire)
            .map_err(|e| FhirError::Translation(format!("Failed to serialise patient: {e}")))
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
struct PatientWire {
    #[serde(rename = "resourceType")]
    resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    identifier: Vec<IdentifierWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    name: Vec<HumanNameWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    telecom: Vec<ContactPointWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    gender: Option<String>,

    #[serde(rename = "birthDate", skip_serializing_if = "Option::is_none")]
    birth_date: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    address: Vec<AddressWire>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
struct HumanNameWire {
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    use_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    family: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    given: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
struct ContactPointWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,

    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    use_type: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
struct AddressWire {
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    use_type: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    line: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    city: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<String>,

    #[serde(rename = "postalCode", skip_serializing_if = "Option::is_none")]
    postal_code: Option<String>,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn parse_birth_date(raw: &str) -> FhirResult<Option<NaiveDate>> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    // Year or year-month precision.
    let partial = matches!(raw.len(), 4 | 7)
        && raw
            .bytes()
            .enumerate()
            .all(|(i, b)| if i == 4 { b == b'-' } else { b.is_ascii_digit() });
    if partial {
        return Ok(None);
    }
    Err(FhirError::Translation(format!("Invalid birthDate: '{raw}'")))
}

fn primary_name(names: &[HumanNameWire]) -> Option<&HumanNameWire> {
    names
        .iter()
        .find(|n| n.use_type.as_deref() == Some("official"))
        .or_else(|| names.first())
}

fn wire_to_domain(wire: PatientWire) -> FhirResult<PatientData> {
    expect_resource_type(&wire.resource_type, "Patient")?;

    let id = wire
        .id
        .as_deref()
        .map(ResourceId::parse)
        .transpose()
        .map_err(|e| FhirError::Translation(format!("Invalid patient ID: {e}")))?;

    let gender = wire
        .gender
        .as_deref()
        .map(str::parse::<Gender>)
        .transpose()
        .map_err(|e| FhirError::Translation(e.to_string()))?;

    let birth_date = match wire.birth_date.as_deref() {
        Some(raw) => parse_birth_date(raw)?,
        None => None,
    };

    let (family, given) = match primary_name(&wire.name) {
        Some(n) => (n.family.clone(), n.given.clone()),
        None => (None, Vec::new()),
    };

    let telecom = wire
        .telecom
        .into_iter()
        .filter(|t| t.system.as_deref().map_or(true, |s| s == "phone"))
        .filter_map(|t| {
            let value = t.value?;
            Some(ContactPointData {
                value,
                use_type: t.use_type.as_deref().and_then(ContactUse::from_wire),
            })
        })
        .collect();

    let address = wire
        .address
        .into_iter()
        .map(|a| AddressData {
            line: a.line,
            city: a.city,
            state: a.state,
            postal_code: a.postal_code,
        })
        .collect();

    // Identifiers without a value carry nothing we can match on.
    let identifiers = wire
        .identifier
        .into_iter()
        .filter_map(|i| {
            let value = i.value?;
            Some(IdentifierData {
                system: i.system,
                type_code: i
                    .type_
                    .as_ref()
                    .and_then(|t| t.first_code())
                    .map(str::to_string),
                value,
            })
        })
        .collect();

    Ok(PatientData {
        id,
        family,
        given,
        birth_date,
        gender,
        telecom,
        address,
        identifiers,
    })
}

fn domain_to_wire(data: &PatientData) -> PatientWire {
    let name = if data.family.is_some() || !data.given.is_empty() {
        vec![HumanNameWire {
            use_type: Some("official".to_string()),
            family: data.family.clone(),
            given: data.given.clone(),
        }]
    } else {
        vec![]
    };

    PatientWire {
        resource_type: "Patient".to_string(),
        id: data.id.as_ref().map(ResourceId::to_string),
        identifier: data
            .identifiers
            .iter()
            .map(|i| IdentifierWire {
                use_type: None,
                type_: i.type_code.as_deref().map(|code| {
                    CodeableConceptWire::coded(
                        "http://terminology.hl7.org/CodeSystem/v2-0203",
                        code,
                    )
                }),
                system: i.system.clone(),
                value: Some(i.value.clone()),
            })
            .collect(),
        name,
        telecom: data
            .telecom
            .iter()
            .map(|t| ContactPointWire {
                system: Some("phone".to_string()),
                value: Some(t.value.clone()),
                use_type: t.use_type.map(|u| u.to_wire().to_string()),
            })
            .collect(),
        gender: data.gender.map(|g| g.as_str().to_string()),
        birth_date: data.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
        address: data
            .address
            .iter()
            .map(|a| AddressWire {
                use_type: Some("home".to_string()),
                line: a.line.clone(),
                city: a.city.clone(),
                state: a.state.clone(),
                postal_code: a.postal_code.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_HIT: &str = r#"{
        "resourceType": "Patient",
        "id": "pat-001",
        "meta": { "versionId": "3", "lastUpdated": "2025-06-01T10:00:00Z" },
        "identifier": [
            {
                "type": { "coding": [{ "system": "http://terminology.hl7.org/CodeSystem/v2-0203", "code": "MR" }] },
                "system": "urn:oid:1.2.36.146.595.217.0.1",
                "value": "MRN-4411"
            },
            { "system": "urn:example:no-value" }
        ],
        "name": [
            { "use": "nickname", "given": ["Mari"] },
            { "use": "official", "family": "Rodriguez", "given": ["Maria", "Elena"] }
        ],
        "telecom": [
            { "system": "phone", "value": "217-555-1234", "use": "home" },
            { "system": "email", "value": "maria@example.org" }
        ],
        "gender": "female",
        "birthDate": "1979-03-15",
        "address": [{ "use": "home", "line": ["123 Main Street"], "city": "Springfield", "state": "IL", "postalCode": "62701" }]
    }"#;

    #[test]
    fn parses_registry_patient_and_ignores_unmodelled_elements() {
        let patient = Patient::parse(SEARCH_HIT).expect("parse patient");

        assert_eq!(patient.id.as_ref().map(ResourceId::as_str), Some("pat-001"));
        assert_eq!(patient.family.as_deref(), Some("Rodriguez"));
        assert_eq!(patient.given, vec!["Maria", "Elena"]);
        assert_eq!(patient.birth_date, NaiveDate::from_ymd_opt(1979, 3, 15));
        assert_eq!(patient.gender, Some(Gender::Female));
        assert_eq!(patient.telecom.len(), 1, "email contact is not a phone");
        assert_eq!(patient.telecom[0].use_type, Some(ContactUse::Home));
        assert_eq!(patient.identifiers.len(), 1, "value-less identifier dropped");
        assert_eq!(patient.identifiers[0].type_code.as_deref(), Some("MR"));
        assert_eq!(patient.address[0].postal_code.as_deref(), Some("62701"));
    }

    #[test]
    fn partial_birth_date_translates_to_none() {
        let input = r#"{ "resourceType": "Patient", "id": "p1", "birthDate": "1979-03" }"#;
        let patient = Patient::parse(input).expect("partial date is legal");
        assert!(patient.birth_date.is_none());
    }

    #[test]
    fn rejects_invalid_calendar_date() {
        let input = r#"{ "resourceType": "Patient", "id": "p1", "birthDate": "1979-02-30" }"#;
        let err = Patient::parse(input).expect_err("not a real date");
        assert!(matches!(err, FhirError::Translation(msg) if msg.contains("birthDate")));
    }

    #[test]
    fn rejects_invalid_resource_type() {
        let input = r#"{ "resourceType": "Practitioner", "id": "dr-sarah-chen" }"#;
        let err = Patient::parse(input).expect_err("wrong resource type");
        match err {
            FhirError::InvalidInput(msg) => {
                assert!(msg.contains("Patient"));
                assert!(msg.contains("Practitioner"));
            }
            other => panic!("expected InvalidInput error, got {other:?}"),
        }
    }

    #[test]
    fn schema_mismatch_reports_field_path() {
        let input = r#"{ "resourceType": "Patient", "name": [{ "family": "Doe", "given": "John" }] }"#;
        let err = Patient::parse(input).expect_err("given must be an array");
        match err {
            FhirError::Translation(msg) => assert!(msg.contains("given"), "{msg}"),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_gender_code() {
        let input = r#"{ "resourceType": "Patient", "gender": "F" }"#;
        assert!(matches!(
            Patient::parse(input),
            Err(FhirError::Translation(_))
        ));
    }

    #[test]
    fn renders_create_request_without_id() {
        let data = PatientData {
            id: None,
            family: Some("Rodriguez".into()),
            given: vec!["Maria".into()],
            birth_date: NaiveDate::from_ymd_opt(1979, 3, 15),
            gender: Some(Gender::Female),
            telecom: vec![
                ContactPointData {
                    value: "217-555-1234".into(),
                    use_type: Some(ContactUse::Home),
                },
                ContactPointData {
                    value: "217-555-9876".into(),
                    use_type: Some(ContactUse::Work),
                },
            ],
            address: vec![AddressData {
                line: vec!["123 Main Street".into()],
                city: Some("Springfield".into()),
                state: Some("IL".into()),
                postal_code: Some("62701".into()),
            }],
            identifiers: vec![],
        };

        let json = Patient::render(&data).expect("render patient");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");

        assert_eq!(value["resourceType"], "Patient");
        assert!(value.get("id").is_none());
        assert!(value.get("identifier").is_none());
        assert_eq!(value["name"][0]["use"], "official");
        assert_eq!(value["name"][0]["family"], "Rodriguez");
        assert_eq!(value["birthDate"], "1979-03-15");
        assert_eq!(value["gender"], "female");
        assert_eq!(value["telecom"][1]["use"], "work");
        assert_eq!(value["telecom"][1]["system"], "phone");
        assert_eq!(value["address"][0]["use"], "home");
        assert_eq!(value["address"][0]["postalCode"], "62701");
    }
}
