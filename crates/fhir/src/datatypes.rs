//! Wire representations of the FHIR general-purpose datatypes used by this crate.
//!
//! Inbound resources come from a live registry and routinely carry elements this crate does not
//! model (`meta`, `text`, extensions), so these structs tolerate unknown fields.

use crate::{FhirError, FhirResult};
use intake_types::ResourceId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub(crate) struct CodingWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub(crate) struct CodeableConceptWire {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<CodingWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodeableConceptWire {
    pub fn coded(system: &str, code: &str) -> Self {
        Self {
            coding: vec![CodingWire {
                system: Some(system.to_string()),
                code: Some(code.to_string()),
                display: None,
            }],
            text: None,
        }
    }

    pub fn first_code(&self) -> Option<&str> {
        self.coding.iter().find_map(|c| c.code.as_deref())
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub(crate) struct IdentifierWire {
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_type: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<CodeableConceptWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub(crate) struct ReferenceWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl ReferenceWire {
    pub fn to(resource_type: &str, id: &ResourceId) -> Self {
        Self {
            reference: Some(id.reference(resource_type)),
            display: None,
        }
    }

    pub fn display(text: &str) -> Self {
        Self {
            reference: None,
            display: Some(text.to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub(crate) struct PeriodWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// Extracts the resource id from a FHIR reference of the expected type.
///
/// Accepts relative (`Patient/123`), versioned (`Patient/123/_history/2`) and absolute
/// (`https://host/fhir/Patient/123`) forms.
///
/// # Errors
///
/// Returns [`FhirError::Translation`] if the reference does not point at `expected_type`
/// or carries an invalid id.
pub fn parse_reference(reference: &str, expected_type: &str) -> FhirResult<ResourceId> {
    let trimmed = match reference.find("/_history/") {
        Some(idx) => &reference[..idx],
        None => reference,
    };

    let mut segments = trimmed.rsplit('/');
    let id = segments.next().unwrap_or_default();
    let resource_type = segments.next().unwrap_or_default();

    if resource_type != expected_type {
        return Err(FhirError::Translation(format!(
            "reference '{reference}' does not point at a {expected_type}"
        )));
    }

    ResourceId::parse(id)
        .map_err(|e| FhirError::Translation(format!("reference '{reference}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_relative_reference() {
        let id = parse_reference("Patient/abc-1", "Patient").expect("valid reference");
        assert_eq!(id.as_str(), "abc-1");
    }

    #[test]
    fn parses_absolute_and_versioned_references() {
        let id = parse_reference("https://fhir.example.org/fhir/Patient/77/_history/3", "Patient")
            .expect("valid reference");
        assert_eq!(id.as_str(), "77");
    }

    #[test]
    fn rejects_reference_of_wrong_type() {
        let err = parse_reference("Practitioner/dr-chen", "Patient").unwrap_err();
        assert!(matches!(err, FhirError::Translation(msg) if msg.contains("Patient")));
    }

    #[test]
    fn rejects_bare_id() {
        assert!(parse_reference("123", "Patient").is_err());
    }
}
