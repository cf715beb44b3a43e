//! FHIR Bundle handling for patient search responses.
//!
//! A search returns a `searchset` Bundle. Entries in `outcome` search mode (an
//! `OperationOutcome` describing warnings) and any non-Patient resources are ignored.

use crate::patient::{Patient, PatientData};
use crate::{expect_resource_type, from_json_str, FhirResult};
use serde::Deserialize;

/// Patients extracted from a search-set bundle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchSet {
    /// Server-reported total, when present. May exceed `patients.len()` if paged.
    pub total: Option<u64>,
    pub patients: Vec<PatientData>,
    /// Link to the next page, if the registry paginated the result.
    pub next_page: Option<String>,
}

/// Bundle resource operations.
pub struct Bundle;

impl Bundle {
    /// Parse a search-set bundle and translate its Patient entries.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError`] if the body is not a Bundle or any Patient entry is
    /// malformed. A malformed entry fails the whole bundle rather than being skipped, so a
    /// caller never mistakes a partially-read result for a complete one.
    pub fn parse_search(json_text: &str) -> FhirResult<SearchSet> {
        let wire: BundleWire = from_json_str(json_text, "Bundle")?;
        expect_resource_type(&wire.resource_type, "Bundle")?;

        let mut patients = Vec::with_capacity(wire.entry.len());
        for entry in wire.entry {
            if entry.search.as_ref().and_then(|s| s.mode.as_deref()) == Some("outcome") {
                continue;
            }
            let Some(resource) = entry.resource else {
                continue;
            };
            if resource.get("resourceType").and_then(|v| v.as_str()) != Some("Patient") {
                continue;
            }
            patients.push(Patient::from_value(resource)?);
        }

        let next_page = wire
            .link
            .into_iter()
            .find(|l| l.relation == "next")
            .map(|l| l.url);

        Ok(SearchSet {
            total: wire.total,
            patients,
            next_page,
        })
    }
}

#[derive(Deserialize)]
struct BundleWire {
    #[serde(rename = "resourceType")]
    resource_type: String,

    #[serde(default)]
    total: Option<u64>,

    #[serde(default)]
    link: Vec<BundleLinkWire>,

    #[serde(default)]
    entry: Vec<BundleEntryWire>,
}

#[derive(Deserialize)]
struct BundleLinkWire {
    relation: String,
    url: String,
}

#[derive(Deserialize)]
struct BundleEntryWire {
    #[serde(default)]
    resource: Option<serde_json::Value>,

    #[serde(default)]
    search: Option<BundleSearchWire>,
}

#[derive(Deserialize)]
struct BundleSearchWire {
    #[serde(default)]
    mode: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FhirError;

    #[test]
    fn extracts_patients_and_skips_outcome_entries() {
        let input = r#"{
            "resourceType": "Bundle",
            "type": "searchset",
            "total": 2,
            "link": [
                { "relation": "self", "url": "https://fhir.example.org/Patient?family=Rodriguez" },
                { "relation": "next", "url": "https://fhir.example.org/Patient?page=2" }
            ],
            "entry": [
                { "resource": { "resourceType": "Patient", "id": "b", "birthDate": "1979-03-15" }, "search": { "mode": "match" } },
                { "resource": { "resourceType": "OperationOutcome", "issue": [] }, "search": { "mode": "outcome" } },
                { "resource": { "resourceType": "Patient", "id": "a" } }
            ]
        }"#;

        let set = Bundle::parse_search(input).expect("parse bundle");
        assert_eq!(set.total, Some(2));
        let ids: Vec<_> = set
            .patients
            .iter()
            .map(|p| p.id.as_ref().unwrap().as_str())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(
            set.next_page.as_deref(),
            Some("https://fhir.example.org/Patient?page=2")
        );
    }

    #[test]
    fn empty_bundle_has_no_patients() {
        let input = r#"{ "resourceType": "Bundle", "type": "searchset", "total": 0 }"#;
        let set = Bundle::parse_search(input).expect("parse bundle");
        assert!(set.patients.is_empty());
        assert!(set.next_page.is_none());
    }

    #[test]
    fn malformed_entry_fails_whole_bundle() {
        let input = r#"{
            "resourceType": "Bundle",
            "entry": [{ "resource": { "resourceType": "Patient", "id": "has space" } }]
        }"#;
        assert!(matches!(
            Bundle::parse_search(input),
            Err(FhirError::Translation(_))
        ));
    }

    #[test]
    fn rejects_non_bundle_body() {
        let input = r#"{ "resourceType": "OperationOutcome", "issue": [] }"#;
        assert!(matches!(
            Bundle::parse_search(input),
            Err(FhirError::InvalidInput(_))
        ));
    }
}
