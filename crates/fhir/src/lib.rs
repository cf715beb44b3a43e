//! FHIR R4 wire/boundary support for the registration workflow.
//!
//! This crate provides **wire models** and **translation helpers** for the JSON resources
//! exchanged with a FHIR registry:
//! - `Patient` (search results and create requests)
//! - `Bundle` (search-set responses)
//! - `Coverage` and `Encounter` (downstream registration artifacts)
//! - `OperationOutcome` (error bodies returned with rejected writes)
//!
//! This crate focuses on:
//! - FHIR semantic alignment for the fields the workflow actually reads or writes
//! - serialisation/deserialisation with field-path diagnostics
//! - translation between domain-level carriers and wire structs
//!
//! It performs no I/O. Transport lives in `registry-client`.

pub mod bundle;
pub mod coverage;
mod datatypes;
pub mod encounter;
pub mod outcome;
pub mod patient;

// Re-export facades
pub use bundle::Bundle;
pub use coverage::Coverage;
pub use encounter::Encounter;
pub use outcome::OperationOutcome;
pub use patient::Patient;

// Re-export public domain-level types
pub use bundle::SearchSet;
pub use coverage::CoverageData;
pub use datatypes::parse_reference;
pub use encounter::EncounterData;
pub use patient::{AddressData, ContactPointData, ContactUse, IdentifierData, PatientData};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;

/// Deserialises `T` from JSON text, reporting the failing field path on schema mismatch.
pub(crate) fn from_json_str<T>(json_text: &str, what: &str) -> FhirResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let mut deserializer = serde_json::Deserializer::from_str(json_text);
    from_deserializer(&mut deserializer, what)
}

/// Deserialises `T` from an already-parsed JSON value (for example a bundle entry).
pub(crate) fn from_json_value<T>(value: serde_json::Value, what: &str) -> FhirResult<T>
where
    T: serde::de::DeserializeOwned,
{
    from_deserializer(value, what)
}

fn from_deserializer<'de, D, T>(deserializer: D, what: &str) -> FhirResult<T>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    serde_path_to_error::deserialize::<_, T>(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let source = err.into_inner();
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        FhirError::Translation(format!("{what} schema mismatch at {path}: {source}"))
    })
}

/// Rejects a resource whose `resourceType` is not the expected one.
pub(crate) fn expect_resource_type(actual: &str, expected: &str) -> FhirResult<()> {
    if actual != expected {
        return Err(FhirError::InvalidInput(format!(
            "Expected resourceType '{expected}', got '{actual}'"
        )));
    }
    Ok(())
}
