//! # Registry Client
//!
//! HTTP implementation of [`intake_core::RegistryClient`] against a FHIR R4 registry:
//! - patient search (`GET /Patient`), retried with backoff on transient failures
//! - Patient, Coverage and Encounter creation (`POST`), each sent exactly once
//! - eligibility answered by a [`SimulatedClearinghouse`]
//!
//! Wire formats come from the `fhir` crate; this crate only adds transport and status mapping.

pub mod clearinghouse;
pub mod http;
pub mod retry;

pub use clearinghouse::SimulatedClearinghouse;
pub use http::{ClientError, FhirRegistryClient};
pub use retry::RetryPolicy;
