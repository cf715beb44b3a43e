//! Constants used throughout the intake core crate.
//!
//! Defaults live here so tests, configuration and documentation agree on one value.

use std::time::Duration;

/// Default acceptance threshold: the top match must score strictly above this to be resolved.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.85;

/// Default weight for a case-insensitive family-name match.
pub const DEFAULT_FAMILY_NAME_WEIGHT: f64 = 0.25;

/// Default weight for a case-insensitive given-name match (only when the query has one).
pub const DEFAULT_GIVEN_NAME_WEIGHT: f64 = 0.15;

/// Default weight for an exact birth-date match.
pub const DEFAULT_BIRTH_DATE_WEIGHT: f64 = 0.40;

/// Default weight for a candidate with a recorded gender.
pub const DEFAULT_GENDER_RECORDED_WEIGHT: f64 = 0.10;

/// Default weight for a candidate holding at least one external identifier.
pub const DEFAULT_IDENTIFIER_PRESENT_WEIGHT: f64 = 0.10;

/// Permitted deviation of the weight total from 1.0.
pub const WEIGHT_TOTAL_TOLERANCE: f64 = 1e-6;

/// Slack applied when comparing a score gap against the ambiguity margin.
pub const SCORE_GAP_TOLERANCE: f64 = 1e-9;

/// Default per-call timeout applied to every registry operation.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound accepted for the per-call timeout.
pub const MAX_CALL_TIMEOUT: Duration = Duration::from_secs(600);

/// Maximum length, in characters, of a given or family name.
pub const MAX_NAME_LEN: usize = 100;

/// Default payer display name written on coverage records.
pub const DEFAULT_PAYER_DISPLAY: &str = "Illinois Medicaid";

/// Default identifier system for payer member identifiers.
pub const DEFAULT_PAYER_IDENTIFIER_SYSTEM: &str = "http://illinois.gov/medicaid";

/// Environment variable naming the registry base endpoint.
pub const ENV_REGISTRY_URL: &str = "INTAKE_REGISTRY_URL";

/// Environment variable overriding the acceptance threshold.
pub const ENV_MATCH_THRESHOLD: &str = "INTAKE_MATCH_THRESHOLD";

/// Environment variable overriding the per-call timeout, in milliseconds.
pub const ENV_CALL_TIMEOUT_MS: &str = "INTAKE_CALL_TIMEOUT_MS";

/// Environment variable that, when true, skips eligibility verification.
pub const ENV_SKIP_ELIGIBILITY: &str = "INTAKE_SKIP_ELIGIBILITY";

/// Environment variable overriding the ambiguity margin.
pub const ENV_AMBIGUITY_MARGIN: &str = "INTAKE_AMBIGUITY_MARGIN";
