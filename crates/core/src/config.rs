//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the resolver and
//! orchestrator inside an `Arc`. Nothing in this crate reads process-wide environment
//! variables: binaries collect values (YAML file, then environment overrides) into a
//! [`ConfigFile`] and convert it with [`ConfigFile::into_config`], which validates every value.

use crate::constants::{
    DEFAULT_BIRTH_DATE_WEIGHT, DEFAULT_CALL_TIMEOUT, DEFAULT_FAMILY_NAME_WEIGHT,
    DEFAULT_GENDER_RECORDED_WEIGHT, DEFAULT_GIVEN_NAME_WEIGHT, DEFAULT_IDENTIFIER_PRESENT_WEIGHT,
    DEFAULT_MATCH_THRESHOLD, DEFAULT_PAYER_DISPLAY, DEFAULT_PAYER_IDENTIFIER_SYSTEM,
    ENV_AMBIGUITY_MARGIN, ENV_CALL_TIMEOUT_MS, ENV_MATCH_THRESHOLD, ENV_REGISTRY_URL,
    ENV_SKIP_ELIGIBILITY, MAX_CALL_TIMEOUT, WEIGHT_TOTAL_TOLERANCE,
};
use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Per-factor weights used by the match scorer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchWeights {
    pub family_name: f64,
    pub given_name: f64,
    pub birth_date: f64,
    pub gender_recorded: f64,
    pub identifier_present: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            family_name: DEFAULT_FAMILY_NAME_WEIGHT,
            given_name: DEFAULT_GIVEN_NAME_WEIGHT,
            birth_date: DEFAULT_BIRTH_DATE_WEIGHT,
            gender_recorded: DEFAULT_GENDER_RECORDED_WEIGHT,
            identifier_present: DEFAULT_IDENTIFIER_PRESENT_WEIGHT,
        }
    }
}

impl MatchWeights {
    fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("family_name", self.family_name),
            ("given_name", self.given_name),
            ("birth_date", self.birth_date),
            ("gender_recorded", self.gender_recorded),
            ("identifier_present", self.identifier_present),
        ]
    }

    /// Sum of all five weights.
    pub fn total(&self) -> f64 {
        self.named().iter().map(|(_, w)| w).sum()
    }

    /// Checks every weight is a finite value in `[0, 1]` and that they sum to 1.0.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending weight.
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, weight) in self.named() {
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::Invalid(format!(
                    "match weight {name} must be between 0 and 1, got {weight}"
                )));
            }
        }
        let total = self.total();
        if (total - 1.0).abs() > WEIGHT_TOTAL_TOLERANCE {
            return Err(ConfigError::Invalid(format!(
                "match weights must sum to 1.0, got {total}"
            )));
        }
        Ok(())
    }
}

/// How the orchestrator treats the eligibility step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EligibilityPolicy {
    /// Verify eligibility; a failed check fails the workflow.
    #[default]
    Required,
    /// Verify eligibility; a failed check is recorded as unverified and the workflow continues.
    BestEffort,
    /// Never call the eligibility service.
    Skip,
}

/// Payer details written onto coverage records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayerSettings {
    pub display: String,
    pub identifier_system: String,
}

impl Default for PayerSettings {
    fn default() -> Self {
        Self {
            display: DEFAULT_PAYER_DISPLAY.into(),
            identifier_system: DEFAULT_PAYER_IDENTIFIER_SYSTEM.into(),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct IntakeConfig {
    registry_base_url: String,
    match_threshold: f64,
    weights: MatchWeights,
    call_timeout: Duration,
    eligibility: EligibilityPolicy,
    ambiguity_margin: Option<f64>,
    payer: PayerSettings,
}

impl IntakeConfig {
    /// Create an `IntakeConfig` with default matching policy for the given registry endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the endpoint is not an `http(s)://` URL.
    pub fn new(registry_base_url: impl Into<String>) -> ConfigResult<Self> {
        let registry_base_url = registry_base_url.into().trim().to_string();
        validate_base_url(&registry_base_url)?;

        Ok(Self {
            registry_base_url,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            weights: MatchWeights::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            eligibility: EligibilityPolicy::default(),
            ambiguity_margin: None,
            payer: PayerSettings::default(),
        })
    }

    /// Read and validate a YAML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or any value is invalid.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        ConfigFile::read(path)?.into_config()
    }

    pub fn with_match_threshold(mut self, threshold: f64) -> ConfigResult<Self> {
        validate_unit_interval("match_threshold", threshold)?;
        self.match_threshold = threshold;
        Ok(self)
    }

    pub fn with_weights(mut self, weights: MatchWeights) -> ConfigResult<Self> {
        weights.validate()?;
        self.weights = weights;
        Ok(self)
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> ConfigResult<Self> {
        if timeout.is_zero() || timeout > MAX_CALL_TIMEOUT {
            return Err(ConfigError::Invalid(format!(
                "call timeout must be between 1 ms and {} s",
                MAX_CALL_TIMEOUT.as_secs()
            )));
        }
        self.call_timeout = timeout;
        Ok(self)
    }

    pub fn with_eligibility(mut self, policy: EligibilityPolicy) -> Self {
        self.eligibility = policy;
        self
    }

    pub fn with_ambiguity_margin(mut self, margin: Option<f64>) -> ConfigResult<Self> {
        if let Some(margin) = margin {
            validate_unit_interval("ambiguity_margin", margin)?;
        }
        self.ambiguity_margin = margin;
        Ok(self)
    }

    pub fn with_payer(mut self, payer: PayerSettings) -> ConfigResult<Self> {
        if payer.display.trim().is_empty() || payer.identifier_system.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "payer display and identifier_system cannot be empty".into(),
            ));
        }
        self.payer = payer;
        Ok(self)
    }

    pub fn registry_base_url(&self) -> &str {
        &self.registry_base_url
    }

    pub fn match_threshold(&self) -> f64 {
        self.match_threshold
    }

    pub fn weights(&self) -> &MatchWeights {
        &self.weights
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn eligibility(&self) -> EligibilityPolicy {
        self.eligibility
    }

    pub fn ambiguity_margin(&self) -> Option<f64> {
        self.ambiguity_margin
    }

    pub fn payer(&self) -> &PayerSettings {
        &self.payer
    }

    /// Render the effective configuration as YAML, in the same shape [`ConfigFile`] reads.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if serialisation fails.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFile {
            registry_base_url: Some(self.registry_base_url.clone()),
            match_threshold: Some(self.match_threshold),
            weights: Some(self.weights),
            call_timeout_ms: Some(self.call_timeout.as_millis() as u64),
            eligibility: Some(self.eligibility),
            skip_eligibility: None,
            ambiguity_margin: self.ambiguity_margin,
            payer: Some(self.payer.clone()),
        };
        Ok(serde_yaml::to_string(&file)?)
    }
}

/// Unvalidated configuration as read from YAML and environment overrides.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<MatchWeights>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligibility: Option<EligibilityPolicy>,
    /// Shorthand for `eligibility: skip`; wins over `eligibility` when true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_eligibility: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambiguity_margin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<PayerSettings>,
}

impl ConfigFile {
    /// Parse configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed YAML or unknown keys.
    pub fn from_yaml(yaml_text: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(yaml_text)?)
    }

    /// Read configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn read(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Apply `INTAKE_*` overrides using `lookup` to fetch variable values.
    ///
    /// Empty or whitespace-only values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if a present variable cannot be parsed.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = get(ENV_REGISTRY_URL) {
            self.registry_base_url = Some(url);
        }
        if let Some(raw) = get(ENV_MATCH_THRESHOLD) {
            self.match_threshold = Some(parse_env(ENV_MATCH_THRESHOLD, &raw)?);
        }
        if let Some(raw) = get(ENV_CALL_TIMEOUT_MS) {
            self.call_timeout_ms = Some(parse_env(ENV_CALL_TIMEOUT_MS, &raw)?);
        }
        if let Some(raw) = get(ENV_SKIP_ELIGIBILITY) {
            self.skip_eligibility = Some(parse_env_bool(ENV_SKIP_ELIGIBILITY, &raw)?);
        }
        if let Some(raw) = get(ENV_AMBIGUITY_MARGIN) {
            self.ambiguity_margin = Some(parse_env(ENV_AMBIGUITY_MARGIN, &raw)?);
        }
        Ok(self)
    }

    /// Read the optional YAML file, apply environment overrides and validate.
    ///
    /// Binaries call this once at startup with `|var| std::env::var(var).ok()`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] met while reading, overriding or validating.
    pub fn resolve<F>(path: Option<&Path>, lookup: F) -> ConfigResult<IntakeConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match path {
            Some(path) => Self::read(path)?,
            None => Self::default(),
        };
        file.with_env_overrides(lookup)?.into_config()
    }

    /// Validate and convert into an [`IntakeConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the registry endpoint is missing or any value is out
    /// of range.
    pub fn into_config(self) -> ConfigResult<IntakeConfig> {
        let url = self.registry_base_url.ok_or_else(|| {
            ConfigError::Invalid(format!(
                "registry_base_url is required (set it in the config file or {ENV_REGISTRY_URL})"
            ))
        })?;

        let mut cfg = IntakeConfig::new(url)?;
        if let Some(threshold) = self.match_threshold {
            cfg = cfg.with_match_threshold(threshold)?;
        }
        if let Some(weights) = self.weights {
            cfg = cfg.with_weights(weights)?;
        }
        if let Some(ms) = self.call_timeout_ms {
            cfg = cfg.with_call_timeout(Duration::from_millis(ms))?;
        }
        if let Some(policy) = self.eligibility {
            cfg = cfg.with_eligibility(policy);
        }
        if self.skip_eligibility == Some(true) {
            cfg = cfg.with_eligibility(EligibilityPolicy::Skip);
        }
        cfg = cfg.with_ambiguity_margin(self.ambiguity_margin)?;
        if let Some(payer) = self.payer {
            cfg = cfg.with_payer(payer)?;
        }
        Ok(cfg)
    }
}

fn validate_base_url(url: &str) -> ConfigResult<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) if !rest.is_empty() && !rest.starts_with('/') => Ok(()),
        _ => Err(ConfigError::Invalid(format!(
            "registry_base_url must be an http(s) URL, got '{url}'"
        ))),
    }
}

fn validate_unit_interval(name: &str, value: f64) -> ConfigResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be between 0 and 1, got {value}"
        )));
    }
    Ok(())
}

fn parse_env<T>(var: &'static str, raw: &str) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::Env {
        var,
        message: format!("'{raw}': {e}"),
    })
}

fn parse_env_bool(var: &'static str, raw: &str) -> ConfigResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            var,
            message: format!("'{raw}' is not a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write as _;

    const REGISTRY: &str = "https://fhir.communityhealthclinic.org/fhir";

    #[test]
    fn defaults_match_documented_policy() {
        let cfg = IntakeConfig::new(REGISTRY).expect("valid config");
        assert_eq!(cfg.match_threshold(), 0.85);
        assert_eq!(cfg.weights(), &MatchWeights::default());
        assert!((cfg.weights().total() - 1.0).abs() < 1e-12);
        assert_eq!(cfg.call_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.eligibility(), EligibilityPolicy::Required);
        assert_eq!(cfg.ambiguity_margin(), None);
        assert_eq!(cfg.payer().display, "Illinois Medicaid");
    }

    #[test]
    fn rejects_non_http_registry_url() {
        for bad in ["", "fhir.example.org", "ftp://fhir.example.org", "https://"] {
            assert!(
                matches!(IntakeConfig::new(bad), Err(ConfigError::Invalid(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cfg = IntakeConfig::new(REGISTRY).unwrap();
        assert!(cfg.clone().with_match_threshold(1.5).is_err());
        assert!(cfg.clone().with_match_threshold(f64::NAN).is_err());
        assert!(cfg.clone().with_call_timeout(Duration::ZERO).is_err());
        assert!(cfg.clone().with_ambiguity_margin(Some(-0.1)).is_err());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let weights = MatchWeights {
            birth_date: 0.5,
            ..MatchWeights::default()
        };
        let err = weights.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("sum to 1.0")));
    }

    #[test]
    fn negative_weight_is_named_in_error() {
        let weights = MatchWeights {
            gender_recorded: -0.1,
            identifier_present: 0.3,
            ..MatchWeights::default()
        };
        let err = weights.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("gender_recorded")));
    }

    #[test]
    fn loads_yaml_file_with_partial_weights() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"registry_base_url: {REGISTRY}
match_threshold: 0.9
call_timeout_ms: 2500
eligibility: best-effort
ambiguity_margin: 0.05
weights:
  given_name: 0.05
  birth_date: 0.5
payer:
  display: Meridian Health Plan of Illinois
  identifier_system: urn:example:meridian
"#
        )
        .unwrap();

        let cfg = IntakeConfig::load(file.path()).expect("load config");
        assert_eq!(cfg.match_threshold(), 0.9);
        assert_eq!(cfg.call_timeout(), Duration::from_millis(2500));
        assert_eq!(cfg.eligibility(), EligibilityPolicy::BestEffort);
        assert_eq!(cfg.ambiguity_margin(), Some(0.05));
        assert_eq!(cfg.weights().given_name, 0.05);
        assert_eq!(cfg.weights().family_name, 0.25);
        assert_eq!(cfg.payer().identifier_system, "urn:example:meridian");
    }

    #[test]
    fn unknown_yaml_keys_are_rejected() {
        let err = ConfigFile::from_yaml("registry_url: https://x\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = IntakeConfig::load(Path::new("/nonexistent/intake.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/intake.yaml"));
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let env: HashMap<&str, &str> = [
            (ENV_REGISTRY_URL, "http://localhost:8080/fhir"),
            (ENV_MATCH_THRESHOLD, "0.7"),
            (ENV_CALL_TIMEOUT_MS, " 500 "),
            (ENV_SKIP_ELIGIBILITY, "yes"),
            (ENV_AMBIGUITY_MARGIN, ""),
        ]
        .into_iter()
        .collect();

        let file = ConfigFile {
            registry_base_url: Some(REGISTRY.into()),
            eligibility: Some(EligibilityPolicy::Required),
            ambiguity_margin: Some(0.02),
            ..ConfigFile::default()
        };

        let cfg = file
            .with_env_overrides(|var| env.get(var).map(|v| v.to_string()))
            .and_then(ConfigFile::into_config)
            .expect("valid config");

        assert_eq!(cfg.registry_base_url(), "http://localhost:8080/fhir");
        assert_eq!(cfg.match_threshold(), 0.7);
        assert_eq!(cfg.call_timeout(), Duration::from_millis(500));
        assert_eq!(cfg.eligibility(), EligibilityPolicy::Skip);
        assert_eq!(cfg.ambiguity_margin(), Some(0.02), "blank env var is unset");
    }

    #[test]
    fn malformed_env_value_names_variable() {
        let err = ConfigFile::default()
            .with_env_overrides(|var| (var == ENV_MATCH_THRESHOLD).then(|| "high".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var, .. } if var == ENV_MATCH_THRESHOLD));
    }

    #[test]
    fn resolve_without_file_uses_environment_only() {
        let cfg = ConfigFile::resolve(None, |var| {
            (var == ENV_REGISTRY_URL).then(|| REGISTRY.to_string())
        })
        .expect("resolve");
        assert_eq!(cfg.registry_base_url(), REGISTRY);
        assert_eq!(cfg.match_threshold(), DEFAULT_MATCH_THRESHOLD);
    }

    #[test]
    fn missing_registry_url_is_invalid() {
        let err = ConfigFile::default().into_config().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains(ENV_REGISTRY_URL)));
    }

    #[test]
    fn yaml_rendering_reloads_to_same_config() {
        let cfg = IntakeConfig::new(REGISTRY)
            .unwrap()
            .with_eligibility(EligibilityPolicy::Skip)
            .with_ambiguity_margin(Some(0.1))
            .unwrap();
        let yaml = cfg.to_yaml().expect("render yaml");
        let reloaded = ConfigFile::from_yaml(&yaml)
            .and_then(ConfigFile::into_config)
            .expect("reload");
        assert_eq!(reloaded, cfg);
    }
}
