//! Simulated eligibility clearinghouse.
//!
//! Stands in for a real X12 270/271 exchange in non-production deployments. Every member is
//! enrolled in one plan; a service date inside the plan period is active, anything else is
//! inactive.

use chrono::NaiveDate;
use intake_core::{EligibilityState, EligibilityStatus};

#[derive(Clone, Debug)]
pub struct SimulatedClearinghouse {
    plan_name: String,
    coverage_start: NaiveDate,
    coverage_end: NaiveDate,
}

impl Default for SimulatedClearinghouse {
    fn default() -> Self {
        Self {
            plan_name: "Meridian Health Plan of Illinois".into(),
            coverage_start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
            coverage_end: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap_or_default(),
        }
    }
}

impl SimulatedClearinghouse {
    pub fn new(plan_name: impl Into<String>, coverage_start: NaiveDate, coverage_end: NaiveDate) -> Self {
        Self {
            plan_name: plan_name.into(),
            coverage_start,
            coverage_end,
        }
    }

    pub fn check(&self, payer_id: &str, service_date: NaiveDate) -> EligibilityStatus {
        let in_period = (self.coverage_start..=self.coverage_end).contains(&service_date);
        EligibilityStatus {
            state: if in_period {
                EligibilityState::Active
            } else {
                EligibilityState::Inactive
            },
            payer_id: payer_id.to_string(),
            service_date,
            plan_name: Some(self.plan_name.clone()),
            coverage_start: Some(self.coverage_start),
            coverage_end: Some(self.coverage_end),
            copay_cents: Some(0),
            prior_auth_required: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn service_date_in_plan_period_is_active() {
        let status = SimulatedClearinghouse::default().check("IL-MCD-88123", date("2026-01-05"));
        assert_eq!(status.state, EligibilityState::Active);
        assert_eq!(status.plan_name.as_deref(), Some("Meridian Health Plan of Illinois"));
        assert_eq!(status.copay_cents, Some(0));
        assert!(!status.prior_auth_required);
    }

    #[test]
    fn service_date_outside_plan_period_is_inactive() {
        let house = SimulatedClearinghouse::new("Test Plan", date("2025-01-01"), date("2025-12-31"));
        assert_eq!(house.check("X", date("2026-01-01")).state, EligibilityState::Inactive);
        assert_eq!(house.check("X", date("2025-12-31")).state, EligibilityState::Active);
    }
}
