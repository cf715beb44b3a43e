//! Match scoring.
//!
//! A candidate's score is the sum of the configured weights of the factors it satisfies, summed
//! in a fixed order and clamped to `[0, 1]`. Matching is exact (case-insensitive on names).

use crate::config::MatchWeights;
use crate::demographics::{name_key, Demographics};
use crate::registry::CandidateRecord;
use serde::Serialize;
use std::cmp::Ordering;

/// Which scoring factors a candidate satisfied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MatchFactors {
    pub family_name: bool,
    pub given_name: bool,
    pub birth_date: bool,
    pub gender_recorded: bool,
    pub identifier_present: bool,
}

impl MatchFactors {
    pub fn all() -> Self {
        Self {
            family_name: true,
            given_name: true,
            birth_date: true,
            gender_recorded: true,
            identifier_present: true,
        }
    }
}

/// A scored candidate.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchResult {
    pub candidate: CandidateRecord,
    pub score: f64,
    /// Normalised candidate name the query was compared against.
    pub compared_name: String,
    pub factors: MatchFactors,
}

#[derive(Clone, Copy, Debug)]
pub struct MatchScorer {
    weights: MatchWeights,
}

impl MatchScorer {
    pub fn new(weights: MatchWeights) -> Self {
        Self { weights }
    }

    /// Determine which factors `candidate` satisfies for `query`.
    pub fn factors(&self, query: &Demographics, candidate: &CandidateRecord) -> MatchFactors {
        let family_name = candidate
            .family_name
            .as_deref()
            .is_some_and(|family| name_key(family) == query.family_name().key());

        let given_name = query.given_name().is_some_and(|given| {
            candidate
                .given_names
                .iter()
                .any(|candidate_given| name_key(candidate_given) == given.key())
        });

        MatchFactors {
            family_name,
            given_name,
            birth_date: candidate.birth_date == Some(query.birth_date()),
            gender_recorded: candidate.gender.is_some(),
            identifier_present: !candidate.identifiers.is_empty(),
        }
    }

    /// Weighted score for a set of satisfied factors, in `[0, 1]`.
    pub fn score_factors(&self, factors: MatchFactors) -> f64 {
        let w = &self.weights;
        let mut score = 0.0;
        for (hit, weight) in [
            (factors.family_name, w.family_name),
            (factors.given_name, w.given_name),
            (factors.birth_date, w.birth_date),
            (factors.gender_recorded, w.gender_recorded),
            (factors.identifier_present, w.identifier_present),
        ] {
            if hit {
                score += weight;
            }
        }
        if factors == MatchFactors::all() {
            // Rounding in the sum must not keep a perfect match below 1.0.
            return 1.0;
        }
        score.clamp(0.0, 1.0)
    }

    pub fn evaluate(&self, query: &Demographics, candidate: CandidateRecord) -> MatchResult {
        let factors = self.factors(query, &candidate);
        let compared_name = compared_name(&candidate);
        MatchResult {
            score: self.score_factors(factors),
            compared_name,
            factors,
            candidate,
        }
    }
}

fn compared_name(candidate: &CandidateRecord) -> String {
    let given = candidate.given_names.join(" ");
    let family = candidate.family_name.as_deref().unwrap_or_default();
    name_key(&format!("{given} {family}"))
}

/// Sort results by descending score, ties broken by ascending candidate identifier.
pub fn rank(results: &mut [MatchResult]) {
    results.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.candidate.id.cmp(&b.candidate.id),
        other => other,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demographics::{normalize, RawDemographics};
    use crate::registry::ExternalIdentifier;
    use chrono::NaiveDate;
    use intake_types::{Gender, ResourceId};

    fn query(given: Option<&str>) -> Demographics {
        normalize(&RawDemographics {
            family_name: "Rodriguez".into(),
            given_name: given.map(str::to_string),
            birth_date: "1979-03-15".into(),
            ..RawDemographics::default()
        })
        .unwrap()
    }

    fn candidate(id: &str) -> CandidateRecord {
        CandidateRecord {
            id: ResourceId::parse(id).unwrap(),
            display_name: "Maria Rodriguez".into(),
            family_name: Some("RODRIGUEZ".into()),
            given_names: vec!["Ana".into(), "maria".into()],
            birth_date: NaiveDate::from_ymd_opt(1979, 3, 15),
            gender: Some(Gender::Female),
            identifiers: vec![ExternalIdentifier {
                system: Some("urn:clinic:mrn".into()),
                type_code: Some("MR".into()),
                value: "MRN-1".into(),
            }],
        }
    }

    fn scorer() -> MatchScorer {
        MatchScorer::new(MatchWeights::default())
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn full_match_scores_exactly_one() {
        let result = scorer().evaluate(&query(Some("Maria")), candidate("pat-1"));
        assert_eq!(result.factors, MatchFactors::all());
        assert_eq!(result.score, 1.0);
        assert_eq!(result.compared_name, "ana maria rodriguez");
    }

    #[test]
    fn given_name_factor_needs_query_given_name() {
        let result = scorer().evaluate(&query(None), candidate("pat-1"));
        assert!(!result.factors.given_name);
        assert!(approx(result.score, 0.85));
    }

    #[test]
    fn mismatched_given_name_does_not_score() {
        let result = scorer().evaluate(&query(Some("Mariana")), candidate("pat-1"));
        assert!(!result.factors.given_name);
        assert!(approx(result.score, 0.85));
    }

    #[test]
    fn score_is_deterministic() {
        let q = query(Some("Maria"));
        let c = CandidateRecord {
            gender: None,
            ..candidate("pat-1")
        };
        let first = scorer().evaluate(&q, c.clone());
        let second = scorer().evaluate(&q, c);
        assert_eq!(first.score.to_bits(), second.score.to_bits());
    }

    #[test]
    fn score_is_monotonic_in_factors() {
        let scorer = scorer();
        let subset = |mask: u8| MatchFactors {
            family_name: mask & 1 != 0,
            given_name: mask & 2 != 0,
            birth_date: mask & 4 != 0,
            gender_recorded: mask & 8 != 0,
            identifier_present: mask & 16 != 0,
        };

        for mask in 0u8..32 {
            let base = scorer.score_factors(subset(mask));
            assert!((0.0..=1.0).contains(&base));
            for bit in 0..5 {
                let superset = mask | (1 << bit);
                assert!(
                    scorer.score_factors(subset(superset)) >= base,
                    "adding factor {bit} to {mask:05b} lowered the score"
                );
            }
        }
        assert_eq!(scorer.score_factors(subset(31)), 1.0);
        assert_eq!(scorer.score_factors(subset(0)), 0.0);
    }

    #[test]
    fn custom_weights_are_applied() {
        let scorer = MatchScorer::new(MatchWeights {
            family_name: 0.5,
            given_name: 0.0,
            birth_date: 0.5,
            gender_recorded: 0.0,
            identifier_present: 0.0,
        });
        let factors = MatchFactors {
            family_name: true,
            ..MatchFactors::default()
        };
        assert!(approx(scorer.score_factors(factors), 0.5));
    }

    #[test]
    fn rank_orders_by_score_then_id() {
        let q = query(Some("Maria"));
        let s = scorer();
        let mut results = vec![
            s.evaluate(&q, CandidateRecord { gender: None, ..candidate("pat-c") }),
            s.evaluate(&q, candidate("pat-b")),
            s.evaluate(&q, candidate("pat-a")),
        ];
        rank(&mut results);
        let ids: Vec<_> = results.iter().map(|r| r.candidate.id.as_str()).collect();
        assert_eq!(ids, ["pat-a", "pat-b", "pat-c"]);
    }
}
