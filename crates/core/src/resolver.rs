//! Identity resolution: one registry search, every candidate scored and ranked.
//!
//! The resolver never decides acceptance; that belongs to the orchestrator.

use crate::demographics::Demographics;
use crate::error::RegistryResult;
use crate::matching::{rank, MatchResult, MatchScorer};
use crate::registry::{ops, within, RegistryClient};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub struct IdentityResolver<R: ?Sized> {
    registry: Arc<R>,
    scorer: MatchScorer,
    call_timeout: Duration,
}

impl<R> IdentityResolver<R>
where
    R: RegistryClient + ?Sized,
{
    pub fn new(registry: Arc<R>, scorer: MatchScorer, call_timeout: Duration) -> Self {
        Self {
            registry,
            scorer,
            call_timeout,
        }
    }

    /// Search the registry and return every candidate scored, best first.
    ///
    /// Candidates repeated by the registry (same identifier) are scored once.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RegistryError::Unavailable`] if the search fails or times out. A failed
    /// search is never reported as an empty result.
    pub async fn resolve(&self, query: &Demographics) -> RegistryResult<Vec<MatchResult>> {
        let candidates = within(
            ops::SEARCH_PATIENTS,
            self.call_timeout,
            self.registry.search_patients(
                query.family_name().display(),
                query.birth_date(),
                query.given_name().map(|g| g.display()),
            ),
        )
        .await?;

        let mut seen = HashSet::new();
        let mut results: Vec<MatchResult> = candidates
            .into_iter()
            .filter(|c| seen.insert(c.id.clone()))
            .map(|c| self.scorer.evaluate(query, c))
            .collect();
        rank(&mut results);

        tracing::debug!(
            candidates = results.len(),
            top_score = results.first().map(|r| r.score),
            "identity search scored"
        );
        Ok(results)
    }
}
