//! Registration orchestrator.
//!
//! Drives one registration through an explicit state machine:
//!
//! ```text
//! Start -> Searching -> Resolved | Creating
//!       -> CreatingCoverage? -> VerifyingEligibility? -> CreatingEncounter -> Done
//! ```
//!
//! The next state is always derived from the caller-owned [`WorkflowProgress`], which is
//! updated immediately after each external call succeeds. A resumed or cancelled run therefore
//! never repeats a completed step.

use crate::config::{EligibilityPolicy, IntakeConfig};
use crate::constants::SCORE_GAP_TOLERANCE;
use crate::demographics::{normalize, Demographics, RawDemographics};
use crate::error::RegistrationError;
use crate::matching::{MatchResult, MatchScorer};
use crate::registry::{ops, within, CoverageRecord, RegistryClient};
use crate::resolver::IdentityResolver;
use crate::workflow::{
    EligibilityCheck, RegistrationOutcome, RegistrationReport, RegistrationRequest,
    WorkflowFailure, WorkflowProgress, WorkflowStep,
};
use chrono::NaiveDate;
use intake_types::ResourceId;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
enum WorkflowState {
    Searching,
    Resolved(ResourceId),
    Creating,
    CreatingCoverage {
        patient: ResourceId,
        payer: String,
    },
    VerifyingEligibility {
        payer: String,
        service_date: NaiveDate,
    },
    CreatingEncounter {
        patient: ResourceId,
    },
    Done(Box<RegistrationReport>),
}

/// Decides whether the best search result identifies the patient.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AcceptancePolicy {
    /// The top score must be strictly greater than this.
    pub threshold: f64,
    /// When set, an accepted top result with a runner-up this close is ambiguous.
    pub ambiguity_margin: Option<f64>,
}

impl AcceptancePolicy {
    pub fn from_config(config: &IntakeConfig) -> Self {
        Self {
            threshold: config.match_threshold(),
            ambiguity_margin: config.ambiguity_margin(),
        }
    }

    /// Pick the accepted match from ranked results, or `None` if no result clears the threshold.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::AmbiguousMatch`] when a margin is configured, the top result
    /// clears the threshold and the runner-up scores within that margin of it.
    pub fn decide<'a>(
        &self,
        ranked: &'a [MatchResult],
    ) -> Result<Option<&'a MatchResult>, RegistrationError> {
        let Some(top) = ranked.first().filter(|r| r.score > self.threshold) else {
            return Ok(None);
        };

        if let (Some(margin), Some(runner_up)) = (self.ambiguity_margin, ranked.get(1)) {
            if top.score - runner_up.score <= margin + SCORE_GAP_TOLERANCE {
                return Err(RegistrationError::AmbiguousMatch {
                    top: top.candidate.id.clone(),
                    top_score: top.score,
                    runner_up: runner_up.candidate.id.clone(),
                    runner_up_score: runner_up.score,
                    margin,
                });
            }
        }
        Ok(Some(top))
    }
}

/// Runs registrations against a shared registry client.
///
/// Invocations share no mutable state; any number may run concurrently.
pub struct Orchestrator<R: ?Sized> {
    registry: Arc<R>,
    resolver: IdentityResolver<R>,
    acceptance: AcceptancePolicy,
    config: Arc<IntakeConfig>,
}

impl<R> Orchestrator<R>
where
    R: RegistryClient + ?Sized,
{
    pub fn new(registry: Arc<R>, config: Arc<IntakeConfig>) -> Self {
        let resolver = IdentityResolver::new(
            Arc::clone(&registry),
            MatchScorer::new(*config.weights()),
            config.call_timeout(),
        );
        Self {
            registry,
            resolver,
            acceptance: AcceptancePolicy::from_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    /// Normalise `raw` and return every registry candidate, scored and ranked.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Validation`] or [`RegistrationError::Registry`].
    pub async fn search(
        &self,
        raw: &RawDemographics,
    ) -> Result<Vec<MatchResult>, RegistrationError> {
        let demographics = normalize(raw)?;
        Ok(self.resolver.resolve(&demographics).await?)
    }

    /// Run a registration from the beginning.
    pub async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationReport, WorkflowFailure> {
        let mut progress = WorkflowProgress::default();
        self.drive(request, &mut progress).await
    }

    /// Continue a registration from the progress returned in a [`WorkflowFailure`].
    pub async fn resume(
        &self,
        request: &RegistrationRequest,
        progress: WorkflowProgress,
    ) -> Result<RegistrationReport, WorkflowFailure> {
        let mut progress = progress;
        self.drive(request, &mut progress).await
    }

    /// Run the workflow, recording each completed step in `progress` as soon as it completes.
    ///
    /// If this future is dropped, `progress` holds every fact established up to that point and
    /// can be passed to [`Orchestrator::resume`].
    pub async fn drive(
        &self,
        request: &RegistrationRequest,
        progress: &mut WorkflowProgress,
    ) -> Result<RegistrationReport, WorkflowFailure> {
        let workflow_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "registration",
            %workflow_id,
            provider = %request.provider_id,
        );
        self.run(workflow_id, request, progress)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        workflow_id: Uuid,
        request: &RegistrationRequest,
        progress: &mut WorkflowProgress,
    ) -> Result<RegistrationReport, WorkflowFailure> {
        let fail = |step: WorkflowStep, progress: &WorkflowProgress, cause: RegistrationError| {
            tracing::error!(%step, patient = ?progress.established_patient(), "registration failed: {cause}");
            WorkflowFailure {
                workflow_id,
                step,
                progress: progress.clone(),
                cause,
            }
        };

        let demographics = normalize(&request.demographics)
            .map_err(|e| fail(WorkflowStep::NormalizeDemographics, progress, e.into()))?;

        let timeout = self.config.call_timeout();
        let mut state = self.next_pending(workflow_id, &demographics, request, progress);

        loop {
            state = match state {
                WorkflowState::Searching => {
                    let ranked = self
                        .resolver
                        .resolve(&demographics)
                        .await
                        .map_err(|e| fail(WorkflowStep::SearchPatients, progress, e.into()))?;
                    match self.acceptance.decide(&ranked) {
                        Ok(Some(accepted)) => {
                            tracing::info!(
                                patient = %accepted.candidate.id,
                                score = accepted.score,
                                "matched existing patient"
                            );
                            WorkflowState::Resolved(accepted.candidate.id.clone())
                        }
                        Ok(None) => {
                            tracing::info!(
                                candidates = ranked.len(),
                                top_score = ranked.first().map(|r| r.score),
                                "no acceptable match"
                            );
                            WorkflowState::Creating
                        }
                        Err(ambiguous) => {
                            return Err(fail(WorkflowStep::SearchPatients, progress, ambiguous))
                        }
                    }
                }

                WorkflowState::Resolved(patient) => {
                    progress.outcome = Some(RegistrationOutcome::Resolved(patient));
                    self.next_pending(workflow_id, &demographics, request, progress)
                }

                WorkflowState::Creating => {
                    let patient = within(
                        ops::CREATE_PATIENT,
                        timeout,
                        self.registry.create_patient(&demographics),
                    )
                    .await
                    .map_err(|e| fail(WorkflowStep::CreatePatient, progress, e.into()))?;
                    tracing::info!(%patient, "created patient");
                    progress.outcome = Some(RegistrationOutcome::Created(patient));
                    self.next_pending(workflow_id, &demographics, request, progress)
                }

                WorkflowState::CreatingCoverage { patient, payer } => {
                    let coverage_id = within(
                        ops::CREATE_COVERAGE,
                        timeout,
                        self.registry.create_coverage(&patient, &payer),
                    )
                    .await
                    .map_err(|e| fail(WorkflowStep::CreateCoverage, progress, e.into()))?;
                    tracing::info!(%patient, coverage = %coverage_id, "created coverage");
                    progress.coverage = Some(CoverageRecord {
                        id: coverage_id,
                        patient_id: patient,
                        payer_id: payer,
                    });
                    self.next_pending(workflow_id, &demographics, request, progress)
                }

                WorkflowState::VerifyingEligibility {
                    payer,
                    service_date,
                } => {
                    let checked = within(
                        ops::VERIFY_ELIGIBILITY,
                        timeout,
                        self.registry.check_eligibility(&payer, service_date),
                    )
                    .await;
                    let check = match checked {
                        Ok(status) => {
                            tracing::info!(state = ?status.state, %service_date, "eligibility verified");
                            EligibilityCheck::Verified(status)
                        }
                        Err(e) if self.config.eligibility() == EligibilityPolicy::BestEffort => {
                            tracing::warn!("eligibility not verified, continuing: {e}");
                            EligibilityCheck::Unverified {
                                reason: e.to_string(),
                            }
                        }
                        Err(e) => {
                            return Err(fail(WorkflowStep::VerifyEligibility, progress, e.into()))
                        }
                    };
                    progress.eligibility = Some(check);
                    self.next_pending(workflow_id, &demographics, request, progress)
                }

                WorkflowState::CreatingEncounter { patient } => {
                    let encounter = within(
                        ops::CREATE_ENCOUNTER,
                        timeout,
                        self.registry.create_encounter(
                            &patient,
                            &request.provider_id,
                            request.reason.as_str(),
                        ),
                    )
                    .await
                    .map_err(|e| fail(WorkflowStep::CreateEncounter, progress, e.into()))?;
                    tracing::info!(%patient, encounter = %encounter.id, "created encounter");
                    progress.encounter = Some(encounter);
                    self.next_pending(workflow_id, &demographics, request, progress)
                }

                WorkflowState::Done(report) => {
                    tracing::info!(patient = %report.outcome.patient_id(), "registration complete");
                    return Ok(*report);
                }
            };
        }
    }

    /// The first step `progress` has not yet completed.
    fn next_pending(
        &self,
        workflow_id: Uuid,
        demographics: &Demographics,
        request: &RegistrationRequest,
        progress: &WorkflowProgress,
    ) -> WorkflowState {
        let Some(outcome) = &progress.outcome else {
            return WorkflowState::Searching;
        };
        let patient = outcome.patient_id();

        if let (Some(payer), None) = (demographics.payer_id(), &progress.coverage) {
            return WorkflowState::CreatingCoverage {
                patient: patient.clone(),
                payer: payer.to_string(),
            };
        }

        if let (Some(coverage), None, Some(service_date)) = (
            &progress.coverage,
            &progress.eligibility,
            request.service_date,
        ) {
            if self.config.eligibility() != EligibilityPolicy::Skip {
                return WorkflowState::VerifyingEligibility {
                    payer: coverage.payer_id.clone(),
                    service_date,
                };
            }
        }

        match &progress.encounter {
            None => WorkflowState::CreatingEncounter {
                patient: patient.clone(),
            },
            Some(encounter) => WorkflowState::Done(Box::new(RegistrationReport {
                workflow_id,
                outcome: outcome.clone(),
                coverage: progress.coverage.clone(),
                eligibility: progress.eligibility.clone(),
                encounter: encounter.clone(),
            })),
        }
    }
}
