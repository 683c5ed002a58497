// Search control: Initializing -> Probing -> Converged | Aborted

use super::primitive::{BisectPrimitive, BisectStep, Mark};
use super::SearchError;
use crate::config::SearchConfig;
use crate::evaluator::{Evaluate, EvaluationResult, Verdict};
use crate::revision::Revision;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Lifecycle of a bisection run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchState {
    Initializing,
    Probing,
    Converged(Revision),
    Aborted,
}

/// How the run ended
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Converged { first_bad: Revision },
    Aborted { error: SearchError },
}

/// Everything a run produced, for the reporter
#[derive(Debug, Clone, PartialEq)]
pub struct BisectReport {
    /// Resolved good revision (the raw input if resolution failed)
    pub good: Revision,
    /// Resolved bad revision (the raw input if resolution failed)
    pub bad: Revision,
    /// One entry per evaluated revision, in probe order
    pub evaluations: Vec<EvaluationResult>,
    pub outcome: SearchOutcome,
}

impl BisectReport {
    pub fn first_bad(&self) -> Option<&Revision> {
        match &self.outcome {
            SearchOutcome::Converged { first_bad } => Some(first_bad),
            SearchOutcome::Aborted { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&SearchError> {
        match &self.outcome {
            SearchOutcome::Converged { .. } => None,
            SearchOutcome::Aborted { error } => Some(error),
        }
    }
}

/// Drives the bisect primitive with verdicts from the evaluator
pub struct Driver<P, E> {
    primitive: P,
    evaluator: E,
    limits: SearchConfig,
    state: SearchState,
    bisecting: bool,
}

impl<P: BisectPrimitive, E: Evaluate> Driver<P, E> {
    pub fn new(primitive: P, evaluator: E, limits: SearchConfig) -> Self {
        Self {
            primitive,
            evaluator,
            limits,
            state: SearchState::Initializing,
            bisecting: false,
        }
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn into_parts(self) -> (P, E) {
        (self.primitive, self.evaluator)
    }

    /// Bisect from `good` to `bad`
    ///
    /// Never fails: aborts are reported on the returned report. The
    /// primitive is reset before returning whenever a bisect was started.
    pub fn run(&mut self, good: &str, bad: &str) -> BisectReport {
        info!(
            "Starting bisect between good commit {} and bad commit {}",
            good, bad
        );
        self.state = SearchState::Initializing;
        let mut good = Revision::new(good);
        let mut bad = Revision::new(bad);
        let mut evaluations = Vec::new();

        let result = self
            .initialize(&mut good, &mut bad)
            .and_then(|()| self.probe(&good, &bad, &mut evaluations));

        let outcome = match result {
            Ok(first_bad) => {
                info!("Bisect complete! First bad commit: {}", first_bad);
                self.transition(SearchState::Converged(first_bad.clone()));
                SearchOutcome::Converged { first_bad }
            }
            Err(error) => {
                error!("Bisect aborted: {}", error);
                self.transition(SearchState::Aborted);
                SearchOutcome::Aborted { error }
            }
        };

        if self.bisecting {
            if let Err(e) = self.primitive.reset() {
                warn!("Failed to reset bisect state: {}", e);
            }
            self.bisecting = false;
        }

        BisectReport {
            good,
            bad,
            evaluations,
            outcome,
        }
    }

    fn transition(&mut self, next: SearchState) {
        debug!("Search state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Resolve both ends and check that good precedes bad
    fn initialize(&mut self, good: &mut Revision, bad: &mut Revision) -> Result<(), SearchError> {
        *good = self.resolve(good.as_str())?;
        *bad = self.resolve(bad.as_str())?;

        if good == bad || !self.primitive.is_ancestor(good, bad)? {
            return Err(SearchError::RevisionOrdering {
                good: good.clone(),
                bad: bad.clone(),
            });
        }
        Ok(())
    }

    fn resolve(&mut self, name: &str) -> Result<Revision, SearchError> {
        self.primitive
            .resolve(name)
            .map_err(|e| SearchError::InvalidRevision {
                revision: name.to_string(),
                reason: e.to_string(),
            })
    }

    fn probe(
        &mut self,
        good: &Revision,
        bad: &Revision,
        evaluations: &mut Vec<EvaluationResult>,
    ) -> Result<Revision, SearchError> {
        self.transition(SearchState::Probing);
        self.bisecting = true;
        let mut step = self.primitive.start(good, bad)?;

        // every revision evaluated so far, including inconclusive ones
        let mut verdicts: HashMap<Revision, Verdict> = HashMap::new();
        let mut consecutive_inconclusive = 0;
        let mut probes = 0;

        loop {
            let candidate = match step {
                BisectStep::Converged(first_bad) => return Ok(first_bad),
                BisectStep::Exhausted(remaining) => {
                    return Err(SearchError::Exhausted { remaining })
                }
                BisectStep::Candidate(candidate) => candidate,
            };

            if probes >= self.limits.max_probes {
                return Err(SearchError::ProbeLimit {
                    limit: self.limits.max_probes,
                });
            }
            probes += 1;

            let verdict = match verdicts.get(&candidate) {
                Some(&verdict) => {
                    warn!(
                        "Commit {} was already evaluated ({}); not re-running it",
                        candidate, verdict
                    );
                    verdict
                }
                None => {
                    let result = self.evaluator.evaluate(&candidate);
                    let verdict = result.verdict();
                    verdicts.insert(candidate.clone(), verdict);
                    evaluations.push(result);
                    verdict
                }
            };

            let mark = match verdict {
                Verdict::Good => Mark::Good,
                Verdict::Bad => Mark::Bad,
                Verdict::Inconclusive => {
                    consecutive_inconclusive += 1;
                    if consecutive_inconclusive >= self.limits.max_consecutive_inconclusive {
                        return Err(SearchError::TooManyInconclusive {
                            count: consecutive_inconclusive,
                            last: candidate,
                        });
                    }
                    warn!("Skipping commit {} due to evaluation failure", candidate);
                    Mark::Skip
                }
            };
            if verdict.is_definitive() {
                consecutive_inconclusive = 0;
            }

            info!("Marking {} as {}", candidate.short(), mark.as_str());
            step = self.primitive.mark(&candidate, mark)?;
        }
    }
}
