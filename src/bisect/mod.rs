// Bisection search over a revision range
//
// The driver owns the search: it asks the bisect primitive for a candidate,
// evaluates it, and feeds the verdict back until the primitive names the
// first bad revision. Only revision-ordering problems, unresolvable inputs,
// primitive failures and the retry bounds abort a run; per-revision build or
// benchmark failures are skipped.
//
// Inconclusive policy: an inconclusive revision is marked `skip` and never
// re-evaluated. `max_consecutive_inconclusive` skips in a row abort the run,
// and `max_probes` bounds the total number of candidates.

mod driver;
mod primitive;

pub use driver::{BisectReport, Driver, SearchOutcome, SearchState};
pub use primitive::{BisectPrimitive, BisectStep, GitBisect, Mark, PrimitiveError};

use crate::revision::Revision;
use thiserror::Error;

/// Conditions that end a bisection run without a result
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("cannot resolve revision `{revision}`: {reason}")]
    InvalidRevision { revision: String, reason: String },

    #[error("good revision {good} is not an ancestor of bad revision {bad}")]
    RevisionOrdering { good: Revision, bad: Revision },

    #[error("{count} consecutive revisions were inconclusive (last: {last})")]
    TooManyInconclusive { count: usize, last: Revision },

    #[error("no convergence after {limit} probes")]
    ProbeLimit { limit: usize },

    #[error("only skipped revisions remain; the first bad revision is one of: {}", join(.remaining))]
    Exhausted { remaining: Vec<Revision> },

    #[error("bisect failed: {0}")]
    Primitive(#[from] PrimitiveError),
}

fn join(revisions: &[Revision]) -> String {
    revisions
        .iter()
        .map(Revision::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
