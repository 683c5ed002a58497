//! perfbisect - bisect a revision range to the first performance regression
//!
//! Each probed revision is checked out, both projects are rebuilt, and a fixed
//! benchmark is run; the measured time is compared against a threshold to
//! mark the revision good or bad. Revisions that fail to build or measure are
//! skipped, with a bounded number of consecutive skips.

pub mod benchmark;
pub mod bisect;
pub mod build;
pub mod cli;
pub mod config;
pub mod evaluator;
pub mod executor;
pub mod report;
pub mod revision;
pub mod stage;

#[cfg(test)]
mod test_support;
