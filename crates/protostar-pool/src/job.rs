use protostar_core::AddressRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of asynchronous provider job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    Create,
    Delete,
    Resync,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Delete => write!(f, "delete"),
            Self::Resync => write!(f, "resync"),
        }
    }
}

/// Job emitted by a reconcile pass, to be executed by the asynchronous worker.
///
/// The pool constructs jobs under its lock and hands them to the caller; the
/// caller dispatches them after the lock is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolJob {
    /// Nothing to do this round
    None,
    /// Ask the provider for enough new prefixes to cover `count` addresses
    Create { node_id: String, count: usize },
    /// Release whole prefixes upstream. `records` are the warm addresses that
    /// were already pulled out of the pool when the job was built.
    Delete {
        node_id: String,
        prefixes: Vec<String>,
        records: Vec<AddressRecord>,
    },
    /// Fetch the authoritative upstream address list for this node
    Resync { node_id: String },
}

impl PoolJob {
    /// Whether this job carries actual work
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Outcome of an executed create/delete/resync job, fed back into the pool.
///
/// `count` is the address count the job was submitted with; it drives the
/// pending-counter decrement. Successful creates carry the prefixes the
/// provider allocated. Resync responses travel separately as a record list,
/// so a resync outcome here only reports failure.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub kind: JobKind,
    pub count: usize,
    pub prefixes: Vec<String>,
    pub succeeded: bool,
}

impl JobOutcome {
    /// Outcome of a create job that allocated `prefixes` upstream
    pub fn create_succeeded(count: usize, prefixes: Vec<String>) -> Self {
        Self {
            kind: JobKind::Create,
            count,
            prefixes,
            succeeded: true,
        }
    }

    /// Outcome of a create job the provider rejected or lost
    pub fn create_failed(count: usize) -> Self {
        Self {
            kind: JobKind::Create,
            count,
            prefixes: Vec::new(),
            succeeded: false,
        }
    }

    /// Outcome of a delete job that released its prefixes
    pub fn delete_succeeded(count: usize) -> Self {
        Self {
            kind: JobKind::Delete,
            count,
            prefixes: Vec::new(),
            succeeded: true,
        }
    }

    /// Outcome of a delete job the provider rejected or lost
    pub fn delete_failed(count: usize) -> Self {
        Self {
            kind: JobKind::Delete,
            count,
            prefixes: Vec::new(),
            succeeded: false,
        }
    }

    /// Outcome of a resync job whose upstream listing failed
    pub fn resync_failed() -> Self {
        Self {
            kind: JobKind::Resync,
            count: 0,
            prefixes: Vec::new(),
            succeeded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_is_none() {
        assert!(PoolJob::None.is_none());
        assert!(!PoolJob::Resync {
            node_id: "node-1".to_string()
        }
        .is_none());
    }

    #[test]
    fn test_outcome_constructors() {
        let outcome = JobOutcome::create_succeeded(16, vec!["10.0.1.0/28".to_string()]);
        assert_eq!(outcome.kind, JobKind::Create);
        assert!(outcome.succeeded);
        assert_eq!(outcome.count, 16);

        let outcome = JobOutcome::delete_failed(16);
        assert_eq!(outcome.kind, JobKind::Delete);
        assert!(!outcome.succeeded);
        assert!(outcome.prefixes.is_empty());
    }
}
