//! Core job types and the status state machine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobgate_core::{DomainError, JobId, UserId};

/// Submitted form payload: field name → value. Order is not significant.
pub type ValueMap = HashMap<String, String>;

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be picked up by a worker
    Queued,
    /// Claimed by exactly one worker
    Running,
    /// Action returned without error
    Succeeded,
    /// Action returned an error or panicked
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Succeeded,
        JobStatus::Failed,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Forward-only transitions: Queued → Running → {Succeeded, Failed}.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown job status: {s}")))
    }
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid job status transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// A submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Owner; the only user allowed to see the job
    pub user_id: UserId,
    pub value_map: ValueMap,
    pub status: JobStatus,
    /// Error reported by the last failed run
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a queued job.
    pub fn new(user_id: UserId, value_map: ValueMap) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            user_id,
            value_map,
            status: JobStatus::Queued,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Apply a status transition, rejecting anything that is not forward.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Result of one job execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Succeeded => JobStatus::Succeeded,
            JobOutcome::Failed(_) => JobStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(
            UserId::from_identity("fake token"),
            ValueMap::from([("key1".to_string(), "value1".to_string())]),
        )
    }

    #[test]
    fn job_lifecycle() {
        let mut job = job();
        assert_eq!(job.status, JobStatus::Queued);

        job.transition(JobStatus::Running).unwrap();
        job.transition(JobStatus::Succeeded).unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(job.status.is_terminal());
    }

    #[test]
    fn backward_and_skipping_transitions_are_rejected() {
        let mut job = job();

        assert_eq!(
            job.transition(JobStatus::Succeeded),
            Err(InvalidTransition {
                from: JobStatus::Queued,
                to: JobStatus::Succeeded,
            })
        );

        job.transition(JobStatus::Running).unwrap();
        job.transition(JobStatus::Failed).unwrap();

        for next in JobStatus::ALL {
            assert!(job.transition(next).is_err(), "failed -> {next} must be rejected");
        }
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn status_parses_its_own_rendering() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn ownership_is_by_user_id() {
        let job = job();
        assert!(job.is_owned_by(UserId::from_identity("fake token")));
        assert!(!job.is_owned_by(UserId::from_identity("someone else")));
    }
}
