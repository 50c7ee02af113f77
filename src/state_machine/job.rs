use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::ChannelType;
use crate::pipeline::Artifact;

/// Unique job identifier, assigned at enqueue time and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight characters, for tables and log lines.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Tracks the lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Retrying,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
        };
        f.write_str(s)
    }
}

/// One request to run a channel's pipeline once.
///
/// Records are owned by the orchestrator; pipelines only ever see the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub channel: ChannelType,
    pub status: JobStatus,
    /// Enqueue order, breaks ties between equal `created_at` stamps.
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retries: u32,
    pub error: Option<String>,
    pub result: Option<Artifact>,
}

impl JobRecord {
    pub fn new(channel: ChannelType, seq: u64) -> Self {
        Self {
            id: JobId::new(),
            channel,
            status: JobStatus::Pending,
            seq,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retries: 0,
            error: None,
            result: None,
        }
    }

    /// Wall time of the last attempt, once the job has finished.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Aggregate counters for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub completed: u64,
    pub failed: u64,
    /// Jobs ever enqueued, independent of outcome.
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_creation_defaults() {
        let job = JobRecord::new(ChannelType::Horror, 0);
        assert_eq!(job.channel, ChannelType::Horror);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retries, 0);
        assert!(job.error.is_none());
        assert!(job.result.is_none());
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert!(job.duration().is_none());
    }

    #[test]
    fn ids_are_unique() {
        let a = JobRecord::new(ChannelType::Facts, 0);
        let b = JobRecord::new(ChannelType::Facts, 1);
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.short().len(), 8);
    }

    #[test]
    fn job_status_values() {
        assert_eq!(JobStatus::Pending.to_string(), "pending");
        assert_eq!(JobStatus::Running.to_string(), "running");
        assert_eq!(JobStatus::Completed.to_string(), "completed");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
        assert_eq!(JobStatus::Retrying.to_string(), "retrying");
        assert_eq!(
            serde_json::to_string(&JobStatus::Retrying).unwrap(),
            "\"retrying\""
        );
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Retrying.is_terminal());
    }

    #[test]
    fn duration_spans_last_attempt() {
        let mut job = JobRecord::new(ChannelType::Finance, 0);
        let start = Utc::now();
        job.started_at = Some(start);
        job.completed_at = Some(start + Duration::seconds(42));
        assert_eq!(job.duration(), Some(Duration::seconds(42)));
    }
}
