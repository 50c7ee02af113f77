use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use super::job::{JobRecord, JobStatus};
use super::retry::RetryPolicy;
use crate::pipeline::Artifact;

/// Something that happened to a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A worker took the job and holds a concurrency slot.
    Started,
    /// The pipeline returned normally.
    Succeeded(Artifact),
    /// The pipeline raised.
    Failed(String),
    /// The job is back in the queue after its backoff.
    Requeued,
}

/// The result of applying an [`Event`] to a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Started,
    Completed,
    /// Redeliver after `delay`; `attempt` is the new retry count.
    Retry { attempt: u32, delay: Duration },
    /// Retry budget exhausted, terminal.
    Failed,
    Requeued,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply {event} to a job in state {from}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub event: &'static str,
}

/// Drives a [`JobRecord`] through its lifecycle.
///
/// `Pending → Running → {Completed | Retrying | Failed}`, `Retrying → Pending`.
/// Nothing leaves `Completed` or `Failed`.
pub struct StateMachine;

impl StateMachine {
    pub fn next(
        job: &mut JobRecord,
        event: Event,
        policy: &RetryPolicy,
    ) -> Result<Transition, InvalidTransition> {
        let now = Utc::now();
        match (job.status, event) {
            (JobStatus::Pending, Event::Started) => {
                job.status = JobStatus::Running;
                job.started_at = Some(now);
                Ok(Transition::Started)
            }
            (JobStatus::Running, Event::Succeeded(artifact)) => {
                job.status = JobStatus::Completed;
                job.completed_at = Some(now);
                job.result = Some(artifact);
                Ok(Transition::Completed)
            }
            (JobStatus::Running, Event::Failed(message)) => {
                job.error = Some(message);
                if policy.allows_retry(job.retries) {
                    job.retries += 1;
                    job.status = JobStatus::Retrying;
                    Ok(Transition::Retry {
                        attempt: job.retries,
                        delay: policy.delay_for_attempt(job.retries),
                    })
                } else {
                    job.status = JobStatus::Failed;
                    job.completed_at = Some(now);
                    Ok(Transition::Failed)
                }
            }
            (JobStatus::Retrying, Event::Requeued) => {
                job.status = JobStatus::Pending;
                Ok(Transition::Requeued)
            }
            (from, event) => Err(InvalidTransition {
                from,
                event: event.name(),
            }),
        }
    }
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Started => "start",
            Event::Succeeded(_) => "success",
            Event::Failed(_) => "failure",
            Event::Requeued => "requeue",
        }
    }
}
