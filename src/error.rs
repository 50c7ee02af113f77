use std::time::Duration;

use thiserror::Error;

use crate::channel::ChannelType;

#[derive(Debug, Error)]
pub enum YtAutoError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Invalid schedule time {value:?} for channel {channel}")]
    InvalidSchedule { channel: String, value: String },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors raised by a [`Pipeline`](crate::pipeline::Pipeline) run.
///
/// The orchestrator treats every variant the same way: retry until the budget
/// is spent, then mark the job failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No pipeline for channel: {0}")]
    NotRegistered(ChannelType),

    #[error("Pipeline for channel {0} is not configured")]
    NotConfigured(ChannelType),

    #[error("{0}")]
    Failed(String),

    #[error("Pipeline command exited with {code:?}: {stderr}")]
    Command { code: Option<i32>, stderr: String },

    #[error("Pipeline timed out after {0:?}")]
    Timeout(Duration),

    #[error("Pipeline panicked: {0}")]
    Panicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_registered_display() {
        let err = PipelineError::NotRegistered(ChannelType::Horror);
        assert_eq!(err.to_string(), "No pipeline for channel: horror");
    }

    #[test]
    fn failed_display_is_bare_message() {
        assert_eq!(PipelineError::failed("Test error").to_string(), "Test error");
    }

    #[test]
    fn command_display_includes_code() {
        let err = PipelineError::Command {
            code: Some(2),
            stderr: "ffmpeg missing".into(),
        };
        assert_eq!(
            err.to_string(),
            "Pipeline command exited with Some(2): ffmpeg missing"
        );
    }

    #[test]
    fn invalid_schedule_display() {
        let err = YtAutoError::InvalidSchedule {
            channel: "facts".into(),
            value: "25:00".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid schedule time \"25:00\" for channel facts"
        );
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<YtAutoError>();
        assert_send_sync::<PipelineError>();
    }
}
