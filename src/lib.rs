pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod scheduler;
pub mod state_machine;

pub use channel::ChannelType;
pub use config::Settings;
pub use context::AppContext;
pub use error::{PipelineError, YtAutoError};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorState, StatusSnapshot};
pub use pipeline::{Artifact, Pipeline, PipelineRegistry};
pub use scheduler::Schedule;
pub use state_machine::{JobId, JobRecord, JobStatus, RetryPolicy};
