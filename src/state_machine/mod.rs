mod job;
mod retry;
mod state;

pub use job::{ChannelStats, JobId, JobRecord, JobStatus};
pub use retry::RetryPolicy;
pub use state::{Event, InvalidTransition, StateMachine, Transition};
