//! Process-level handle to the settings and the orchestrator built from them.
//!
//! The binary constructs one [`AppContext`] at startup and passes it down;
//! [`AppContext::reset`] exists for test harnesses.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::channel::ChannelType;
use crate::config::Settings;
use crate::error::{PipelineError, YtAutoError};
use crate::orchestrator::Orchestrator;
use crate::pipeline::{CommandPipeline, Pipeline, PipelineRegistry};

pub struct AppContext {
    settings: Mutex<Settings>,
    orchestrator: Mutex<Option<Orchestrator>>,
}

impl AppContext {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
            orchestrator: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> Settings {
        lock(&self.settings).clone()
    }

    /// The shared orchestrator, built from the current settings on first call.
    pub fn orchestrator(&self) -> Result<Orchestrator, YtAutoError> {
        let mut slot = lock(&self.orchestrator);
        if let Some(orchestrator) = slot.as_ref() {
            return Ok(orchestrator.clone());
        }
        let settings = self.settings();
        let orchestrator = Orchestrator::new(settings.orchestrator_config()?, build_registry(&settings))?;
        *slot = Some(orchestrator.clone());
        Ok(orchestrator)
    }

    /// Drop the current orchestrator; the next accessor call builds a new one.
    pub fn reset(&self) {
        lock(&self.orchestrator).take();
    }

    /// Swap in new settings and build a fresh orchestrator from them.
    pub fn rebuild(&self, settings: Settings) -> Result<Orchestrator, YtAutoError> {
        *lock(&self.settings) = settings;
        self.reset();
        self.orchestrator()
    }
}

/// One lazy factory per channel; channels without a `[pipelines.<channel>]`
/// entry fail construction with [`PipelineError::NotConfigured`].
fn build_registry(settings: &Settings) -> PipelineRegistry {
    ChannelType::ALL
        .into_iter()
        .fold(PipelineRegistry::new(), |registry, channel| {
            let spec = settings.pipeline_spec(channel).cloned();
            registry.with_factory(channel, move |channel| match &spec {
                Some(spec) => Ok(Arc::new(CommandPipeline::new(spec.clone())) as Arc<dyn Pipeline>),
                None => Err(PipelineError::NotConfigured(channel)),
            })
        })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
