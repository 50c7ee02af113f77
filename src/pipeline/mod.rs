//! The collaborator contract the orchestrator drives, and the registry that
//! resolves a channel to its pipeline.
//!
//! Pipelines own all real I/O (script generation, narration, rendering,
//! upload). The orchestrator only ever calls [`Pipeline::run`].

pub mod command;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{info, warn};

use crate::channel::ChannelType;
use crate::error::PipelineError;

pub use command::{CommandPipeline, CommandSpec};

/// Opaque success payload returned by a pipeline (artifact reference).
pub type Artifact = serde_json::Value;

/// Full content-generation sequence for a channel.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Produce one finished artifact, or fail.
    async fn run(&self, channel: ChannelType) -> Result<Artifact, PipelineError>;

    /// Produce `count` artifacts one after another.
    fn run_batch(
        &self,
        channel: ChannelType,
        count: usize,
    ) -> BoxStream<'_, Result<Artifact, PipelineError>> {
        stream::iter(0..count)
            .then(move |_| self.run(channel))
            .boxed()
    }
}

/// Builds a pipeline the first time a channel needs one.
pub type PipelineFactory =
    Arc<dyn Fn(ChannelType) -> Result<Arc<dyn Pipeline>, PipelineError> + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
    pipelines: HashMap<ChannelType, Arc<dyn Pipeline>>,
    factories: HashMap<ChannelType, PipelineFactory>,
}

/// Channel → pipeline bindings, with lazily invoked factories.
///
/// A factory failure is logged and leaves the channel without a pipeline;
/// the next resolve tries the factory again.
#[derive(Default)]
pub struct PipelineRegistry {
    inner: Mutex<RegistryInner>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `pipeline` to `channel`. Last write wins.
    pub fn register(&self, channel: ChannelType, pipeline: Arc<dyn Pipeline>) {
        self.lock().pipelines.insert(channel, pipeline);
        info!(channel = %channel, "Pipeline registered");
    }

    pub fn register_factory(&self, channel: ChannelType, factory: PipelineFactory) {
        self.lock().factories.insert(channel, factory);
    }

    /// Builder-style [`register_factory`](Self::register_factory).
    pub fn with_factory<F>(self, channel: ChannelType, factory: F) -> Self
    where
        F: Fn(ChannelType) -> Result<Arc<dyn Pipeline>, PipelineError> + Send + Sync + 'static,
    {
        self.register_factory(channel, Arc::new(factory));
        self
    }

    /// The pipeline for `channel`, constructing it on first use.
    pub fn resolve(&self, channel: ChannelType) -> Option<Arc<dyn Pipeline>> {
        let factory = {
            let inner = self.lock();
            if let Some(pipeline) = inner.pipelines.get(&channel) {
                return Some(Arc::clone(pipeline));
            }
            inner.factories.get(&channel).cloned()?
        };

        match factory(channel) {
            Ok(pipeline) => {
                let mut inner = self.lock();
                // A registration that raced the factory wins.
                let entry = inner
                    .pipelines
                    .entry(channel)
                    .or_insert_with(|| Arc::clone(&pipeline));
                info!(channel = %channel, "Pipeline loaded");
                Some(Arc::clone(entry))
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "Pipeline construction failed");
                None
            }
        }
    }

    /// Channels with either a bound pipeline or a factory.
    pub fn channels(&self) -> BTreeSet<ChannelType> {
        let inner = self.lock();
        inner
            .pipelines
            .keys()
            .chain(inner.factories.keys())
            .copied()
            .collect()
    }

    pub fn is_loaded(&self, channel: ChannelType) -> bool {
        self.lock().pipelines.contains_key(&channel)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticPipeline(&'static str);

    #[async_trait]
    impl Pipeline for StaticPipeline {
        async fn run(&self, channel: ChannelType) -> Result<Artifact, PipelineError> {
            Ok(serde_json::json!({"channel": channel, "tag": self.0}))
        }
    }

    #[tokio::test]
    async fn register_is_last_write_wins() {
        let registry = PipelineRegistry::new();
        registry.register(ChannelType::Horror, Arc::new(StaticPipeline("first")));
        registry.register(ChannelType::Horror, Arc::new(StaticPipeline("second")));

        let pipeline = registry.resolve(ChannelType::Horror).unwrap();
        let artifact = pipeline.run(ChannelType::Horror).await.unwrap();
        assert_eq!(artifact["tag"], "second");
    }

    #[test]
    fn unknown_channel_resolves_to_none() {
        let registry = PipelineRegistry::new();
        assert!(registry.resolve(ChannelType::Facts).is_none());
        assert!(registry.channels().is_empty());
    }

    #[test]
    fn factory_runs_once_on_first_use() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = PipelineRegistry::new().with_factory(ChannelType::Finance, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StaticPipeline("lazy")) as Arc<dyn Pipeline>)
        });

        assert!(!registry.is_loaded(ChannelType::Finance));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(registry.resolve(ChannelType::Finance).is_some());
        assert!(registry.resolve(ChannelType::Finance).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_loaded(ChannelType::Finance));
    }

    #[test]
    fn factory_failure_is_not_fatal_and_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = PipelineRegistry::new().with_factory(ChannelType::Horror, move |channel| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(PipelineError::NotConfigured(channel))
            } else {
                Ok(Arc::new(StaticPipeline("second try")) as Arc<dyn Pipeline>)
            }
        });

        assert!(registry.resolve(ChannelType::Horror).is_none());
        assert!(registry.resolve(ChannelType::Horror).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn channels_include_factories_and_registrations() {
        let registry = PipelineRegistry::new()
            .with_factory(ChannelType::Finance, |c| Err(PipelineError::NotConfigured(c)));
        registry.register(ChannelType::Horror, Arc::new(StaticPipeline("x")));

        let channels: Vec<_> = registry.channels().into_iter().collect();
        assert_eq!(channels, vec![ChannelType::Horror, ChannelType::Finance]);
    }

    #[tokio::test]
    async fn run_batch_yields_count_items() {
        let pipeline = StaticPipeline("batch");
        let items: Vec<_> = pipeline.run_batch(ChannelType::Facts, 3).collect().await;
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|r| r.is_ok()));
    }
}
