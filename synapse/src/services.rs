//! Service wiring
//!
//! [`AgentServices`] is built once at start-up and shared by `Arc` with the
//! HTTP layer. Tests build their own instance with custom handlers or
//! pipelines.

use std::sync::Arc;
use tracing::info;

use crate::agents::AgentStore;
use crate::config::SynapseConfig;
use crate::dispatch::{DispatcherConfig, ExecutionDispatcher};
use crate::handlers::HandlerRegistry;
use crate::performance::PerformanceAggregator;
use crate::training::{SimulatedPipeline, TrainingJobManager, TrainingPipeline, TrainingSettings};

/// The four core services plus the handler registry they share
pub struct AgentServices {
    pub store: Arc<AgentStore>,
    pub registry: Arc<HandlerRegistry>,
    pub training: TrainingJobManager,
    pub dispatcher: ExecutionDispatcher,
    pub performance: Arc<PerformanceAggregator>,
}

impl AgentServices {
    /// Services with built-in handlers and the simulated pipeline.
    ///
    /// Spawns the training workers, so it must run inside a tokio runtime.
    pub fn from_config(config: &SynapseConfig) -> Self {
        let pipeline = SimulatedPipeline::with_delay(config.training.simulated_delay());
        Self::builder()
            .pipeline(Arc::new(pipeline))
            .training(config.training.settings())
            .dispatcher(config.execution.dispatcher_config())
            .build()
    }

    pub fn builder() -> AgentServicesBuilder {
        AgentServicesBuilder::default()
    }

    /// Drain the training queue and stop the workers
    pub async fn shutdown(&self) {
        self.training.shutdown().await;
    }
}

/// Builder for [`AgentServices`]
#[derive(Default)]
pub struct AgentServicesBuilder {
    registry: Option<HandlerRegistry>,
    pipeline: Option<Arc<dyn TrainingPipeline>>,
    training: TrainingSettings,
    dispatcher: DispatcherConfig,
}

impl AgentServicesBuilder {
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn pipeline(mut self, pipeline: Arc<dyn TrainingPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn training(mut self, settings: TrainingSettings) -> Self {
        self.training = settings;
        self
    }

    pub fn dispatcher(mut self, config: DispatcherConfig) -> Self {
        self.dispatcher = config;
        self
    }

    pub fn build(self) -> AgentServices {
        let store = Arc::new(AgentStore::new());
        let registry = Arc::new(self.registry.unwrap_or_else(HandlerRegistry::builtin));
        let performance = Arc::new(PerformanceAggregator::new());
        let pipeline: Arc<dyn TrainingPipeline> = match self.pipeline {
            Some(pipeline) => pipeline,
            None => Arc::new(SimulatedPipeline::new()),
        };

        let training = TrainingJobManager::start(Arc::clone(&store), pipeline, self.training);
        let dispatcher = ExecutionDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&performance),
            self.dispatcher,
        );

        info!(
            "Agent services ready ({} operations registered, readiness {})",
            registry.len(),
            dispatcher.config().readiness
        );

        AgentServices {
            store,
            registry,
            training,
            dispatcher,
            performance,
        }
    }
}
