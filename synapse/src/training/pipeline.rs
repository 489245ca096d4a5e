//! Built-in simulated training pipeline

use std::time::Duration;
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{PipelineError, TrainingConfig, TrainingMetrics, TrainingPipeline};
use crate::agents::Agent;

const DEFAULT_EPOCHS: u32 = 10;
const DEFAULT_LEARNING_RATE: f64 = 0.001;
const DEFAULT_BATCH_SIZE: u32 = 32;
const SAMPLES_PER_SOURCE: u64 = 1000;

/// Deterministic pipeline that validates the configuration and derives
/// metrics from it, optionally sleeping to mimic real work.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPipeline {
    delay: Duration,
}

impl SimulatedPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn validate(config: &TrainingConfig) -> Result<(u32, f64, u32), PipelineError> {
    let epochs = config.epochs.unwrap_or(DEFAULT_EPOCHS);
    if epochs == 0 {
        return Err(PipelineError::Permanent("epochs must be at least 1".to_string()));
    }

    let learning_rate = config.learning_rate.unwrap_or(DEFAULT_LEARNING_RATE);
    if !(learning_rate > 0.0 && learning_rate <= 1.0) {
        return Err(PipelineError::Permanent(format!(
            "learning rate {} is outside (0, 1]",
            learning_rate
        )));
    }

    let batch_size = config.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
    if batch_size == 0 {
        return Err(PipelineError::Permanent("batch size must be at least 1".to_string()));
    }

    Ok((epochs, learning_rate, batch_size))
}

#[async_trait]
impl TrainingPipeline for SimulatedPipeline {
    async fn train(
        &self,
        agent: &Agent,
        config: &TrainingConfig,
    ) -> Result<TrainingMetrics, PipelineError> {
        let (epochs, learning_rate, batch_size) = validate(config)?;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let sources = agent.configuration.training_data.len() + usize::from(config.dataset.is_some());
        let samples = sources.max(1) as u64 * SAMPLES_PER_SOURCE;

        // Accuracy saturates with epochs and is penalized for aggressive rates
        let progress = 1.0 - (-(epochs as f64) / 10.0).exp();
        let rate_penalty = (learning_rate - 0.01).max(0.0) * 0.1;
        let accuracy = (0.70 + 0.25 * progress - rate_penalty).clamp(0.5, 0.99);
        let precision = (accuracy - 0.02).max(0.0);
        let recall = (accuracy - 0.03).max(0.0);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        let base = if agent.configuration.model.is_empty() {
            agent.agent_type.as_str()
        } else {
            agent.configuration.model.as_str()
        };
        let model_version = format!("{}-e{}-b{}", base, epochs, batch_size);

        debug!(agent_id = %agent.id, "Simulated training produced {}", model_version);

        let mut metrics = TrainingMetrics::new();
        metrics.insert("accuracy".into(), json!(round4(accuracy)));
        metrics.insert("precision".into(), json!(round4(precision)));
        metrics.insert("recall".into(), json!(round4(recall)));
        metrics.insert("f1_score".into(), json!(round4(f1)));
        metrics.insert("epochs".into(), json!(epochs));
        metrics.insert("samples".into(), json!(samples));
        metrics.insert("model_version".into(), json!(model_version));
        Ok(metrics)
    }
}
