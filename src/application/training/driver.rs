use super::fit::{FitConfig, fit};
use crate::application::ml::{build_classifier, to_artifact};
use crate::domain::dataset::{ProgressEvent, WindowedDataset};
use crate::domain::errors::TrainingError;
use crate::domain::ports::ModelArtifactStore;
use crate::domain::repositories::TaskRepository;
use crate::domain::task::TrainingTask;
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingOutcome {
    pub task_name: String,
    pub artifact_ref: String,
    pub history: Vec<ProgressEvent>,
}

impl TrainingOutcome {
    pub fn final_metrics(&self) -> Option<&ProgressEvent> {
        self.history.last()
    }
}

/// Builds the task's topology, fits it off the async runtime and persists
/// the resulting artifact.
pub struct TrainingDriver {
    artifacts: Arc<dyn ModelArtifactStore>,
    tasks: Arc<dyn TaskRepository>,
    learning_rate: f64,
    seed: u64,
}

impl TrainingDriver {
    pub fn new(
        artifacts: Arc<dyn ModelArtifactStore>,
        tasks: Arc<dyn TaskRepository>,
        learning_rate: f64,
        seed: u64,
    ) -> Self {
        Self {
            artifacts,
            tasks,
            learning_rate,
            seed,
        }
    }

    pub async fn train(
        &self,
        task: &TrainingTask,
        dataset: WindowedDataset,
        progress: UnboundedSender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> Result<TrainingOutcome> {
        let shape = dataset.shape().ok_or(TrainingError::EmptyDataset)?;
        let kind = task.model_kind;
        let config = FitConfig {
            epochs: task.epochs,
            batch_size: task.batch_size,
            learning_rate: self.learning_rate,
            seed: self.seed,
        };
        info!(
            "Training task {} ({}, {} windows of {:?})",
            task.name,
            kind,
            dataset.len(),
            shape
        );

        let (history, artifact) = tokio::task::spawn_blocking(move || {
            let mut rng = StdRng::seed_from_u64(config.seed);
            let mut model = build_classifier(kind, shape, &mut rng);
            let history = fit(model.as_mut(), &dataset, config, &progress, &cancel)?;
            let artifact = to_artifact(model.as_ref())?;
            Ok::<_, TrainingError>((history, artifact))
        })
        .await
        .context("Training worker panicked")??;

        let artifact_ref = self
            .artifacts
            .save(&task.name, &artifact)
            .await
            .with_context(|| format!("Failed to save model for task {}", task.name))?;
        if let Err(e) = self.tasks.mark_finished(&task.name, &artifact_ref).await {
            warn!("Model saved but task {} not updated: {}", task.name, e);
            return Err(e.context(format!("Failed to mark task {} finished", task.name)));
        }

        info!("Task {} finished, artifact {}", task.name, artifact_ref);
        Ok(TrainingOutcome {
            task_name: task.name.clone(),
            artifact_ref,
            history,
        })
    }
}
