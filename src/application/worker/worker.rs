use super::protocol::{
    UNKNOWN_REQUEST, WorkerRequest, WorkerResponse, decode_request, decode_response, encode,
};
use crate::application::backtest::{BacktestEngine, DEFAULT_INITIAL_BALANCE};
use crate::application::ml::DEFAULT_LEARNING_RATE;
use crate::application::pipeline::{DatasetBuilder, FactorEvaluator, GeneratedData};
use crate::application::training::TrainingDriver;
use crate::domain::dataset::ProgressEvent;
use crate::domain::errors::ProtocolError;
use crate::domain::ports::{HistoricalDataSource, ModelArtifactStore};
use crate::domain::repositories::{FactorRepository, TaskRepository};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Numeric settings shared by every job a worker runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobSettings {
    pub learning_rate: f64,
    pub seed: u64,
    pub include_validity_mask: bool,
    pub initial_balance: f64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            seed: 42,
            include_validity_mask: false,
            initial_balance: DEFAULT_INITIAL_BALANCE,
        }
    }
}

/// Ports a worker builds its pipeline from
#[derive(Clone)]
pub struct WorkerContext {
    pub source: Arc<dyn HistoricalDataSource>,
    pub factors: Arc<dyn FactorRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub artifacts: Arc<dyn ModelArtifactStore>,
    pub settings: JobSettings,
}

/// Pipeline components owned by a single worker
struct Pipeline {
    builder: Arc<DatasetBuilder>,
    driver: TrainingDriver,
    engine: BacktestEngine,
}

impl Pipeline {
    fn new(ctx: &WorkerContext) -> Self {
        let builder = Arc::new(
            DatasetBuilder::new(
                ctx.source.clone(),
                FactorEvaluator::new(ctx.factors.clone()),
            )
            .with_validity_mask(ctx.settings.include_validity_mask),
        );
        Self {
            driver: TrainingDriver::new(
                ctx.artifacts.clone(),
                ctx.tasks.clone(),
                ctx.settings.learning_rate,
                ctx.settings.seed,
            ),
            engine: BacktestEngine::new(
                builder.clone(),
                ctx.artifacts.clone(),
                ctx.settings.initial_balance,
            ),
            builder,
        }
    }
}

pub struct Worker;

impl Worker {
    /// Spawns a worker task with a fresh pipeline.
    pub fn spawn(ctx: WorkerContext) -> WorkerHandle {
        let (request_tx, request_rx) = mpsc::unbounded_channel::<String>();
        let (response_tx, response_rx) = mpsc::unbounded_channel::<String>();
        let cancel = CancellationToken::new();
        let pipeline = Pipeline::new(&ctx);
        let join = tokio::spawn(run(pipeline, request_rx, response_tx, cancel.clone()));

        WorkerHandle {
            request_tx,
            response_rx,
            cancel,
            join,
        }
    }
}

/// Invoker side of a worker
pub struct WorkerHandle {
    request_tx: UnboundedSender<String>,
    response_rx: UnboundedReceiver<String>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn post(&self, request: &WorkerRequest) -> Result<(), ProtocolError> {
        self.post_raw(encode(request)?)
    }

    /// Sends pre-encoded JSON text
    pub fn post_raw(&self, text: String) -> Result<(), ProtocolError> {
        self.request_tx
            .send(text)
            .map_err(|_| ProtocolError::ChannelClosed)
    }

    pub async fn next_response(&mut self) -> Result<WorkerResponse, ProtocolError> {
        let text = self
            .response_rx
            .recv()
            .await
            .ok_or(ProtocolError::ChannelClosed)?;
        decode_response(&text)
    }

    /// Asks the running job to stop at the next epoch boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Aborts the worker outright; no further responses are produced
    pub fn terminate(self) {
        self.cancel.cancel();
        self.join.abort();
    }
}

async fn run(
    pipeline: Pipeline,
    mut requests: UnboundedReceiver<String>,
    responses: UnboundedSender<String>,
    cancel: CancellationToken,
) {
    info!("Worker started");
    while let Some(text) = requests.recv().await {
        let request = match decode_request(&text) {
            Ok(r) => r,
            Err(e) => {
                warn!("Rejecting malformed request: {}", e);
                send(
                    &responses,
                    &WorkerResponse::Failed {
                        request: UNKNOWN_REQUEST.to_string(),
                        error: e.to_string(),
                    },
                );
                continue;
            }
        };

        let name = request.name();
        debug!("Worker handling {} for task {}", name, request.task().name);
        let terminal = match handle(&pipeline, request, &responses, &cancel).await {
            Ok(response) => response,
            Err(e) => {
                error!("{} failed: {:#}", name, e);
                WorkerResponse::Failed {
                    request: name.to_string(),
                    error: format!("{:#}", e),
                }
            }
        };
        if !send(&responses, &terminal) {
            break;
        }
    }
    info!("Worker stopped");
}

async fn handle(
    pipeline: &Pipeline,
    request: WorkerRequest,
    responses: &UnboundedSender<String>,
    cancel: &CancellationToken,
) -> Result<WorkerResponse> {
    match request {
        WorkerRequest::GenerateData { task } => {
            let data = pipeline.builder.generate(&task, task.date_range).await?;
            Ok(WorkerResponse::GenerateDataOk { data })
        }
        WorkerRequest::StartTrain { task, records } => {
            task.validate()?;
            let data = match records {
                Some(records) => GeneratedData {
                    records,
                    prices: Vec::new(),
                },
                None => pipeline.builder.generate(&task, task.date_range).await?,
            };
            let dataset = pipeline.builder.windows(&task, &data)?;

            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ProgressEvent>();
            let forward = {
                let responses = responses.clone();
                tokio::spawn(async move {
                    while let Some(event) = progress_rx.recv().await {
                        send(&responses, &WorkerResponse::UpdateProgress(event));
                    }
                })
            };
            let outcome = pipeline
                .driver
                .train(&task, dataset, progress_tx, cancel.clone())
                .await;
            // Drain progress before the terminal message goes out
            let _ = forward.await;
            Ok(WorkerResponse::TrainOk { data: outcome? })
        }
        WorkerRequest::BackTesting { task, range } => {
            let data = pipeline.engine.backtest(&task, range).await?;
            Ok(WorkerResponse::BackTestingOk { data })
        }
        WorkerRequest::PredictCurrent { task, range } => {
            let data = pipeline.engine.predict_current(&task, range).await?;
            Ok(WorkerResponse::PredictCurrentOk { data })
        }
    }
}

fn send(responses: &UnboundedSender<String>, message: &WorkerResponse) -> bool {
    match encode(message) {
        Ok(text) => responses.send(text).is_ok(),
        Err(e) => {
            error!("Failed to encode {}: {}", message.name(), e);
            let fallback = format!(
                "{{\"type\":\"failed\",\"request\":\"{}\",\"error\":\"encode failure\"}}",
                message.name()
            );
            responses.send(fallback).is_ok()
        }
    }
}
