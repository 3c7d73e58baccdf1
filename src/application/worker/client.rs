use super::protocol::{WorkerRequest, WorkerResponse};
use super::worker::{Worker, WorkerContext, WorkerHandle};
use crate::application::backtest::{BacktestReport, CurrentPrediction};
use crate::application::pipeline::GeneratedData;
use crate::application::training::TrainingOutcome;
use crate::domain::dataset::{AlignedRecord, ProgressEvent};
use crate::domain::errors::{JobError, ProtocolError};
use crate::domain::market::DateRange;
use crate::domain::task::TrainingTask;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Default)]
struct JobBook {
    running: HashSet<String>,
    progress: HashMap<String, ProgressEvent>,
}

/// Invoking side: one worker per job, with an advisory set of running task
/// names that rejects a second start for the same name.
#[derive(Clone)]
pub struct JobClient {
    ctx: WorkerContext,
    book: Arc<Mutex<JobBook>>,
}

fn lock(book: &Mutex<JobBook>) -> MutexGuard<'_, JobBook> {
    book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl JobClient {
    pub fn new(ctx: WorkerContext) -> Self {
        Self {
            ctx,
            book: Arc::new(Mutex::new(JobBook::default())),
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        lock(&self.book).running.contains(name)
    }

    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.book).running.iter().cloned().collect();
        names.sort();
        names
    }

    /// Latest progress reported by a training job for `name`
    pub fn progress(&self, name: &str) -> Option<ProgressEvent> {
        lock(&self.book).progress.get(name).copied()
    }

    /// Spawns a worker for `request` after claiming the task name.
    pub fn start(&self, request: WorkerRequest) -> Result<Job, JobError> {
        let name = request.task().name.clone();
        {
            let mut book = lock(&self.book);
            if !book.running.insert(name.clone()) {
                return Err(JobError::AlreadyRunning(name));
            }
            book.progress.remove(&name);
        }
        let job = Job {
            name,
            expected: request.expected_response(),
            handle: Some(Worker::spawn(self.ctx.clone())),
            book: self.book.clone(),
        };
        job.handle()?.post(&request)?;
        info!("Started {} for task {}", request.name(), job.name);
        Ok(job)
    }

    pub fn start_training(
        &self,
        task: &TrainingTask,
        records: Option<Vec<AlignedRecord>>,
    ) -> Result<Job, JobError> {
        self.start(WorkerRequest::StartTrain {
            task: task.clone(),
            records,
        })
    }

    pub async fn generate_data(&self, task: &TrainingTask) -> Result<GeneratedData, JobError> {
        let job = self.start(WorkerRequest::GenerateData { task: task.clone() })?;
        match job.wait(|_| {}).await? {
            WorkerResponse::GenerateDataOk { data } => Ok(data),
            other => Err(unexpected("generateDataOk", &other)),
        }
    }

    /// Trains to completion, calling `on_progress` for each epoch.
    pub async fn train(
        &self,
        task: &TrainingTask,
        records: Option<Vec<AlignedRecord>>,
        on_progress: impl FnMut(&ProgressEvent),
    ) -> Result<TrainingOutcome, JobError> {
        let job = self.start_training(task, records)?;
        match job.wait(on_progress).await? {
            WorkerResponse::TrainOk { data } => Ok(data),
            other => Err(unexpected("trainOk", &other)),
        }
    }

    pub async fn backtest(
        &self,
        task: &TrainingTask,
        range: DateRange,
    ) -> Result<BacktestReport, JobError> {
        let job = self.start(WorkerRequest::BackTesting {
            task: task.clone(),
            range,
        })?;
        match job.wait(|_| {}).await? {
            WorkerResponse::BackTestingOk { data } => Ok(data),
            other => Err(unexpected("backTestingOk", &other)),
        }
    }

    pub async fn predict_current(
        &self,
        task: &TrainingTask,
        range: DateRange,
    ) -> Result<CurrentPrediction, JobError> {
        let job = self.start(WorkerRequest::PredictCurrent {
            task: task.clone(),
            range,
        })?;
        match job.wait(|_| {}).await? {
            WorkerResponse::PredictCurrentOk { data } => Ok(data),
            other => Err(unexpected("predictCurrentOk", &other)),
        }
    }
}

fn unexpected(expected: &str, received: &WorkerResponse) -> JobError {
    ProtocolError::UnexpectedResponse {
        expected: expected.to_string(),
        received: received.name().to_string(),
    }
    .into()
}

/// A running job. The task name is released when the job is dropped.
pub struct Job {
    name: String,
    expected: &'static str,
    handle: Option<WorkerHandle>,
    book: Arc<Mutex<JobBook>>,
}

impl Job {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self) -> Result<&WorkerHandle, ProtocolError> {
        self.handle.as_ref().ok_or(ProtocolError::ChannelClosed)
    }

    pub fn cancel(&self) {
        if let Some(handle) = &self.handle {
            handle.cancel();
        }
    }

    /// Aborts the worker; the job produces no result
    pub fn terminate(mut self) {
        if let Some(handle) = self.handle.take() {
            warn!("Terminating job for task {}", self.name);
            handle.terminate();
        }
    }

    /// Next message from the worker, recording progress as it passes
    pub async fn next(&mut self) -> Result<WorkerResponse, JobError> {
        let handle = self.handle.as_mut().ok_or(ProtocolError::ChannelClosed)?;
        let response = handle.next_response().await?;
        if let WorkerResponse::UpdateProgress(event) = &response {
            lock(&self.book).progress.insert(self.name.clone(), *event);
        }
        Ok(response)
    }

    /// Waits for the terminal message. `failed` becomes `JobError::Failed`.
    pub async fn wait(
        mut self,
        mut on_progress: impl FnMut(&ProgressEvent),
    ) -> Result<WorkerResponse, JobError> {
        loop {
            let response = self.next().await?;
            match response {
                WorkerResponse::UpdateProgress(event) => on_progress(&event),
                WorkerResponse::Failed { error, .. } => {
                    return Err(JobError::Failed {
                        task: self.name.clone(),
                        reason: error,
                    });
                }
                terminal => {
                    if terminal.name() != self.expected {
                        warn!(
                            "Job {} expected {}, got {}",
                            self.name,
                            self.expected,
                            terminal.name()
                        );
                    }
                    return Ok(terminal);
                }
            }
        }
    }
}

/// Dropping a job stops its worker before the task name is released, so a
/// later start for the same name never races an orphaned worker.
impl Drop for Job {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Stopping worker of dropped job {}", self.name);
            handle.terminate();
        }
        lock(&self.book).running.remove(&self.name);
    }
}
