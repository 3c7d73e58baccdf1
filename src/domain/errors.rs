use thiserror::Error;

/// Errors raised while parsing, validating or evaluating a factor program
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FactorError {
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Invalid assignment target '{0}': factor outputs must start with '$f_'")]
    InvalidTarget(String),

    #[error("Function {function} expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("Function {function} needs a positive integer window, got '{found}'")]
    InvalidWindow { function: String, found: String },

    #[error("Factor program is empty")]
    EmptyProgram,

    #[error("Factor output length {found} differs from input length {expected}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("Record {index} exposes a different key set than record 0")]
    InconsistentKeys { index: usize },

    #[error("Validation sample is empty")]
    EmptySample,
}

/// Errors raised by the alignment and windowing stages
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("Window length must be greater than zero")]
    WindowLengthZero,

    #[error("Input key '{0}' is not present in the aligned records")]
    MissingInputKey(String),

    #[error("Field '{0}' is not numeric")]
    NonNumericField(String),

    #[error("Output kind requires an output key")]
    MissingOutputKey,

    #[error("Invalid task configuration: {0}")]
    InvalidTask(String),
}

/// Errors that terminate a training job
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainingError {
    #[error("No training windows were produced")]
    EmptyDataset,

    #[error("Training windows carry no labels (output kind missing or range too short)")]
    UnlabeledDataset,

    #[error("Window shape {found:?} does not match model input {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Invalid training configuration: {0}")]
    InvalidConfig(String),

    #[error("Training diverged: epoch {epoch} produced a non-finite loss")]
    NonFiniteLoss { epoch: usize },

    #[error("Training cancelled after {completed_epochs} epoch(s)")]
    Cancelled { completed_epochs: usize },

    #[error("Model artifact is corrupt: {0}")]
    CorruptArtifact(String),
}

/// Errors that terminate a backtest or live prediction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BacktestError {
    #[error("Range shorter than window: {records} record(s) available, window length {window_length}")]
    RangeShorterThanWindow {
        records: usize,
        window_length: usize,
    },

    #[error("No model artifact stored for task '{0}'")]
    ModelNotFound(String),

    #[error("Model returned {predictions} prediction(s) for {steps} step(s)")]
    PredictionCountMismatch { predictions: usize, steps: usize },
}

/// Errors on the invoker/worker message boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Decode(String),

    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Worker channel closed")]
    ChannelClosed,

    #[error("Unexpected response '{received}' while waiting for '{expected}'")]
    UnexpectedResponse { expected: String, received: String },
}

/// Errors raised by the invoking side when scheduling jobs
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobError {
    #[error("Task '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Job for task '{task}' failed: {reason}")]
    Failed { task: String, reason: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
