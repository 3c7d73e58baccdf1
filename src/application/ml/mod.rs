pub mod adam;
pub mod artifact;
pub mod dense;
pub mod lstm;
pub mod params;
pub mod predictor;

pub use adam::Adam;
pub use artifact::{build_classifier, restore, to_artifact};
pub use predictor::SequenceClassifier;

pub const DROPOUT_RATE: f64 = 0.2;
pub const DEFAULT_LEARNING_RATE: f64 = 0.002;
