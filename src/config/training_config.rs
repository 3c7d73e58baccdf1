//! Training configuration parsing from environment variables.

use crate::application::ml::DEFAULT_LEARNING_RATE;
use std::env;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingEnvConfig {
    pub learning_rate: f64,
    pub seed: u64,
    /// Append one `__valid` column per input key to every window
    pub include_validity_mask: bool,
}

impl Default for TrainingEnvConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            seed: 42,
            include_validity_mask: false,
        }
    }
}

impl TrainingEnvConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            learning_rate: env::var("TRAINING_LEARNING_RATE")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|lr| *lr > 0.0)
                .unwrap_or(defaults.learning_rate),
            seed: env::var("TRAINING_SEED")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.seed),
            include_validity_mask: env::var("TRAINING_VALIDITY_MASK")
                .ok()
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(defaults.include_validity_mask),
        }
    }
}
