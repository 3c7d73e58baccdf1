//! Configuration module for factorlab.
//!
//! Structured configuration loading from environment variables, organized by
//! concern: Storage, Training and Backtest. Call `dotenvy::dotenv()` first to
//! pick up a `.env` file.

mod backtest_config;
mod definitions;
mod storage_config;
mod training_config;

pub use backtest_config::BacktestEnvConfig;
pub use definitions::Definitions;
pub use storage_config::{DataSourceKind, StorageEnvConfig};
pub use training_config::TrainingEnvConfig;

use crate::application::worker::JobSettings;
use anyhow::Result;

/// Main application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub storage: StorageEnvConfig,
    pub training: TrainingEnvConfig,
    pub backtest: BacktestEnvConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            storage: StorageEnvConfig::from_env()?,
            training: TrainingEnvConfig::from_env(),
            backtest: BacktestEnvConfig::from_env(),
        })
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            learning_rate: self.training.learning_rate,
            seed: self.training.seed,
            include_validity_mask: self.training.include_validity_mask,
            initial_balance: self.backtest.initial_balance,
        }
    }
}
