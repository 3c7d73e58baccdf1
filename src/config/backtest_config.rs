//! Backtest configuration parsing from environment variables.

use crate::application::backtest::DEFAULT_INITIAL_BALANCE;
use std::env;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestEnvConfig {
    pub initial_balance: f64,
}

impl Default for BacktestEnvConfig {
    fn default() -> Self {
        Self {
            initial_balance: DEFAULT_INITIAL_BALANCE,
        }
    }
}

impl BacktestEnvConfig {
    pub fn from_env() -> Self {
        Self {
            initial_balance: env::var("BACKTEST_INITIAL_BALANCE")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|b| *b > 0.0)
                .unwrap_or(DEFAULT_INITIAL_BALANCE),
        }
    }
}
