// Model replay and profit simulation
pub mod backtest;

// Factor authoring
pub mod factor_service;

// Sequence classifiers and artifacts
pub mod ml;

// Factor evaluation, alignment and windowing
pub mod pipeline;

// Epoch loop and training driver
pub mod training;

// Isolated job workers and the invoking client
pub mod worker;
