// Aligned records, windows and labels
pub mod dataset;

// Domain-specific error types
pub mod errors;

// Factor program language and factor records
pub mod factor;

// Observations, intervals and date ranges
pub mod market;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

// Training task definitions
pub mod task;
