pub mod engine;
pub mod simulation;

pub use engine::{BacktestEngine, CurrentPrediction, infer};
pub use simulation::{BacktestReport, CurvePoint, DEFAULT_INITIAL_BALANCE, ProfitCurves, StepChange, simulate};
