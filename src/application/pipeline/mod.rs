pub mod aligner;
pub mod dataset;
pub mod factor_evaluator;
pub mod windower;

pub use aligner::align;
pub use dataset::{DatasetBuilder, GeneratedData};
pub use factor_evaluator::{FactorEvaluator, apply_factors, apply_transforms};
pub use windower::{WindowSpec, window};
