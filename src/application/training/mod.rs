pub mod driver;
pub mod fit;

pub use driver::{TrainingDriver, TrainingOutcome};
pub use fit::{FitConfig, fit, prepare_examples};
