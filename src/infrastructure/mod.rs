pub mod market_data;
pub mod persistence;
pub mod repositories;

pub use market_data::CsvObservationSource;
pub use persistence::Database;
pub use repositories::{
    InMemoryFactorRepository, InMemoryModelArtifactStore, InMemoryObservationSource,
    InMemoryTaskRepository,
};
