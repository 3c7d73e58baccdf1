// Historical market data
pub mod interval;
pub mod observation;

pub use interval::{DateRange, Interval};
pub use observation::{BASE_FIELDS, FACTOR_KEY_PREFIX, FieldValue, RawObservation};
