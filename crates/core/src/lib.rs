pub mod config;
pub mod error;
pub mod key;
pub mod model;
pub mod query;
pub mod time;

pub use error::{Result, SensorlineError, StoreError, StoreErrorKind};
pub use key::SeriesKey;
pub use model::sample::Sample;
