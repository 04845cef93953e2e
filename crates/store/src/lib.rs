pub mod backend;
pub mod db;
pub mod memory;
pub mod query;
pub mod range;
pub mod retention;
pub mod schema;
pub mod series;
pub mod write;

pub use backend::SeriesBackend;
pub use db::DuckDbBackend;
pub use memory::MemoryBackend;
pub use range::RangeQueryService;
pub use series::SeriesStore;
