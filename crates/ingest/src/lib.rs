pub mod http;
pub mod ingestion;
pub mod live;
pub mod session;
pub mod source;

pub use ingestion::{Clock, IngestionConfig, IngestionHandle, IngestionLoop};
pub use live::{LiveHub, LiveSubscription};
pub use session::LiveSession;
pub use source::{RandomSource, SampleSource};
