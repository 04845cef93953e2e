pub mod feed;
pub mod session;
pub mod window;

pub use feed::{HistorySource, LiveFeed};
pub use session::{WindowCommand, WindowSession, WindowView};
pub use window::LiveMergeWindow;
