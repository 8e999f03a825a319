pub mod manager;
pub mod recording;
pub mod store;
pub mod summary;

pub use manager::RecordingManager;
pub use recording::Recording;
pub use store::SessionStore;
pub use summary::{duration_label, summarize, RecordingSummary, DEFAULT_PREVIEW_STEPS};
