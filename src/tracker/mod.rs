pub mod metrics;
pub mod store;

pub use metrics::AccuracyFilter;
pub use store::{TrackerEntry, TrackerStore};
