pub mod filter;
pub mod store;
pub mod tracker;

pub use filter::SignalFloor;
pub use store::PresenceStore;
pub use tracker::{PresenceTracker, TrackerConfig};
