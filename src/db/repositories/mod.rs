pub mod device_metadata;
pub mod devices;
pub mod presence_events;
pub mod reports;
pub mod retention;

pub use presence_events::TrackedIdentity;
