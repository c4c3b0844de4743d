pub mod observation;
pub mod presence;

pub use observation::{MetadataUpdate, Observation};
pub use presence::{DeviceState, PresenceStatus};
