pub mod device;
pub mod device_metadata;
pub mod presence_event;
pub mod report;

pub use device::Device;
pub use device_metadata::{DeviceMetadata, VendorEntry};
pub use presence_event::PresenceEvent;
pub use report::{DeviceListing, PresenceStats, RetentionReport};
