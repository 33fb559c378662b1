//! USB storage data model types.

pub mod device;
pub mod speed;

pub use device::{DeviceIdentity, DevicePath, DeviceSpeedRecord, Snapshot};
pub use speed::{UsbSpeed, format_link_speed, parse_sysfs_speed};
