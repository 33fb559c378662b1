//! USB Link Speed Tray
//!
//! Reports the negotiated link speed of attached USB storage devices on Linux,
//! as a library and as a tray indicator.

pub mod config;
pub mod logging;
pub mod model;
pub mod sysfs;
pub mod tray;

pub use config::Config;
pub use model::{DeviceIdentity, DeviceSpeedRecord, Snapshot, UsbSpeed};
pub use sysfs::SysfsScanner;
