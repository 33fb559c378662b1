//! Linux sysfs access: USB storage discovery and mount points.

pub mod mountinfo;
mod scanner;

pub use mountinfo::{MountEntry, MountTable};
pub use scanner::{SysfsError, SysfsScanner, UsbAttachment};
