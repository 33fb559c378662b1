//! Sysfs scanner for USB storage devices and their link speed.

use super::mountinfo::{MountTable, PROC_MOUNTINFO};
use crate::model::{DeviceIdentity, DevicePath, DeviceSpeedRecord, Snapshot, parse_sysfs_speed};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const SYSFS_ROOT: &str = "/sys";

/// USB Mass Storage interface class (BOT and UAS).
const MASS_STORAGE_CLASS: u8 = 0x08;

/// Errors that can occur while probing one block device.
#[derive(Debug, Error)]
pub enum SysfsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error for attribute '{0}': {1}")]
    Parse(String, String),
    #[error("Missing attribute: {0}")]
    MissingAttribute(String),
}

/// Where a block device attaches to the USB tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbAttachment {
    /// USB device name (e.g., "2-3").
    pub usb_path: DevicePath,
    /// Sysfs directory of the USB device.
    pub device_dir: PathBuf,
    /// Sysfs directory of the interface the storage driver bound to.
    pub interface_dir: PathBuf,
}

impl UsbAttachment {
    /// Locate the USB device in a resolved block `device` path such as
    /// `/sys/devices/pci0000:00/0000:00:14.0/usb2/2-1/2-1.4/2-1.4:1.0/host6/...`.
    ///
    /// Returns `None` for anything not behind a USB root hub. Behind hubs the
    /// deepest device (the one owning the interface) is returned.
    pub fn from_device_path(resolved: &Path) -> Option<Self> {
        let mut prefix = PathBuf::new();
        let mut past_root_hub = false;
        let mut device: Option<(DevicePath, PathBuf)> = None;

        for component in resolved.components() {
            prefix.push(component);
            let Component::Normal(name) = component else {
                continue;
            };
            let name = name.to_string_lossy();

            if !past_root_hub {
                past_root_hub = name
                    .strip_prefix("usb")
                    .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
                continue;
            }

            if let Some(path) = DevicePath::parse(&name) {
                device = Some((path, prefix.clone()));
                continue;
            }

            // First non-device component must be the interface "B-P:C.I".
            let (usb_path, device_dir) = device?;
            let is_interface = name
                .split_once(':')
                .is_some_and(|(dev, _)| dev == usb_path.0);
            return is_interface.then(|| Self {
                usb_path,
                device_dir,
                interface_dir: prefix,
            });
        }

        None
    }
}

/// Scanner for external USB storage devices.
#[derive(Debug, Clone)]
pub struct SysfsScanner {
    sys_root: PathBuf,
    mountinfo: PathBuf,
}

impl Default for SysfsScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl SysfsScanner {
    /// Create a new scanner using the live `/sys` and `/proc/self/mountinfo`.
    pub fn new() -> Self {
        Self {
            sys_root: PathBuf::from(SYSFS_ROOT),
            mountinfo: PathBuf::from(PROC_MOUNTINFO),
        }
    }

    /// Create a scanner over a different sysfs root and mountinfo file (for testing).
    pub fn with_roots(sys_root: impl AsRef<Path>, mountinfo: impl AsRef<Path>) -> Self {
        Self {
            sys_root: sys_root.as_ref().to_path_buf(),
            mountinfo: mountinfo.as_ref().to_path_buf(),
        }
    }

    fn sys_block(&self) -> PathBuf {
        self.sys_root.join("block")
    }

    /// Take a snapshot of all attached USB storage devices.
    ///
    /// Devices whose attributes cannot be read are left out; the scan never
    /// fails as a whole.
    pub fn scan(&self) -> Snapshot {
        let sys_block = self.sys_block();
        let entries = match std::fs::read_dir(&sys_block) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("cannot list {}: {}", sys_block.display(), e);
                return Snapshot::new();
            }
        };

        let mounts = MountTable::read(&self.mountinfo);
        let mut names: Vec<String> = entries
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();

        names
            .into_iter()
            .filter_map(|name| match self.probe_block(&name, &mounts) {
                Ok(Some(record)) => {
                    debug!(
                        "USB block {} path {} speed {}",
                        name,
                        record.usb_path,
                        record.display_speed()
                    );
                    Some(record)
                }
                Ok(None) => None,
                Err(e) => {
                    debug!("skipping block {}: {}", name, e);
                    None
                }
            })
            .collect()
    }

    /// Build a record for one block device.
    ///
    /// `Ok(None)` means the device is not USB storage; `Err` means it is but
    /// could not be read.
    fn probe_block(
        &self,
        name: &str,
        mounts: &MountTable,
    ) -> Result<Option<DeviceSpeedRecord>, SysfsError> {
        let block_dir = self.sys_block().join(name);
        let device_link = block_dir.join("device");

        // loop, ram, zram, dm-N have no backing device
        let Ok(resolved) = std::fs::canonicalize(&device_link) else {
            debug!("block {} has no device link, skipping", name);
            return Ok(None);
        };
        let Some(usb) = UsbAttachment::from_device_path(&resolved) else {
            debug!("block {} is not USB, skipping", name);
            return Ok(None);
        };

        if let Ok(class) = self.read_hex_attr_u8(&usb.interface_dir, "bInterfaceClass")
            && class != MASS_STORAGE_CLASS
        {
            debug!(
                "block {} on {} has interface class {:02x}, skipping",
                name, usb.usb_path, class
            );
            return Ok(None);
        }

        let link_speed_bps = self.read_speed_bps(&usb.device_dir)?;

        let vendor_id = self.read_hex_attr_u16(&usb.device_dir, "idVendor").ok();
        let product_id = self.read_hex_attr_u16(&usb.device_dir, "idProduct").ok();
        let serial = self.read_attr_trimmed(&usb.device_dir, "serial");
        let label = self.device_label(name, &usb.device_dir, &device_link);
        let mount_points = mounts.mount_points_for(name, &self.sys_block());

        Ok(Some(DeviceSpeedRecord {
            identity: DeviceIdentity::new(&usb.usb_path, name),
            label,
            link_speed_bps,
            block_device: name.to_string(),
            usb_path: usb.usb_path,
            vendor_id,
            product_id,
            serial,
            mount_points,
        }))
    }

    /// Label: USB manufacturer + product, else SCSI vendor + model, else block name.
    fn device_label(&self, block: &str, usb_dir: &Path, scsi_dir: &Path) -> String {
        let usb_name = join_words(&[
            self.read_attr_trimmed(usb_dir, "manufacturer"),
            self.read_attr_trimmed(usb_dir, "product"),
        ]);
        if !usb_name.is_empty() {
            return usb_name;
        }

        let scsi_name = join_words(&[
            self.read_attr_trimmed(scsi_dir, "vendor"),
            self.read_attr_trimmed(scsi_dir, "model"),
        ]);
        if !scsi_name.is_empty() {
            return scsi_name;
        }

        block.to_string()
    }

    fn read_speed_bps(&self, usb_dir: &Path) -> Result<u64, SysfsError> {
        let path = usb_dir.join("speed");
        if !path.exists() {
            return Err(SysfsError::MissingAttribute(path.display().to_string()));
        }
        let content = std::fs::read_to_string(&path)?;
        parse_sysfs_speed(&content)
            .ok_or_else(|| SysfsError::Parse("speed".to_string(), content.trim().to_string()))
    }

    // Helper methods for reading sysfs attributes

    fn read_attr_trimmed(&self, path: &Path, attr: &str) -> Option<String> {
        std::fs::read_to_string(path.join(attr))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn read_hex_attr_u8(&self, path: &Path, attr: &str) -> Result<u8, SysfsError> {
        let content = std::fs::read_to_string(path.join(attr))?;
        u8::from_str_radix(content.trim(), 16)
            .map_err(|e| SysfsError::Parse(attr.to_string(), format!("{}", e)))
    }

    fn read_hex_attr_u16(&self, path: &Path, attr: &str) -> Result<u16, SysfsError> {
        let content = std::fs::read_to_string(path.join(attr))?;
        u16::from_str_radix(content.trim(), 16)
            .map_err(|e| SysfsError::Parse(attr.to_string(), format!("{}", e)))
    }
}

fn join_words(parts: &[Option<String>]) -> String {
    parts
        .iter()
        .flatten()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}
