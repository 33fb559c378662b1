//! USB storage device records and scan snapshots.

use super::speed::{UsbSpeed, format_link_speed};
use std::collections::BTreeMap;

/// Sysfs USB device name: bus-port.port.port...
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevicePath(pub String);

impl DevicePath {
    /// Create a new device path.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Parse a sysfs directory name as a USB device path.
    ///
    /// Accepts "3-1", "3-1.2.3"; rejects root hubs ("usb3") and
    /// interfaces ("3-1:1.0").
    pub fn parse(name: &str) -> Option<Self> {
        let (bus, ports) = name.split_once('-')?;
        if bus.is_empty() || !bus.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let valid_ports = ports
            .split('.')
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
        valid_ports.then(|| Self::new(name))
    }
}

impl std::fmt::Display for DevicePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable key for one attached storage device: "<usb-path>/<block>".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn new(usb_path: &DevicePath, block_device: &str) -> Self {
        Self(format!("{}/{}", usb_path, block_device))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One attached USB storage device and its negotiated link speed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpeedRecord {
    /// Stable key across polls.
    pub identity: DeviceIdentity,
    /// Human readable name (not unique).
    pub label: String,
    /// Negotiated link rate in bits per second.
    pub link_speed_bps: u64,
    /// Block device name (e.g., "sda").
    pub block_device: String,
    /// USB device the block device hangs off (e.g., "2-3").
    pub usb_path: DevicePath,
    /// Vendor ID.
    pub vendor_id: Option<u16>,
    /// Product ID.
    pub product_id: Option<u16>,
    /// Serial number.
    pub serial: Option<String>,
    /// Where the device or its partitions are mounted.
    pub mount_points: Vec<String>,
}

impl DeviceSpeedRecord {
    /// Rounded display string, a pure function of `link_speed_bps`.
    pub fn display_speed(&self) -> String {
        format_link_speed(self.link_speed_bps)
    }

    /// Known USB generation for the link rate, if any.
    pub fn usb_speed(&self) -> Option<UsbSpeed> {
        UsbSpeed::from_bps(self.link_speed_bps)
    }

    /// Format VID:PID as string.
    pub fn vid_pid(&self) -> Option<String> {
        match (self.vendor_id, self.product_id) {
            (Some(vid), Some(pid)) => Some(format!("{:04x}:{:04x}", vid, pid)),
            _ => None,
        }
    }
}

/// All qualifying devices seen by one scan, ordered by identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: BTreeMap<DeviceIdentity, DeviceSpeedRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, identity: &DeviceIdentity) -> Option<&DeviceSpeedRecord> {
        self.records.get(identity)
    }

    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.records.contains_key(identity)
    }

    /// Records in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceSpeedRecord> {
        self.records.values()
    }
}

impl FromIterator<DeviceSpeedRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = DeviceSpeedRecord>>(iter: I) -> Self {
        Self {
            records: iter
                .into_iter()
                .map(|record| (record.identity.clone(), record))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a DeviceSpeedRecord;
    type IntoIter = std::collections::btree_map::Values<'a, DeviceIdentity, DeviceSpeedRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(usb: &str, block: &str, bps: u64) -> DeviceSpeedRecord {
        let usb_path = DevicePath::new(usb);
        DeviceSpeedRecord {
            identity: DeviceIdentity::new(&usb_path, block),
            label: block.to_string(),
            link_speed_bps: bps,
            block_device: block.to_string(),
            usb_path,
            vendor_id: Some(0x0781),
            product_id: Some(0x5581),
            serial: None,
            mount_points: Vec::new(),
        }
    }

    #[test]
    fn test_device_path_parse() {
        assert_eq!(DevicePath::parse("3-1"), Some(DevicePath::new("3-1")));
        assert_eq!(
            DevicePath::parse("3-1.2.3"),
            Some(DevicePath::new("3-1.2.3"))
        );
        assert_eq!(DevicePath::parse("usb3"), None);
        assert_eq!(DevicePath::parse("3-1:1.0"), None);
        assert_eq!(DevicePath::parse("target6:0:0"), None);
        assert_eq!(DevicePath::parse("pci-0000"), None);
        assert_eq!(DevicePath::parse("3-"), None);
    }

    #[test]
    fn test_display_speed_is_derived() {
        let a = record("2-1", "sda", 5_000_000_000);
        let b = record("3-4", "sdc", 5_000_000_000);
        assert_eq!(a.display_speed(), "5 Gbps");
        assert_eq!(a.display_speed(), b.display_speed());
        assert_eq!(a.usb_speed(), Some(UsbSpeed::Super));
        assert_eq!(a.vid_pid().as_deref(), Some("0781:5581"));
    }

    #[test]
    fn test_snapshot_orders_by_identity() {
        let snapshot: Snapshot = [
            record("4-1", "sdb", 480_000_000),
            record("2-3", "sda", 5_000_000_000),
        ]
        .into_iter()
        .collect();

        let ids: Vec<&str> = snapshot.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(ids, vec!["2-3/sda", "4-1/sdb"]);
        assert!(snapshot.contains(&DeviceIdentity::new(&DevicePath::new("4-1"), "sdb")));
    }
}
