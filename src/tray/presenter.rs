//! Turns scanner snapshots into what the tray shows.

use crate::config::Config;
use crate::model::{DeviceIdentity, DeviceSpeedRecord, Snapshot};
use tracing::{debug, info};

/// Text shown when no USB storage is attached.
pub const IDLE_TEXT: &str = "No USB storage";

/// One menu row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRow {
    pub identity: DeviceIdentity,
    pub text: String,
}

/// Everything the tray renders for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayView {
    /// Short text next to the icon.
    pub title: String,
    /// Tooltip body, one line per device.
    pub tooltip: Vec<String>,
    /// Menu rows; empty when idle.
    pub rows: Vec<DeviceRow>,
}

impl TrayView {
    /// View with no devices attached.
    pub fn idle() -> Self {
        Self {
            title: IDLE_TEXT.to_string(),
            tooltip: vec![IDLE_TEXT.to_string()],
            rows: Vec::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Difference between two consecutive snapshots.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub attached: Vec<DeviceIdentity>,
    pub detached: Vec<DeviceIdentity>,
    /// Still attached but renegotiated to another speed.
    pub changed: Vec<DeviceIdentity>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty() && self.changed.is_empty()
    }
}

/// Compare snapshots by identity.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> SnapshotDiff {
    let mut result = SnapshotDiff::default();

    for record in current {
        match previous.get(&record.identity) {
            None => result.attached.push(record.identity.clone()),
            Some(old) if old.link_speed_bps != record.link_speed_bps => {
                result.changed.push(record.identity.clone())
            }
            Some(_) => {}
        }
    }
    result.detached = previous
        .iter()
        .filter(|record| !current.contains(&record.identity))
        .map(|record| record.identity.clone())
        .collect();

    result
}

/// Holds the last snapshot and decides when the tray needs redrawing.
pub struct Presenter {
    config: Config,
    last: Option<Snapshot>,
    last_view: Option<TrayView>,
}

impl Presenter {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            last: None,
            last_view: None,
        }
    }

    /// Feed a new snapshot. Returns the view to show if it differs from the
    /// one currently shown; the first call always returns a view.
    pub fn observe(&mut self, snapshot: Snapshot) -> Option<TrayView> {
        if let Some(previous) = &self.last {
            let changes = diff(previous, &snapshot);
            for identity in &changes.attached {
                if let Some(record) = snapshot.get(identity) {
                    info!(
                        "attached {} ({}) at {}",
                        identity,
                        record.label,
                        record.display_speed()
                    );
                }
            }
            for identity in &changes.detached {
                info!("detached {}", identity);
            }
            for identity in &changes.changed {
                if let Some(record) = snapshot.get(identity) {
                    info!("{} renegotiated to {}", identity, record.display_speed());
                }
            }
        } else {
            info!("{} USB storage device(s) at startup", snapshot.len());
        }

        let view = self.render(&snapshot);
        self.last = Some(snapshot);

        if self.last_view.as_ref() == Some(&view) {
            return None;
        }
        debug!("tray view refreshed, {} row(s)", view.rows.len());
        self.last_view = Some(view.clone());
        Some(view)
    }

    /// Build the view for a snapshot without touching presenter state.
    pub fn render(&self, snapshot: &Snapshot) -> TrayView {
        if snapshot.is_empty() {
            return TrayView::idle();
        }

        let rows: Vec<DeviceRow> = snapshot
            .iter()
            .map(|record| DeviceRow {
                identity: record.identity.clone(),
                text: self.row_text(record),
            })
            .collect();
        let title = snapshot
            .iter()
            .map(|record| record.display_speed())
            .collect::<Vec<_>>()
            .join(", ");
        let tooltip = snapshot
            .iter()
            .map(|record| {
                let generation = record
                    .usb_speed()
                    .map(|speed| format!(" ({})", speed.generation()))
                    .unwrap_or_default();
                format!(
                    "{}: {}{}",
                    self.label(record),
                    record.display_speed(),
                    generation
                )
            })
            .collect();

        TrayView {
            title,
            tooltip,
            rows,
        }
    }

    /// Row text: "<block>: <speed> <label>" plus mount points.
    pub fn row_text(&self, record: &DeviceSpeedRecord) -> String {
        let mut text = format!(
            "{}: {} {}",
            record.block_device,
            record.display_speed(),
            self.label(record)
        );
        if self.config.settings.show_mount_points && !record.mount_points.is_empty() {
            text.push_str(&format!(" ({})", record.mount_points.join(", ")));
        }
        text
    }

    fn label(&self, record: &DeviceSpeedRecord) -> String {
        self.config
            .device_label(record)
            .unwrap_or_else(|| record.label.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DevicePath;

    fn record(usb: &str, block: &str, bps: u64) -> DeviceSpeedRecord {
        let usb_path = DevicePath::new(usb);
        DeviceSpeedRecord {
            identity: DeviceIdentity::new(&usb_path, block),
            label: format!("Disk {}", block),
            link_speed_bps: bps,
            block_device: block.to_string(),
            usb_path,
            vendor_id: Some(0x0bc2),
            product_id: Some(0xab38),
            serial: None,
            mount_points: Vec::new(),
        }
    }

    fn snapshot(records: Vec<DeviceSpeedRecord>) -> Snapshot {
        records.into_iter().collect()
    }

    #[test]
    fn test_first_observe_yields_view() {
        let mut presenter = Presenter::new(Config::default());
        let view = presenter.observe(Snapshot::new()).unwrap();
        assert!(view.is_idle());
        assert_eq!(view.title, IDLE_TEXT);
    }

    #[test]
    fn test_unchanged_snapshot_yields_none() {
        let mut presenter = Presenter::new(Config::default());
        let devices = vec![record("2-3", "sda", 5_000_000_000)];
        assert!(presenter.observe(snapshot(devices.clone())).is_some());
        assert!(presenter.observe(snapshot(devices)).is_none());
    }

    #[test]
    fn test_view_rows() {
        let presenter = Presenter::new(Config::default());
        let mut fast = record("2-3", "sda", 5_000_000_000);
        fast.mount_points = vec!["/media/a".to_string(), "/media/b".to_string()];
        let slow = record("1-4", "sdb", 480_000_000);

        let view = presenter.render(&snapshot(vec![fast, slow]));
        let rows: Vec<&str> = view.rows.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(
            rows,
            vec![
                "sdb: 480 Mbps Disk sdb",
                "sda: 5 Gbps Disk sda (/media/a, /media/b)",
            ]
        );
        assert_eq!(view.title, "480 Mbps, 5 Gbps");
        assert_eq!(view.tooltip[1], "Disk sda: 5 Gbps (USB 3.2 Gen 1)");
    }

    #[test]
    fn test_mount_points_hidden_by_setting() {
        let mut config = Config::default();
        config.settings.show_mount_points = false;
        let presenter = Presenter::new(config);
        let mut device = record("2-3", "sda", 5_000_000_000);
        device.mount_points = vec!["/media/a".to_string()];
        assert_eq!(presenter.row_text(&device), "sda: 5 Gbps Disk sda");
    }

    #[test]
    fn test_config_label_override() {
        let mut config = Config::default();
        config
            .products
            .insert("0bc2:ab38".to_string(), "Backup".to_string());
        let presenter = Presenter::new(config);
        assert_eq!(
            presenter.row_text(&record("2-3", "sda", 480_000_000)),
            "sda: 480 Mbps Backup"
        );
    }

    #[test]
    fn test_diff() {
        let before = snapshot(vec![
            record("2-3", "sda", 5_000_000_000),
            record("1-4", "sdb", 480_000_000),
        ]);
        let after = snapshot(vec![
            record("2-3", "sda", 480_000_000),
            record("2-4", "sdc", 10_000_000_000),
        ]);

        let changes = diff(&before, &after);
        assert_eq!(
            changes.attached,
            vec![DeviceIdentity::new(&DevicePath::new("2-4"), "sdc")]
        );
        assert_eq!(
            changes.detached,
            vec![DeviceIdentity::new(&DevicePath::new("1-4"), "sdb")]
        );
        assert_eq!(
            changes.changed,
            vec![DeviceIdentity::new(&DevicePath::new("2-3"), "sda")]
        );
        assert!(diff(&after, &after).is_empty());
    }

    #[test]
    fn test_detach_returns_to_idle() {
        let mut presenter = Presenter::new(Config::default());
        presenter.observe(snapshot(vec![record("2-3", "sda", 5_000_000_000)]));
        let view = presenter.observe(Snapshot::new()).unwrap();
        assert!(view.is_idle());
    }
}
