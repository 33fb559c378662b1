//! Tray presentation: snapshot diffing and the StatusNotifierItem icon.

mod indicator;
mod presenter;

pub use indicator::{SpeedIndicator, TRAY_ID, TrayError, TrayHandle};
pub use presenter::{DeviceRow, IDLE_TEXT, Presenter, SnapshotDiff, TrayView, diff};
