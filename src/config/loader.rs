//! Configuration loading and management.

use crate::model::{DeviceSpeedRecord, Snapshot};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE_NAME: &str = "usb-link-speed-tray.toml";
const CONFIG_DIR_NAME: &str = "usb-link-speed-tray";

/// Lower bound for the poll interval.
pub const MIN_REFRESH_MS: u64 = 250;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Inheritance error: {0}")]
    Inheritance(String),
}

/// Application configuration.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Global settings.
    #[serde(default)]
    pub settings: Settings,

    /// Product labels by VID:PID or VID:PID:iSerial (e.g., "0781:5581").
    #[serde(default)]
    pub products: HashMap<String, String>,

    /// Device labels by USB path (e.g., "2-3", "4-1.2").
    #[serde(default)]
    pub devices: HashMap<String, String>,
}

/// Global settings.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Poll interval in milliseconds.
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,

    /// Icon theme name shown in the tray.
    #[serde(default = "default_icon_name")]
    pub icon_name: String,

    /// Append mount points to each device row.
    #[serde(default = "default_show_mount_points")]
    pub show_mount_points: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh_ms: default_refresh_ms(),
            icon_name: default_icon_name(),
            show_mount_points: default_show_mount_points(),
        }
    }
}

impl Settings {
    /// Poll interval, never shorter than [`MIN_REFRESH_MS`].
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms.max(MIN_REFRESH_MS))
    }
}

fn default_refresh_ms() -> u64 {
    3000
}

fn default_icon_name() -> String {
    "drive-removable-media-usb".to_string()
}

fn default_show_mount_points() -> bool {
    true
}

impl Config {
    /// Load configuration from default locations.
    /// Search order:
    /// 1. ./usb-link-speed-tray.toml
    /// 2. ~/.config/usb-link-speed-tray/config.toml
    /// 3. /etc/usb-link-speed-tray.toml
    pub fn load() -> Result<Self, ConfigError> {
        let paths = Self::config_paths();

        for path in paths.into_iter().flatten() {
            if path.exists() {
                tracing::debug!("loading config from {}", path.display());
                return Self::load_from_path(&path);
            }
        }

        // No config file found - use defaults
        Ok(Config::default())
    }

    /// Load configuration from a specific path, supporting inheritance.
    ///
    /// If the config file contains an `inherit` key (string or array of strings),
    /// the inherited files are loaded first and merged, with the current file's
    /// values taking priority.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let mut ancestors = HashSet::new();
        let merged = read_and_flatten_toml(path, &mut ancestors)?;
        let config: Config = merged.try_into()?;
        Ok(config)
    }

    /// Get list of possible config paths.
    fn config_paths() -> Vec<Option<PathBuf>> {
        vec![
            std::env::current_dir().ok().map(|p| p.join(CONFIG_FILE_NAME)),
            dirs::config_dir().map(|p| p.join(CONFIG_DIR_NAME).join("config.toml")),
            Some(PathBuf::from("/etc").join(CONFIG_FILE_NAME)),
        ]
    }

    /// Get a configured label for a device, checking sources in priority order:
    /// 1. Product with serial (VID:PID:iSerial) - specific device
    /// 2. Product without serial (VID:PID) - all devices of this type
    /// 3. USB path label - whatever is plugged into that port
    pub fn device_label(&self, record: &DeviceSpeedRecord) -> Option<String> {
        if let Some(product_key) = record.vid_pid() {
            // Priority 1: Product with serial (VID:PID:iSerial)
            if let Some(serial) = &record.serial {
                let key_with_serial = format!("{}:{}", product_key, serial);
                if let Some(label) = self.products.get(&key_with_serial) {
                    return Some(label.clone());
                }
            }

            // Priority 2: Product without serial (VID:PID)
            if let Some(label) = self.products.get(&product_key) {
                return Some(label.clone());
            }
        }

        // Priority 3: USB path
        self.devices.get(&record.usb_path.0).cloned()
    }
}

// =============================================================================
// TOML Inheritance Support
// =============================================================================

/// Read a TOML file and flatten any inheritance.
///
/// If the file contains an `inherit` key, the inherited files are loaded first
/// and merged. The `inherit` key can be:
/// - A string: single file to inherit from
/// - An array of strings: multiple files to inherit from (applied in order)
///
/// Paths in `inherit` are relative to the directory containing the config file.
/// A file may be inherited by several parents; only a file that inherits
/// itself (directly or indirectly) is an error.
fn read_and_flatten_toml(
    path: &Path,
    ancestors: &mut HashSet<PathBuf>,
) -> Result<toml::Value, ConfigError> {
    let canonical = path.canonicalize().map_err(|e| {
        ConfigError::Inheritance(format!("cannot resolve {}: {}", path.display(), e))
    })?;

    // `ancestors` holds the current inheritance chain only
    if !ancestors.insert(canonical.clone()) {
        return Err(ConfigError::Inheritance(format!(
            "{} inherits itself; circular dependencies are not allowed",
            path.display()
        )));
    }

    let flattened = flatten_inherited(path, ancestors);
    ancestors.remove(&canonical);
    flattened
}

fn flatten_inherited(
    path: &Path,
    ancestors: &mut HashSet<PathBuf>,
) -> Result<toml::Value, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut doc: toml::Value = toml::from_str(&content)?;

    let inherit = doc.as_table_mut().and_then(|table| table.remove("inherit"));
    let Some(inherit) = inherit else {
        return Ok(doc);
    };

    let base_dir = path.parent().unwrap_or(Path::new("."));

    let inherited_paths: Vec<PathBuf> = match inherit {
        toml::Value::String(s) => vec![base_dir.join(&s)],
        toml::Value::Array(arr) => arr
            .into_iter()
            .map(|item| match item {
                toml::Value::String(s) => Ok(base_dir.join(&s)),
                _ => Err(ConfigError::Inheritance(
                    "inherit array must contain only strings".to_string(),
                )),
            })
            .collect::<Result<_, _>>()?,
        _ => {
            return Err(ConfigError::Inheritance(
                "inherit must be a string or array of strings".to_string(),
            ));
        }
    };

    let mut merged: Option<toml::Value> = None;
    for inherited_path in inherited_paths {
        let inherited = read_and_flatten_toml(&inherited_path, ancestors)?;
        merged = Some(match merged {
            Some(base) => merge_toml_values(base, inherited),
            None => inherited,
        });
    }

    // Current file wins over everything it inherits
    Ok(match merged {
        Some(base) => merge_toml_values(base, doc),
        None => doc,
    })
}

/// Deep-merge two TOML values.
///
/// - Tables are merged recursively (later values override earlier)
/// - Arrays are concatenated
/// - Other values are replaced by the later value
fn merge_toml_values(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                let merged_value = match base_table.remove(&key) {
                    Some(base_value) => merge_toml_values(base_value, overlay_value),
                    None => overlay_value,
                };
                base_table.insert(key, merged_value);
            }
            toml::Value::Table(base_table)
        }
        (toml::Value::Array(mut base_arr), toml::Value::Array(overlay_arr)) => {
            base_arr.extend(overlay_arr);
            toml::Value::Array(base_arr)
        }
        (_, overlay) => overlay,
    }
}

/// Generate example configuration content.
pub fn example_config() -> &'static str {
    r#"# usb-link-speed-tray configuration file
# Place in ./usb-link-speed-tray.toml, ~/.config/usb-link-speed-tray/config.toml,
# or /etc/usb-link-speed-tray.toml

# Optional: load shared settings first (relative to this file)
# inherit = "base.toml"

[settings]
# Poll interval in milliseconds (minimum 250)
refresh_ms = 3000
# Icon theme name for the tray icon
icon_name = "drive-removable-media-usb"
# Show where each device is mounted
show_mount_points = true

# Product labels (by VID:PID or VID:PID:iSerial)
[products]
# "0781:5581" = "SanDisk Ultra"
# "0bc2:ab38:NA8F1234" = "Backup Drive"

# Port labels (by USB path, see `usb-link-speed-tray list`)
[devices]
# "2-3" = "Front USB-C"
"#
}

/// Generate a configuration file listing the currently attached devices.
pub fn generate_config(snapshot: &Snapshot) -> String {
    let mut output = String::new();

    output.push_str("# usb-link-speed-tray configuration file - auto-generated\n");
    output.push_str("# Edit labels below to customize device names in the tray menu\n\n");

    let settings = Settings::default();
    output.push_str("[settings]\n");
    output.push_str(&format!("refresh_ms = {}\n", settings.refresh_ms));
    output.push_str(&format!("icon_name = \"{}\"\n", settings.icon_name));
    output.push_str(&format!(
        "show_mount_points = {}\n\n",
        settings.show_mount_points
    ));

    output.push_str("[products]\n");
    let mut products: Vec<(String, &str)> = snapshot
        .iter()
        .filter_map(|record| record.vid_pid().map(|key| (key, record.label.as_str())))
        .collect();
    products.sort();
    products.dedup_by(|a, b| a.0 == b.0);
    for (key, label) in &products {
        output.push_str(&format!(
            "\"{}\" = \"{}\"\n",
            key,
            sanitize_toml_string(label)
        ));
    }
    output.push('\n');

    output.push_str("# Port labels are specific to where a device is plugged in\n");
    output.push_str("[devices]\n");
    for record in snapshot {
        output.push_str(&format!(
            "# \"{}\" = \"{}\"  # {} {}\n",
            record.usb_path,
            sanitize_toml_string(&record.label),
            record.block_device,
            record.display_speed()
        ));
    }

    output
}

/// Sanitize a string for use as a TOML value (escape special chars).
fn sanitize_toml_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}
