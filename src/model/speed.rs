//! USB signaling rates and link speed classification.

use std::fmt;

/// USB speed variants, one per known signaling rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsbSpeed {
    /// USB 1.0 Low Speed - 1.5 Mbps
    Low,
    /// USB 1.1 Full Speed - 12 Mbps
    Full,
    /// USB 2.0 High Speed - 480 Mbps
    High,
    /// USB 3.0/3.1 Gen 1 SuperSpeed - 5 Gbps
    Super,
    /// USB 3.1 Gen 2 SuperSpeed+ - 10 Gbps
    SuperPlus,
    /// USB 3.2 Gen 2x2 SuperSpeed+ - 20 Gbps
    SuperPlus2,
}

impl UsbSpeed {
    const ALL: [UsbSpeed; 6] = [
        Self::Low,
        Self::Full,
        Self::High,
        Self::Super,
        Self::SuperPlus,
        Self::SuperPlus2,
    ];

    /// Look up a signaling rate given in bits per second.
    pub fn from_bps(bps: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.raw_bandwidth_bps() == bps)
    }

    /// Raw bandwidth in bits per second.
    pub fn raw_bandwidth_bps(&self) -> u64 {
        match self {
            Self::Low => 1_500_000,
            Self::Full => 12_000_000,
            Self::High => 480_000_000,
            Self::Super => 5_000_000_000,
            Self::SuperPlus => 10_000_000_000,
            Self::SuperPlus2 => 20_000_000_000,
        }
    }

    /// Display string for the tray, e.g. "480 Mbps".
    pub fn display_speed(&self) -> &'static str {
        match self {
            Self::Low => "1.5 Mbps",
            Self::Full => "12 Mbps",
            Self::High => "480 Mbps",
            Self::Super => "5 Gbps",
            Self::SuperPlus => "10 Gbps",
            Self::SuperPlus2 => "20 Gbps",
        }
    }

    /// Marketing generation name.
    pub fn generation(&self) -> &'static str {
        match self {
            Self::Low => "USB 1.0",
            Self::Full => "USB 1.1",
            Self::High => "USB 2.0",
            Self::Super => "USB 3.2 Gen 1",
            Self::SuperPlus => "USB 3.2 Gen 2",
            Self::SuperPlus2 => "USB 3.2 Gen 2x2",
        }
    }
}

impl fmt::Display for UsbSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "Low Speed (1.5 Mbps)",
            Self::Full => "Full Speed (12 Mbps)",
            Self::High => "High Speed (480 Mbps)",
            Self::Super => "SuperSpeed (5 Gbps)",
            Self::SuperPlus => "SuperSpeed+ (10 Gbps)",
            Self::SuperPlus2 => "SuperSpeed+ 2x2 (20 Gbps)",
        };
        write!(f, "{}", name)
    }
}

/// Parse the sysfs `speed` attribute (Mbps, possibly fractional like "1.5")
/// into bits per second.
pub fn parse_sysfs_speed(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let (whole, frac) = match raw.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (raw, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) || frac.len() > 6 {
        return None;
    }

    let whole_bps = whole.parse::<u64>().ok()?.checked_mul(1_000_000)?;
    // Right-pad to six digits: "5" -> 500_000 bps.
    let frac_bps = if frac.is_empty() {
        0
    } else {
        format!("{:0<6}", frac).parse::<u64>().ok()?
    };
    whole_bps.checked_add(frac_bps)
}

/// Render a link rate for display. Known USB rates map to their table entry,
/// anything else falls back to the raw value.
pub fn format_link_speed(bps: u64) -> String {
    match UsbSpeed::from_bps(bps) {
        Some(speed) => speed.display_speed().to_string(),
        None => format!("{} bps", bps),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bps() {
        assert_eq!(UsbSpeed::from_bps(480_000_000), Some(UsbSpeed::High));
        assert_eq!(UsbSpeed::from_bps(5_000_000_000), Some(UsbSpeed::Super));
        assert_eq!(
            UsbSpeed::from_bps(10_000_000_000),
            Some(UsbSpeed::SuperPlus)
        );
        assert_eq!(UsbSpeed::from_bps(999), None);
    }

    #[test]
    fn test_format_link_speed_table() {
        assert_eq!(format_link_speed(1_500_000), "1.5 Mbps");
        assert_eq!(format_link_speed(12_000_000), "12 Mbps");
        assert_eq!(format_link_speed(480_000_000), "480 Mbps");
        assert_eq!(format_link_speed(5_000_000_000), "5 Gbps");
        assert_eq!(format_link_speed(10_000_000_000), "10 Gbps");
        assert_eq!(format_link_speed(20_000_000_000), "20 Gbps");
    }

    #[test]
    fn test_format_link_speed_fallback() {
        assert_eq!(format_link_speed(333_000_000), "333000000 bps");
        assert_eq!(format_link_speed(0), "0 bps");
    }

    #[test]
    fn test_parse_sysfs_speed() {
        assert_eq!(parse_sysfs_speed("480\n"), Some(480_000_000));
        assert_eq!(parse_sysfs_speed("5000"), Some(5_000_000_000));
        assert_eq!(parse_sysfs_speed("1.5"), Some(1_500_000));
        assert_eq!(parse_sysfs_speed(" 20000 "), Some(20_000_000_000));
        assert_eq!(parse_sysfs_speed(""), None);
        assert_eq!(parse_sysfs_speed("-12"), None);
        assert_eq!(parse_sysfs_speed("fast"), None);
        assert_eq!(parse_sysfs_speed(".5"), None);
    }
}
