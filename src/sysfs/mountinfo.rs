//! Mount point lookup for block devices via `/proc/self/mountinfo`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const PROC_MOUNTINFO: &str = "/proc/self/mountinfo";

/// One line of mountinfo, reduced to what device matching needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// "major:minor" of the mounted device.
    pub major_minor: String,
    /// Mount point with octal escapes decoded.
    pub mount_point: String,
    /// Mount source (e.g., "/dev/sda1", "/dev/mapper/luks-..."), may be empty.
    pub source: String,
}

impl MountEntry {
    /// Parse one mountinfo line. Format (see proc(5)):
    /// `36 35 98:0 /mnt1 /mnt/parent rw,noatime master:1 - ext3 /dev/root rw`
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            return None;
        }
        let source = fields
            .iter()
            .position(|f| *f == "-")
            .and_then(|sep| fields.get(sep + 2))
            .map(|s| unescape(s))
            .unwrap_or_default();

        Some(Self {
            major_minor: fields[2].to_string(),
            mount_point: unescape(fields[4]),
            source,
        })
    }
}

/// Parsed mount table.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    pub fn parse(content: &str) -> Self {
        Self {
            entries: content.lines().filter_map(MountEntry::parse).collect(),
        }
    }

    /// Read a mountinfo file. An unreadable file yields an empty table.
    pub fn read(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                tracing::debug!("cannot read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Mount points of `block` (e.g. "sda") and its partitions, including
    /// device-mapper targets stacked on top of them. Sorted, deduplicated.
    pub fn mount_points_for(&self, block: &str, sys_block: &Path) -> Vec<String> {
        let dev_numbers = block_dev_numbers(block, sys_block);
        let mut result = BTreeSet::new();

        for entry in &self.entries {
            let matched = dev_numbers.contains(&entry.major_minor)
                || (entry.source.starts_with("/dev/")
                    && source_matches_block(&entry.source, block, sys_block));
            if matched {
                result.insert(entry.mount_point.clone());
            }
        }

        result.into_iter().collect()
    }
}

/// "major:minor" of a block device and all its partitions.
fn block_dev_numbers(block: &str, sys_block: &Path) -> BTreeSet<String> {
    let mut numbers = BTreeSet::new();
    let block_dir = sys_block.join(block);

    if let Ok(dev) = std::fs::read_to_string(block_dir.join("dev")) {
        numbers.insert(dev.trim().to_string());
    }

    let Ok(entries) = std::fs::read_dir(&block_dir) else {
        return numbers;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if is_partition_of(&name, block)
            && let Ok(dev) = std::fs::read_to_string(entry.path().join("dev"))
        {
            numbers.insert(dev.trim().to_string());
        }
    }

    numbers
}

/// Whether a `/dev/...` mount source is this block device, one of its
/// partitions, or a dm device backed by either.
fn source_matches_block(source: &str, block: &str, sys_block: &Path) -> bool {
    let resolved = std::fs::canonicalize(source).unwrap_or_else(|_| PathBuf::from(source));
    let Some(name) = resolved.file_name().map(|n| n.to_string_lossy().to_string()) else {
        return false;
    };

    if name == block || is_partition_of(&name, block) {
        return true;
    }
    if !name.starts_with("dm-") {
        return false;
    }

    let Ok(slaves) = std::fs::read_dir(sys_block.join(&name).join("slaves")) else {
        return false;
    };
    slaves.flatten().any(|slave| {
        let slave = slave.file_name().to_string_lossy().to_string();
        slave == block || is_partition_of(&slave, block)
    })
}

/// "sda1" is a partition of "sda"; "nvme0n1p2" of "nvme0n1".
fn is_partition_of(name: &str, block: &str) -> bool {
    let Some(rest) = name.strip_prefix(block) else {
        return false;
    };
    let rest = rest.strip_prefix('p').unwrap_or(rest);
    !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
}

/// Decode the octal escapes the kernel uses in mountinfo (`\040` = space).
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..=i + 3].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let value = (bytes[i + 1] - b'0') as u32 * 64
                + (bytes[i + 2] - b'0') as u32 * 8
                + (bytes[i + 3] - b'0') as u32;
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MOUNTINFO: &str = "\
22 1 259:2 / / rw,relatime shared:1 - ext4 /dev/nvme0n1p2 rw
98 22 8:1 / /run/media/me/USB\\040STICK rw,nosuid shared:50 - vfat /dev/sda1 rw
99 22 8:2 / /mnt/data rw,nosuid - ext4 /dev/sda2 rw
120 22 254:0 / /mnt/secret rw,relatime shared:60 - ext4 /dev/dm-0 rw
short line
";

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sys_block() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let block = tmp.path();
        write(&block.join("sda/dev"), "8:0\n");
        write(&block.join("sda/sda1/dev"), "8:1\n");
        write(&block.join("sda/sda2/dev"), "8:2\n");
        write(&block.join("sdb/dev"), "8:16\n");
        write(&block.join("sdb/sdb1/dev"), "8:17\n");
        write(&block.join("dm-0/dev"), "254:0\n");
        fs::create_dir_all(block.join("dm-0/slaves/sdb1")).unwrap();
        tmp
    }

    #[test]
    fn test_parse_entry() {
        let entry = MountEntry::parse(
            "98 22 8:1 / /run/media/me/USB\\040STICK rw,nosuid shared:50 - vfat /dev/sda1 rw",
        )
        .unwrap();
        assert_eq!(entry.major_minor, "8:1");
        assert_eq!(entry.mount_point, "/run/media/me/USB STICK");
        assert_eq!(entry.source, "/dev/sda1");

        assert!(MountEntry::parse("short line").is_none());
    }

    #[test]
    fn test_parse_entry_without_optional_fields() {
        let entry =
            MountEntry::parse("99 22 8:2 / /mnt/data rw,nosuid - ext4 /dev/sda2 rw").unwrap();
        assert_eq!(entry.mount_point, "/mnt/data");
        assert_eq!(entry.source, "/dev/sda2");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a\\040b"), "a b");
        assert_eq!(unescape("tab\\011x"), "tab\tx");
        assert_eq!(unescape("back\\134slash"), "back\\slash");
        assert_eq!(unescape("trailing\\04"), "trailing\\04");
    }

    #[test]
    fn test_mount_points_by_dev_number() {
        let tmp = sys_block();
        let table = MountTable::parse(MOUNTINFO);

        let mounts = table.mount_points_for("sda", tmp.path());
        assert_eq!(mounts, vec!["/mnt/data", "/run/media/me/USB STICK"]);
    }

    #[test]
    fn test_mount_points_through_dm_slave() {
        let tmp = sys_block();
        let table = MountTable::parse(MOUNTINFO);
        assert_eq!(table.mount_points_for("sdb", tmp.path()), vec!["/mnt/secret"]);
    }

    #[test]
    fn test_mount_points_by_source_path() {
        let tmp = TempDir::new().unwrap();
        // No dev files: only the /dev path can match.
        let table = MountTable::parse("40 22 0:99 / /media/x rw - vfat /dev/sdc1 rw\n");
        assert_eq!(table.mount_points_for("sdc", tmp.path()), vec!["/media/x"]);
        assert!(table.mount_points_for("sd", tmp.path()).is_empty());
    }

    #[test]
    fn test_unreadable_mountinfo_is_empty() {
        let tmp = sys_block();
        let table = MountTable::read(Path::new("/nonexistent/mountinfo"));
        assert!(table.mount_points_for("sda", tmp.path()).is_empty());
    }

    #[test]
    fn test_is_partition_of() {
        assert!(is_partition_of("sda1", "sda"));
        assert!(is_partition_of("nvme0n1p2", "nvme0n1"));
        assert!(!is_partition_of("sda", "sda"));
        assert!(!is_partition_of("sdab", "sda"));
    }
}
