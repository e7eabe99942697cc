//! Merged property set from property files and the ambient environment.
//!
//! Property files are supplied positionally; later files replace earlier
//! ones, and file-supplied values are preserved over ambient environment
//! values. Environment variable names are normalized to property form
//! (lowercased, `_` becomes `.`) before merging.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};

/// Property naming the node's base directory.
pub const DIR_PROP_NAME: &str = "replog.dir";

/// Property overriding the archive's local control channel.
pub const CONTROL_CHANNEL_PROP_NAME: &str = "replog.archive.control.channel";

/// Property overriding the archive's control stream id.
pub const CONTROL_STREAM_ID_PROP_NAME: &str = "replog.archive.control.stream.id";

/// Property selecting the hosted service id.
pub const SERVICE_ID_PROP_NAME: &str = "replog.cluster.service.id";

/// Property setting the snapshot size threshold, in bytes (suffixes
/// `k`/`m`/`g` accepted).
pub const SNAPSHOT_SIZE_PROP_NAME: &str = "replog.cluster.snapshot.size";

/// Default snapshot size threshold.
pub const DEFAULT_SNAPSHOT_SIZE: u64 = 1024 * 1024;

/// A merged set of string properties.
#[derive(Clone, Debug, Default)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    /// Load `paths` in order, then merge the ambient environment underneath.
    ///
    /// # Errors
    ///
    /// Fails if a property file cannot be read.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        let mut properties = Self::default();

        for path in paths {
            properties.load_file(path)?;
        }
        properties.merge_env();

        Ok(properties)
    }

    /// Load one `key=value` property file; values replace existing keys.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or a line is malformed.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Properties(format!("cannot read {}: {e}", path.display())))?;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::Properties(format!("malformed line in {}: {line}", path.display()))
            })?;
            self.values
                .insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(())
    }

    /// Merge the ambient environment underneath the file-supplied values.
    pub fn merge_env(&mut self) {
        for (key, value) in std::env::vars() {
            let normalized = key.to_lowercase().replace('_', ".");
            self.values.entry(normalized).or_insert(value);
        }
    }

    /// Look up a property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// String property with a default.
    #[must_use]
    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// `i32` property with a default.
    #[must_use]
    pub fn i32_or(&self, key: &str, default: i32) -> i32 {
        self.parsed_or(key, default)
    }

    /// `i64` property with a default.
    #[must_use]
    pub fn i64_or(&self, key: &str, default: i64) -> i64 {
        self.parsed_or(key, default)
    }

    /// Size property with a default, accepting `k`/`m`/`g` suffixes.
    #[must_use]
    pub fn size_or(&self, key: &str, default: u64) -> u64 {
        self.get(key).map_or(default, |value| {
            replog_util::parse_size(value).unwrap_or_else(|| {
                warn!(key, value, "unparseable size property, using default");
                default
            })
        })
    }

    fn parsed_or<T: std::str::FromStr + Copy>(&self, key: &str, default: T) -> T {
        self.get(key).map_or(default, |value| {
            value.parse().unwrap_or_else(|_| {
                warn!(key, value, "unparseable property, using default");
                default
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn later_files_replace_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_file(dir.path(), "a.properties", "x=1\ny=1\n");
        let second = write_file(dir.path(), "b.properties", "y=2\n");

        let properties = Properties::load(&[first, second]).unwrap();
        assert_eq!(properties.get("x"), Some("1"));
        assert_eq!(properties.get("y"), Some("2"));
    }

    #[test]
    fn file_values_win_over_environment() {
        // SAFETY: test-only mutation of this process's environment.
        unsafe { std::env::set_var("REPLOG_TEST_PRECEDENCE", "from-env") };

        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "c.properties", "replog.test.precedence=from-file\n");

        let properties = Properties::load(&[file]).unwrap();
        assert_eq!(properties.get("replog.test.precedence"), Some("from-file"));

        let ambient = Properties::load(&[]).unwrap();
        assert_eq!(ambient.get("replog.test.precedence"), Some("from-env"));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "d.properties", "# comment\n\nkey = value\n");

        let properties = Properties::load(&[file]).unwrap();
        assert_eq!(properties.get("key"), Some("value"));
    }

    #[test]
    fn malformed_lines_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "e.properties", "not-a-pair\n");

        assert!(Properties::load(&[file]).is_err());
    }

    #[test]
    fn sizes_parse_with_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "f.properties", "replog.cluster.snapshot.size=64k\n");

        let properties = Properties::load(&[file]).unwrap();
        assert_eq!(
            properties.size_or(SNAPSHOT_SIZE_PROP_NAME, DEFAULT_SNAPSHOT_SIZE),
            64 * 1024
        );
        assert_eq!(
            properties.size_or("replog.absent", DEFAULT_SNAPSHOT_SIZE),
            DEFAULT_SNAPSHOT_SIZE
        );
    }
}
