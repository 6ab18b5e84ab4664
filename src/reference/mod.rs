//! Reference table: immutable `CODE -> REFERENCE` map joined against `AD`.
//!
//! A table is never mutated after load. Replacing it means loading a new
//! instance and swapping it into the [`ReferenceHandle`]; readers holding the
//! previous snapshot keep using it until they drop their `Arc`.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Longest label the asset may carry (VARCHAR(12) in the source schema).
pub const MAX_LABEL_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("cannot read reference asset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: expected 2 tab-separated columns, found {found}")]
    Columns { line: usize, found: usize },
    #[error("line {line}: CODE is not an integer: {value:?}")]
    Code { line: usize, value: String },
    #[error("line {line}: REFERENCE must be 1..=12 chars, got {len}")]
    Label { line: usize, len: usize },
    #[error("line {line}: duplicate CODE {code}")]
    Duplicate { line: usize, code: i64 },
}

#[derive(Debug, Default, Clone)]
pub struct ReferenceTable {
    entries: HashMap<i64, Arc<str>>,
}

impl ReferenceTable {
    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        let file = std::fs::File::open(path).map_err(|source| ReferenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_reader(std::io::BufReader::new(file)).map_err(|e| match e {
            ReferenceError::Io { source, .. } => ReferenceError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        info!(path = %path.display(), entries = table.len(), "reference table loaded");
        Ok(table)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ReferenceError> {
        let mut entries = HashMap::new();
        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|source| ReferenceError::Io {
                path: PathBuf::new(),
                source,
            })?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() != 2 {
                return Err(ReferenceError::Columns {
                    line: line_no,
                    found: cols.len(),
                });
            }
            let code = cols[0]
                .trim()
                .parse::<i64>()
                .map_err(|_| ReferenceError::Code {
                    line: line_no,
                    value: cols[0].to_string(),
                })?;
            let label = cols[1];
            let len = label.chars().count();
            if len == 0 || len > MAX_LABEL_LEN {
                return Err(ReferenceError::Label { line: line_no, len });
            }
            if entries.insert(code, Arc::<str>::from(label)).is_some() {
                return Err(ReferenceError::Duplicate {
                    line: line_no,
                    code,
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<Arc<str>>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }

    pub fn lookup(&self, code: i64) -> Option<&str> {
        self.entries.get(&code).map(|s| s.as_ref())
    }

    /// Like [`lookup`](Self::lookup) but hands out a shared label for records that outlive the snapshot.
    pub fn lookup_shared(&self, code: i64) -> Option<Arc<str>> {
        self.entries.get(&code).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared, atomically swappable pointer to the current table.
#[derive(Debug, Clone)]
pub struct ReferenceHandle {
    current: Arc<ArcSwap<ReferenceTable>>,
}

impl ReferenceHandle {
    pub fn new(table: ReferenceTable) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(table)),
        }
    }

    /// Current table; stays valid for the caller even if a swap happens meanwhile.
    pub fn snapshot(&self) -> Arc<ReferenceTable> {
        self.current.load_full()
    }

    /// Install `table` for subsequent lookups and return the previous one.
    pub fn swap(&self, table: ReferenceTable) -> Arc<ReferenceTable> {
        self.current.swap(Arc::new(table))
    }

    /// Load a replacement asset; the installed table is untouched if loading fails.
    pub fn reload(&self, path: &Path) -> Result<Arc<ReferenceTable>, ReferenceError> {
        let table = ReferenceTable::load(path)?;
        Ok(self.swap(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_column_asset() {
        let t = ReferenceTable::from_reader("0\tNot clicked\n1\tClicked\n\n".as_bytes()).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.lookup(0), Some("Not clicked"));
        assert_eq!(t.lookup(1), Some("Clicked"));
        assert_eq!(t.lookup(2), None);
    }

    #[test]
    fn rejects_malformed_assets() {
        assert!(matches!(
            ReferenceTable::from_reader("0\ta\tb\n".as_bytes()),
            Err(ReferenceError::Columns { line: 1, found: 3 })
        ));
        assert!(matches!(
            ReferenceTable::from_reader("0\tok\nx\tbad\n".as_bytes()),
            Err(ReferenceError::Code { line: 2, .. })
        ));
        assert!(matches!(
            ReferenceTable::from_reader("0\tthirteen chars\n".as_bytes()),
            Err(ReferenceError::Label { line: 1, len: 14 })
        ));
        assert!(matches!(
            ReferenceTable::from_reader("0\ta\n0\tb\n".as_bytes()),
            Err(ReferenceError::Duplicate { line: 2, code: 0 })
        ));
    }

    #[test]
    fn missing_asset_is_io_error() {
        let err = ReferenceTable::load(Path::new("does/not/exist.tsv")).unwrap_err();
        assert!(matches!(err, ReferenceError::Io { .. }));
    }

    #[test]
    fn swap_keeps_old_snapshot_alive() {
        let handle = ReferenceHandle::new(ReferenceTable::from_entries([(7, "X")]));
        let before = handle.snapshot();
        let previous = handle.swap(ReferenceTable::from_entries([(7, "Y")]));
        assert_eq!(before.lookup(7), Some("X"));
        assert_eq!(previous.lookup(7), Some("X"));
        assert_eq!(handle.snapshot().lookup(7), Some("Y"));
    }

    #[test]
    fn failed_reload_keeps_current_table() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.tsv");
        std::fs::write(&bad, "1\n").unwrap();
        let handle = ReferenceHandle::new(ReferenceTable::from_entries([(1, "Clicked")]));
        assert!(handle.reload(&bad).is_err());
        assert_eq!(handle.snapshot().lookup(1), Some("Clicked"));

        let good = dir.path().join("good.tsv");
        std::fs::write(&good, "1\tYes\n").unwrap();
        handle.reload(&good).unwrap();
        assert_eq!(handle.snapshot().lookup(1), Some("Yes"));
    }
}
