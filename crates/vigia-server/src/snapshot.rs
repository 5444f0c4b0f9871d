//! Dated snapshot files: both canonical tables in one binary file.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use vigia_common::{Result, VigiaError};
use vigia_core::DataTable;

pub const SNAPSHOT_PREFIX: &str = "cache_";
pub const SNAPSHOT_EXTENSION: &str = "bin";

/// The two canonical tables as of one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub temporal: DataTable,
    pub geographical: DataTable,
}

impl Snapshot {
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                VigiaError::NotFound(format!("snapshot {} does not exist", path.display()))
            }
            _ => VigiaError::Io(e),
        })?;
        bincode::deserialize_from(BufReader::new(file)).map_err(|e| {
            VigiaError::CorruptData(format!("snapshot {} is unreadable: {}", path.display(), e))
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)
            .map_err(|e| VigiaError::Io(std::io::Error::other(e)))
    }
}

/// `cache_YYYY-MM-DD.bin` for a given day.
pub fn snapshot_filename(date: NaiveDate) -> String {
    format!("{}{}.{}", SNAPSHOT_PREFIX, date.format("%Y-%m-%d"), SNAPSHOT_EXTENSION)
}

/// The day encoded in a snapshot filename, if it is one.
pub fn parse_snapshot_filename(name: &str) -> Option<NaiveDate> {
    let stem = name
        .strip_prefix(SNAPSHOT_PREFIX)?
        .strip_suffix(&format!(".{}", SNAPSHOT_EXTENSION))?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}
