//! Snapshot discovery, loading and the daily update protocol.
//!
//! The data directory holds exactly one snapshot at a time. A daily update
//! builds the replacement fully off to the side: re-fetch the geographical
//! table in full, re-fetch the temporal tail, write the new dated file, and
//! only then delete the previous one. A failed write removes the partial
//! file and leaves the old snapshot authoritative; a failed deletion of the
//! old file is logged and tolerated, the new snapshot stays authoritative.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use tracing::{error, info, warn};
use vigia_common::{Result, VigiaError};
use vigia_core::{
    DataQuery, DataTable, Dispatcher, ErrorPolicy, ItemSelection, Language, RegionSelection,
};

use crate::snapshot::{parse_snapshot_filename, snapshot_filename, Snapshot};

/// How many days before the last cached date the temporal re-fetch starts,
/// to pick up late revisions of recent days.
const UPDATE_LAG_DAYS: i64 = 5;

/// The loaded cache: both tables plus the file they came from.
#[derive(Debug, Clone)]
pub struct CacheState {
    pub temporal: DataTable,
    pub geographical: DataTable,
    pub path: PathBuf,
}

/// Result of a daily update that did not fail.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// Today's snapshot already existed; nothing was touched.
    UpToDate,
    /// A new snapshot was written and is now authoritative.
    Updated(CacheState),
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    data_dir: PathBuf,
}

impl CacheStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        CacheStore { data_dir: data_dir.into() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The single snapshot file in the data directory. Zero or several
    /// matches fail with `NotFound`.
    pub fn discover(&self) -> Result<PathBuf> {
        let mut matches = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(name) = name.to_str() {
                if parse_snapshot_filename(name).is_some() {
                    matches.push(entry.path());
                }
            }
        }
        match matches.len() {
            1 => Ok(matches.remove(0)),
            0 => Err(VigiaError::NotFound(format!(
                "no snapshot file in {}",
                self.data_dir.display()
            ))),
            _ => {
                matches.sort();
                Err(VigiaError::NotFound(format!(
                    "ambiguous snapshots in {}: {}",
                    self.data_dir.display(),
                    matches
                        .iter()
                        .filter_map(|p| p.file_name()?.to_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )))
            }
        }
    }

    /// Load a snapshot, discovering the file when no path is given.
    pub fn load(&self, path: Option<&Path>) -> Result<CacheState> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => self.discover()?,
        };
        let snapshot = Snapshot::read(&path)?;
        info!(path = %path.display(), "snapshot loaded");
        Ok(CacheState {
            temporal: snapshot.temporal,
            geographical: snapshot.geographical,
            path,
        })
    }

    /// Run the daily update. Never propagates: failures are logged and
    /// reported as `None`, leaving `current` authoritative.
    pub async fn daily_update(
        &self,
        dispatcher: &Dispatcher,
        current: &CacheState,
    ) -> Option<UpdateOutcome> {
        let today = Local::now().date_naive();
        match self.try_daily_update(dispatcher, current, today).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(error = %e, "daily update failed, previous snapshot stays authoritative");
                None
            }
        }
    }

    async fn try_daily_update(
        &self,
        dispatcher: &Dispatcher,
        current: &CacheState,
        today: NaiveDate,
    ) -> Result<UpdateOutcome> {
        let new_path = self.data_dir.join(snapshot_filename(today));
        if new_path.exists() {
            info!(path = %new_path.display(), "daily update skipped, cache is up to date");
            return Ok(UpdateOutcome::UpToDate);
        }

        let geographical = self.refetch_geographical(dispatcher).await?;
        let temporal = self.refetch_temporal(dispatcher, current, today).await?;

        let snapshot = Snapshot {
            temporal: temporal.clone(),
            geographical: geographical.clone(),
        };
        if let Err(e) = snapshot.write(&new_path) {
            if new_path.exists() {
                if let Err(cleanup) = std::fs::remove_file(&new_path) {
                    warn!(error = %cleanup, "could not remove partial snapshot");
                }
            }
            return Err(e);
        }

        // sole sanctioned inconsistency: both files exist until this delete
        if current.path != new_path && current.path.exists() {
            if let Err(e) = std::fs::remove_file(&current.path) {
                warn!(
                    path = %current.path.display(),
                    error = %e,
                    "could not delete previous snapshot; the new one is authoritative"
                );
            }
        }

        info!(path = %new_path.display(), "daily update done");
        Ok(UpdateOutcome::Updated(CacheState {
            temporal,
            geographical,
            path: new_path,
        }))
    }

    /// The full geographical table, strictly.
    async fn refetch_geographical(&self, dispatcher: &Dispatcher) -> Result<DataTable> {
        let query = DataQuery {
            items: ItemSelection::All,
            regions: RegionSelection::Country,
            start_date: None,
            end_date: None,
            language: Language::Internal,
            error_policy: ErrorPolicy::Raise,
        };
        dispatcher.query(&query).await?.ok_or_else(|| {
            VigiaError::NotFound("geographical re-fetch produced no data".into())
        })
    }

    /// The temporal tail from `last cached date - lag` through today,
    /// upserted over the current table with the newest row winning.
    async fn refetch_temporal(
        &self,
        dispatcher: &Dispatcher,
        current: &CacheState,
        today: NaiveDate,
    ) -> Result<DataTable> {
        let last_date = current.temporal.last_date().ok_or_else(|| {
            VigiaError::CorruptData("cached temporal table has no date index".into())
        })?;
        let start = last_date - chrono::Duration::days(UPDATE_LAG_DAYS);

        let query = DataQuery {
            items: ItemSelection::All,
            regions: RegionSelection::Country,
            start_date: Some(start),
            end_date: Some(today),
            language: Language::Internal,
            error_policy: ErrorPolicy::Raise,
        };
        let fresh = dispatcher.query(&query).await?.ok_or_else(|| {
            VigiaError::NotFound("temporal re-fetch produced no data".into())
        })?;

        let mut temporal = current.temporal.clone();
        temporal.upsert_rows(fresh);
        Ok(temporal)
    }
}
