//! In-memory serving of the cached tables.
//!
//! Queries are answered from the loaded snapshot without touching the
//! network: the same name resolution and validation as the dispatcher, but
//! filtering the cached tables instead of fetching. Readers share the state
//! concurrently; the daily update builds its replacement off to the side
//! and swaps it in under the write lock.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::warn;
use vigia_common::Result;
use vigia_core::dispatcher::validate_dates;
use vigia_core::{
    Classification, ConfigStore, DataQuery, DataTable, Dispatcher, ErrorPolicy, RegionSelection,
};

use crate::cache::{CacheState, CacheStore, UpdateOutcome};

pub struct DataService {
    dispatcher: Dispatcher,
    store: CacheStore,
    state: RwLock<CacheState>,
}

impl DataService {
    /// Load the snapshot from the data directory and start serving it.
    pub fn open(config: Arc<ConfigStore>, data_dir: impl Into<PathBuf>) -> Result<Self> {
        let dispatcher = Dispatcher::new(config)?;
        Self::with_dispatcher(dispatcher, data_dir)
    }

    /// Same as [`DataService::open`] with a caller-built dispatcher.
    pub fn with_dispatcher(dispatcher: Dispatcher, data_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = CacheStore::new(data_dir);
        let state = store.load(None)?;
        Ok(DataService { dispatcher, store, state: RwLock::new(state) })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The file currently being served.
    pub async fn snapshot_path(&self) -> PathBuf {
        self.state.read().await.path.clone()
    }

    /// Answer a query from the cached tables. `Ok(None)` means no data (or
    /// a rejected query under the tolerant policy).
    pub async fn get_data_items(&self, query: &DataQuery) -> Result<Option<DataTable>> {
        let classification = match (query.start_date, query.end_date) {
            (Some(_), Some(_)) => Classification::Temporal,
            _ => Classification::Geographical,
        };

        if classification == Classification::Temporal {
            if let Err(e) = validate_dates(query.start_date, query.end_date) {
                return match query.error_policy {
                    ErrorPolicy::Raise => Err(e),
                    ErrorPolicy::Ignore => {
                        warn!(error = %e, "cached query rejected");
                        Ok(None)
                    }
                };
            }
        }

        let mapping =
            self.dispatcher
                .resolve_selection(classification, &query.items, query.language)?;
        if mapping.is_empty() {
            warn!(%classification, "no requested item resolved to a known internal name");
            return Ok(None);
        }
        let internal_names: BTreeSet<String> = mapping.keys().cloned().collect();

        let regions = match &query.regions {
            RegionSelection::Country => self
                .dispatcher
                .directory()
                .list_regions(self.dispatcher.country())?,
            RegionSelection::Names(names) => names.clone(),
        };

        let state = self.state.read().await;
        let mut table = match classification {
            Classification::Temporal => state.temporal.clone(),
            Classification::Geographical => state.geographical.clone(),
        };
        drop(state);

        table.retain_item_names(&internal_names);
        table.retain_regions(&regions);
        if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
            table.retain_dates(start, end);
        }
        table.rename_items(&mapping);

        if table.is_empty() {
            warn!("no cached data matches the query");
            return Ok(None);
        }
        Ok(Some(table))
    }

    /// First day of the cached temporal index.
    pub async fn min_date(&self) -> Option<NaiveDate> {
        self.state.read().await.temporal.first_date()
    }

    /// Last day of the cached temporal index.
    pub async fn max_date(&self) -> Option<NaiveDate> {
        self.state.read().await.temporal.last_date()
    }

    /// Run the daily update and publish the new snapshot. Reports success
    /// as a boolean and never propagates update errors.
    pub async fn update(&self) -> bool {
        let current = self.state.read().await.clone();
        match self.store.daily_update(&self.dispatcher, &current).await {
            Some(UpdateOutcome::UpToDate) => true,
            Some(UpdateOutcome::Updated(new_state)) => {
                let mut state = self.state.write().await;
                *state = new_state;
                true
            }
            None => false,
        }
    }
}
