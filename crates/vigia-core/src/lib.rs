//! Aggregation pipeline for heterogeneous regional open-data sources.
//!
//! Five external providers (meteorological, epidemiological, mobility,
//! mortality surveillance, statistical) are normalized into two canonical
//! wide tables: a temporal one indexed by calendar date and a geographical
//! one indexed by region. The [`dispatcher::Dispatcher`] is the entry point
//! for one-shot queries; snapshot persistence and serving live in the
//! server crate.

pub mod config;
pub mod dispatcher;
pub mod fetch;
pub mod regions;
pub mod sources;
pub mod table;
pub mod types;
pub mod window;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::ConfigStore;
pub use dispatcher::{DataQuery, Dispatcher, ItemSelection, RegionSelection};
pub use fetch::{FetchEngine, FetchPolicy};
pub use regions::{RegionDirectory, RegionKind};
pub use table::{CellValue, ColumnKey, DataTable, ItemLabel, RowKey};
pub use types::{Classification, ErrorPolicy, Language, SourceId};
