//! Source adapters: one module per external data provider.
//!
//! Each adapter turns the provider's native payloads into the canonical
//! table shape. The set of providers is closed, so dispatch goes through the
//! [`SourceAdapter`] enum rather than trait objects; routing from item to
//! provider is the registry the configuration store builds at load.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use vigia_common::{Result, VigiaError};

use crate::config::ConfigStore;
use crate::fetch::{Handled, Payload};
use crate::regions::RegionDirectory;
use crate::table::{CellValue, ColumnKey, DataTable, RowKey};
use crate::types::SourceId;

mod aemet;
mod covid;
mod ine;
mod mobility;
mod momo;

pub use aemet::AemetAdapter;
pub use covid::CovidAdapter;
pub use ine::IneAdapter;
pub use mobility::MobilityAdapter;
pub use momo::MoMoAdapter;

// ============================================================================
// Adapter context
// ============================================================================

/// Everything an adapter needs for one invocation: the slice of the query
/// owned by its source, plus shared read-only services.
#[derive(Debug, Clone)]
pub struct AdapterContext {
    /// Internal item names, all owned by this adapter's source.
    pub items: Vec<String>,
    /// Internal region names.
    pub regions: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Country code, e.g. "ES".
    pub country: String,
    pub config: Arc<ConfigStore>,
    pub directory: RegionDirectory,
}

impl AdapterContext {
    /// The internal name of the whole-country aggregate region, when the
    /// country itself was requested as a region.
    pub fn requested_country_region(&self) -> Result<Option<String>> {
        let name = &self.config.country(&self.country)?.name;
        Ok(self.regions.iter().find(|r| *r == name).cloned())
    }

    /// Requested regions minus the whole-country aggregate.
    pub fn requested_sub_regions(&self) -> Result<Vec<String>> {
        let name = &self.config.country(&self.country)?.name;
        Ok(self.regions.iter().filter(|r| *r != name).cloned().collect())
    }
}

// ============================================================================
// The closed adapter union
// ============================================================================

/// One invocation of one source. Construction resolves everything that can
/// fail on configuration; the fetch engine then drives `build_urls`,
/// `handle_response` and `reshape`.
#[derive(Debug)]
pub enum SourceAdapter {
    Aemet(AemetAdapter),
    Covid19(CovidAdapter),
    Mobility(MobilityAdapter),
    MoMo(MoMoAdapter),
    Ine(IneAdapter),
}

impl SourceAdapter {
    pub fn new(source: SourceId, ctx: AdapterContext) -> Result<Self> {
        match source {
            SourceId::Aemet => Ok(SourceAdapter::Aemet(AemetAdapter::new(ctx)?)),
            SourceId::Covid19 => Ok(SourceAdapter::Covid19(CovidAdapter::new(ctx)?)),
            SourceId::Mobility => Ok(SourceAdapter::Mobility(MobilityAdapter::new(ctx)?)),
            SourceId::MoMo => Ok(SourceAdapter::MoMo(MoMoAdapter::new(ctx)?)),
            SourceId::Ine => Ok(SourceAdapter::Ine(IneAdapter::new(ctx)?)),
        }
    }

    pub fn source(&self) -> SourceId {
        match self {
            SourceAdapter::Aemet(_) => SourceId::Aemet,
            SourceAdapter::Covid19(_) => SourceId::Covid19,
            SourceAdapter::Mobility(_) => SourceId::Mobility,
            SourceAdapter::MoMo(_) => SourceId::MoMo,
            SourceAdapter::Ine(_) => SourceId::Ine,
        }
    }

    /// Baseline courtesy delay before each request of this source.
    pub fn initial_delay(&self) -> Duration {
        match self {
            SourceAdapter::Aemet(a) => a.initial_delay(),
            _ => Duration::ZERO,
        }
    }

    /// Extra query parameters attached to every request.
    pub fn query_parameters(&self) -> Vec<(String, String)> {
        match self {
            SourceAdapter::Aemet(a) => a.query_parameters(),
            _ => Vec::new(),
        }
    }

    /// The request plan: one entry per URL, in issue order.
    pub fn build_urls(&mut self) -> Result<Vec<String>> {
        match self {
            SourceAdapter::Aemet(a) => a.build_urls(),
            SourceAdapter::Covid19(a) => a.build_urls(),
            SourceAdapter::Mobility(a) => a.build_urls(),
            SourceAdapter::MoMo(a) => a.build_urls(),
            SourceAdapter::Ine(a) => a.build_urls(),
        }
    }

    /// Format-specific unwrap of one response body, including any dependent
    /// request the provider's envelope demands.
    pub async fn handle_response(&self, body: &str, client: &Client) -> Result<Handled> {
        match self {
            SourceAdapter::Aemet(a) => a.handle_response(body, client).await,
            SourceAdapter::Covid19(a) => a.handle_response(body),
            SourceAdapter::Mobility(a) => a.handle_response(body),
            SourceAdapter::MoMo(a) => a.handle_response(body),
            SourceAdapter::Ine(a) => a.handle_response(body),
        }
    }

    /// Reshape one payload into a partial table. `seq` is the position of
    /// the source URL in the plan returned by `build_urls`.
    pub fn reshape(&self, payload: Payload, seq: usize) -> Result<DataTable> {
        match self {
            SourceAdapter::Aemet(a) => a.reshape(payload, seq),
            SourceAdapter::Covid19(a) => a.reshape(payload, seq),
            SourceAdapter::Mobility(a) => a.reshape(payload, seq),
            SourceAdapter::MoMo(a) => a.reshape(payload, seq),
            SourceAdapter::Ine(a) => a.reshape(payload, seq),
        }
    }
}

// ============================================================================
// Shared parsing helpers
// ============================================================================

/// Normalize a raw province/community code to the canonical two-digit form.
/// Sources variously emit `1`, `01`, `1.0`.
pub(crate) fn ine_code(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: f64 = trimmed.parse().ok()?;
    if value < 0.0 {
        return None;
    }
    Some(format!("{:02}", value as i64))
}

/// Parse a number that may use a comma as the decimal separator.
pub(crate) fn parse_decimal_comma(raw: &str) -> Option<f64> {
    raw.trim().replace(',', ".").parse().ok()
}

/// Accumulates observations per `(row, column)` and resolves duplicates by
/// mean, the way sources with many-to-one region encodings are aggregated.
#[derive(Debug)]
pub(crate) struct PivotAccumulator {
    classification: crate::types::Classification,
    cells: BTreeMap<(ColumnKey, RowKey), (f64, u32)>,
}

impl PivotAccumulator {
    pub(crate) fn new(classification: crate::types::Classification) -> Self {
        PivotAccumulator { classification, cells: BTreeMap::new() }
    }

    pub(crate) fn add(&mut self, row: RowKey, column: ColumnKey, value: f64) {
        let entry = self.cells.entry((column, row)).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    pub(crate) fn finish(self) -> DataTable {
        let mut table = DataTable::new(self.classification);
        for ((column, row), (sum, count)) in self.cells {
            table.set(row, column, CellValue::Number(sum / count as f64));
        }
        table
    }
}

/// The `field` catalog entry of an item, required by most adapters.
pub(crate) fn item_field(ctx: &AdapterContext, source: SourceId, item: &str) -> Result<String> {
    ctx.config
        .catalog(source)?
        .get(item)
        .and_then(|info| info.field.clone())
        .ok_or_else(|| {
            VigiaError::Config(format!("item '{}' of {} has no source field", item, source))
        })
}
