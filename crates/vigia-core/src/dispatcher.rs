//! Query routing: from a logical query to the merged canonical table.
//!
//! The dispatcher resolves display names to internal identifiers, groups the
//! requested items by owning source, drives one adapter per source through
//! the fetch engine, merges the partial tables and translates the result
//! back to the caller's language. Sources run sequentially; under the
//! tolerant error policy a failing source is logged and dropped, under the
//! strict policy its error aborts the whole query.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{info, warn};
use vigia_common::{Result, VigiaError};

use crate::config::ConfigStore;
use crate::fetch::FetchEngine;
use crate::regions::RegionDirectory;
use crate::sources::{AdapterContext, SourceAdapter};
use crate::table::DataTable;
use crate::types::{Classification, ErrorPolicy, Language, SourceId};

/// Which items a query covers.
#[derive(Debug, Clone, Default)]
pub enum ItemSelection {
    /// Every item of the inferred classification, across all sources.
    #[default]
    All,
    Names(Vec<String>),
}

/// Which regions a query covers.
#[derive(Debug, Clone, Default)]
pub enum RegionSelection {
    /// Every region of the dispatcher's country.
    #[default]
    Country,
    Names(Vec<String>),
}

/// One logical query.
///
/// Classification is inferred from the dates: both present means temporal,
/// either absent means geographical.
#[derive(Debug, Clone, Default)]
pub struct DataQuery {
    pub items: ItemSelection,
    pub regions: RegionSelection,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub language: Language,
    pub error_policy: ErrorPolicy,
}

pub struct Dispatcher {
    config: Arc<ConfigStore>,
    directory: RegionDirectory,
    engine: FetchEngine,
    country: String,
}

impl Dispatcher {
    pub fn new(config: Arc<ConfigStore>) -> Result<Self> {
        let engine = FetchEngine::new()?;
        Ok(Self::with_engine(config, engine))
    }

    /// Dispatcher with a custom-tuned fetch engine.
    pub fn with_engine(config: Arc<ConfigStore>, engine: FetchEngine) -> Self {
        let directory = RegionDirectory::new(config.clone());
        Dispatcher { config, directory, engine, country: "ES".to_string() }
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn directory(&self) -> &RegionDirectory {
        &self.directory
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    /// The implemented classifications, as the public surface names them.
    pub fn get_data_types(&self) -> Vec<&'static str> {
        Classification::ALL.iter().map(Classification::as_str).collect()
    }

    /// Map display names to `internal name -> display name`, for the given
    /// classification. The internal language is the identity mapping.
    /// Unresolved names are logged and omitted, never an error.
    pub fn resolve_items(
        &self,
        classification: Classification,
        names: &[String],
        language: Language,
    ) -> Result<BTreeMap<String, String>> {
        let mut mapping = BTreeMap::new();
        for name in names {
            match self.lookup_item(classification, name, language)? {
                Some(internal) => {
                    mapping.insert(internal, name.clone());
                }
                None => {
                    warn!(item = %name, %classification, "requested item not found in any catalog");
                }
            }
        }
        Ok(mapping)
    }

    fn lookup_item(
        &self,
        classification: Classification,
        name: &str,
        language: Language,
    ) -> Result<Option<String>> {
        for source in self.config.sources() {
            if self.config.manifest(source)?.classification != classification {
                continue;
            }
            for (internal, info) in self.config.catalog(source)? {
                let matches = match language {
                    Language::Internal => internal == name,
                    _ => info.display_name.get(language) == Some(name),
                };
                if matches {
                    return Ok(Some(internal.clone()));
                }
            }
        }
        Ok(None)
    }

    /// Resolve an item selection to `internal name -> display name`.
    pub fn resolve_selection(
        &self,
        classification: Classification,
        selection: &ItemSelection,
        language: Language,
    ) -> Result<BTreeMap<String, String>> {
        match selection {
            ItemSelection::Names(names) => self.resolve_items(classification, names, language),
            ItemSelection::All => self.all_items(classification, language),
        }
    }

    /// Run one query end to end. `Ok(None)` means no data was available (or,
    /// under the tolerant policy, that validation failed).
    pub async fn query(&self, query: &DataQuery) -> Result<Option<DataTable>> {
        let classification = match (query.start_date, query.end_date) {
            (Some(_), Some(_)) => Classification::Temporal,
            _ => Classification::Geographical,
        };

        if classification == Classification::Temporal {
            if let Err(e) = validate_dates(query.start_date, query.end_date) {
                return match query.error_policy {
                    ErrorPolicy::Raise => Err(e),
                    ErrorPolicy::Ignore => {
                        warn!(error = %e, "query rejected");
                        Ok(None)
                    }
                };
            }
        }

        let regions = match &query.regions {
            RegionSelection::Country => self.directory.list_regions(&self.country)?,
            RegionSelection::Names(names) => names.clone(),
        };

        let mapping = self.resolve_selection(classification, &query.items, query.language)?;
        if mapping.is_empty() {
            warn!(%classification, "no requested item resolved to a known internal name");
            return Ok(None);
        }

        let mut by_source: BTreeMap<SourceId, Vec<String>> = BTreeMap::new();
        for internal in mapping.keys() {
            match self.config.source_of(internal) {
                Some(source) => by_source.entry(source).or_default().push(internal.clone()),
                None => warn!(item = %internal, "item has no owning source"),
            }
        }

        let mut merged: Option<DataTable> = None;
        for (source, items) in by_source {
            match self.fetch_source(source, items, &regions, query).await {
                Ok(Some(mut partial)) => {
                    if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
                        partial.reindex_dates(start, end);
                    }
                    merged = match merged {
                        None => Some(partial),
                        Some(mut acc) => {
                            acc.merge(partial)?;
                            Some(acc)
                        }
                    };
                }
                Ok(None) => {
                    info!(%source, "source returned no data");
                }
                Err(e) => match query.error_policy {
                    ErrorPolicy::Raise => return Err(e),
                    ErrorPolicy::Ignore => {
                        warn!(%source, error = %e, "source failed, dropping it");
                    }
                },
            }
        }

        let Some(mut table) = merged else {
            warn!("no source produced data for the query");
            return Ok(None);
        };

        table.rename_items(&mapping);
        table.retain_regions(&regions);
        if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
            table.retain_dates(start, end);
        }

        if table.is_empty() {
            warn!("no data survived region and date filtering");
            return Ok(None);
        }
        Ok(Some(table))
    }

    async fn fetch_source(
        &self,
        source: SourceId,
        items: Vec<String>,
        regions: &[String],
        query: &DataQuery,
    ) -> Result<Option<DataTable>> {
        let ctx = AdapterContext {
            items,
            regions: regions.to_vec(),
            start_date: query.start_date,
            end_date: query.end_date,
            country: self.country.clone(),
            config: self.config.clone(),
            directory: self.directory.clone(),
        };
        let mut adapter = SourceAdapter::new(source, ctx)?;
        self.engine.run(&mut adapter).await
    }

    /// Every item of a classification, mapped to its display name.
    fn all_items(
        &self,
        classification: Classification,
        language: Language,
    ) -> Result<BTreeMap<String, String>> {
        let mut mapping = BTreeMap::new();
        for source in self.sources_of(classification)? {
            for (internal, info) in self.config.catalog(source)? {
                let display = match info.display_name.get(language) {
                    Some(text) => text.to_string(),
                    None => internal.clone(),
                };
                mapping.insert(internal.clone(), display);
            }
        }
        Ok(mapping)
    }

    // ========================================================================
    // Metadata listings
    // ========================================================================

    /// Item display names per source.
    pub fn item_names(
        &self,
        classification: Option<Classification>,
        language: Language,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        self.list_metadata(classification, |internal, info| match language {
            Language::Internal => internal.to_string(),
            _ => info
                .display_name
                .get(language)
                .unwrap_or(internal)
                .to_string(),
        })
    }

    /// Item descriptions per source. The internal language falls back to
    /// Spanish, the catalog's primary text.
    pub fn item_descriptions(
        &self,
        classification: Option<Classification>,
        language: Language,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        self.list_metadata(classification, |_, info| {
            info.description
                .get(language)
                .unwrap_or(&info.description.es)
                .to_string()
        })
    }

    /// Item units per source, with the same fallback as descriptions.
    pub fn item_units(
        &self,
        classification: Option<Classification>,
        language: Language,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        self.list_metadata(classification, |_, info| {
            info.data_unit.get(language).unwrap_or(&info.data_unit.es).to_string()
        })
    }

    fn list_metadata<F>(
        &self,
        classification: Option<Classification>,
        field: F,
    ) -> Result<BTreeMap<String, Vec<String>>>
    where
        F: Fn(&str, &crate::config::ItemInfo) -> String,
    {
        let mut out = BTreeMap::new();
        for source in self.config.sources() {
            if let Some(wanted) = classification {
                if self.config.manifest(source)?.classification != wanted {
                    continue;
                }
            }
            let values = self
                .config
                .catalog(source)?
                .iter()
                .map(|(internal, info)| field(internal, info))
                .collect();
            out.insert(source.as_str().to_string(), values);
        }
        Ok(out)
    }

    fn sources_of(&self, classification: Classification) -> Result<Vec<SourceId>> {
        let mut sources = Vec::new();
        for source in self.config.sources() {
            if self.config.manifest(source)?.classification == classification {
                sources.push(source);
            }
        }
        Ok(sources)
    }
}

/// Reject inverted ranges and end dates in the future.
pub fn validate_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
    let (Some(start), Some(end)) = (start, end) else {
        return Ok(());
    };
    if start > end {
        return Err(VigiaError::Validation(format!(
            "start_date {} is after end_date {}",
            start, end
        )));
    }
    let today = Local::now().date_naive();
    if end > today {
        return Err(VigiaError::Validation(format!(
            "end_date {} refers to the future",
            end
        )));
    }
    Ok(())
}
