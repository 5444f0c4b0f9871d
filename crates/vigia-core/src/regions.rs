//! Region metadata lookups.
//!
//! Regions are identified everywhere by their internal name; each source
//! keys its rows by a source-specific representation (ISO code, statistics
//! office code, station list, English spelling). The directory translates
//! between the two.

use std::collections::BTreeMap;
use std::sync::Arc;

use vigia_common::{Result, VigiaError};

use crate::config::{ConfigStore, Representation};

/// Aggregate regions are flagged by a naming convention on the internal
/// identifier (carried over from the region configuration files).
const AGGREGATE_PREFIX: &str = "CA ";

/// Region hierarchy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// An aggregate region grouping several sub-regions.
    Aggregate,
    /// A leaf sub-region.
    SubRegion,
}

/// Read-only view over the loaded region configuration.
#[derive(Debug, Clone)]
pub struct RegionDirectory {
    config: Arc<ConfigStore>,
}

impl RegionDirectory {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        RegionDirectory { config }
    }

    /// All region internal names of a country, in a stable order.
    pub fn list_regions(&self, country: &str) -> Result<Vec<String>> {
        Ok(self.config.region_records(country)?.keys().cloned().collect())
    }

    /// Regions of one hierarchy level.
    pub fn list_regions_by_kind(&self, kind: RegionKind, country: &str) -> Result<Vec<String>> {
        Ok(self
            .config
            .region_records(country)?
            .keys()
            .filter(|name| match kind {
                RegionKind::Aggregate => name.starts_with(AGGREGATE_PREFIX),
                RegionKind::SubRegion => !name.starts_with(AGGREGATE_PREFIX),
            })
            .cloned()
            .collect())
    }

    /// Population per region.
    pub fn population(&self, country: &str) -> Result<BTreeMap<String, u64>> {
        Ok(self
            .config
            .region_records(country)?
            .iter()
            .map(|(name, record)| (name.clone(), record.population))
            .collect())
    }

    /// Translate regions to a source-specific representation, preserving
    /// input order.
    ///
    /// Fails with `Validation` when the representation name is not declared
    /// for the country or when any region is unknown to it.
    pub fn resolve_representation(
        &self,
        regions: &[String],
        representation: &str,
        country: &str,
    ) -> Result<Vec<Representation>> {
        let info = self.config.country(country)?;
        if !info.representations.iter().any(|r| r == representation) {
            return Err(VigiaError::Validation(format!(
                "representation '{}' not recognized for country {}",
                representation, country
            )));
        }

        let records = self.config.region_records(country)?;
        let unknown: Vec<&str> = regions
            .iter()
            .filter(|r| !records.contains_key(*r))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(VigiaError::Validation(format!(
                "regions not implemented for country {}: {}",
                country,
                unknown.join(", ")
            )));
        }

        regions
            .iter()
            .map(|region| {
                records[region]
                    .representations
                    .get(representation)
                    .cloned()
                    .ok_or_else(|| {
                        VigiaError::Validation(format!(
                            "region '{}' has no '{}' representation",
                            region, representation
                        ))
                    })
            })
            .collect()
    }

    /// Translate to single-text representations, failing if any value is a
    /// list. Convenience for the sources keyed by scalar codes.
    pub fn resolve_codes(
        &self,
        regions: &[String],
        representation: &str,
        country: &str,
    ) -> Result<Vec<String>> {
        self.resolve_representation(regions, representation, country)?
            .into_iter()
            .zip(regions)
            .map(|(value, region)| {
                value.as_text().map(str::to_string).ok_or_else(|| {
                    VigiaError::Config(format!(
                        "representation '{}' of region '{}' is not a single code",
                        representation, region
                    ))
                })
            })
            .collect()
    }
}
