//! Configuration store: source manifests, item catalogs and region records.
//!
//! Everything is loaded once at process start with [`ConfigStore::load`] and
//! shared behind an `Arc`; components never reload configuration mid-query,
//! so every caller sees one consistent snapshot. The item→source registry is
//! built here as well, replacing any per-query source scanning.
//!
//! Expected directory layout:
//!
//! ```text
//! config/
//! ├── data-sources-config.json      per-source manifests
//! ├── countries.json                country registry
//! ├── ES-regions.json               region records (one file per country)
//! └── data_sources/
//!     ├── AEMET-config.json         item catalogs, one per source
//!     └── ...
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use vigia_common::{Result, VigiaError};

use crate::types::{Classification, DataFormat, Language, SourceId};

/// A text field available in every supported language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translated {
    #[serde(rename = "EN")]
    pub en: String,
    #[serde(rename = "ES")]
    pub es: String,
}

impl Translated {
    /// The text for a display language. `Internal` has no translation here;
    /// callers use the catalog key instead.
    pub fn get(&self, language: Language) -> Option<&str> {
        match language {
            Language::En => Some(&self.en),
            Language::Es => Some(&self.es),
            Language::Internal => None,
        }
    }
}

/// Query coordinates for the statistical institute API: function code,
/// dataset code and how many most-recent periods to request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IneQuery {
    pub function: String,
    pub dataset: String,
    pub recent: u32,
}

/// Catalog entry for one data item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub display_name: Translated,
    pub description: Translated,
    pub data_unit: Translated,

    /// URL-family tag for sources that serve items from more than one
    /// endpoint family (e.g. "new_series").
    #[serde(default)]
    pub family: Option<String>,

    /// Source-native column or file-name token for this item.
    #[serde(default)]
    pub field: Option<String>,

    /// Provider tag for multi-provider sources (e.g. "Google", "Apple").
    #[serde(default)]
    pub provider: Option<String>,

    /// Statistical-institute query coordinates.
    #[serde(default)]
    pub ine: Option<IneQuery>,
}

/// Per-source manifest from `data-sources-config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceManifest {
    pub format: DataFormat,
    pub classification: Classification,
    /// Which region representation this source keys its rows by.
    pub region_representation: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Named endpoint URL templates.
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

/// One entry of the country registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryInfo {
    pub name: String,
    pub regions_file: String,
    /// Representation keys that region records of this country may carry.
    pub representations: Vec<String>,
}

/// A region representation value: a single code or a list of codes
/// (e.g. the weather-station identifiers of a region).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Representation {
    Text(String),
    List(Vec<String>),
}

impl Representation {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Representation::Text(s) => Some(s),
            Representation::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Vec<&str> {
        match self {
            Representation::Text(s) => vec![s.as_str()],
            Representation::List(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

/// One region record: population plus every representation the sources use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub population: u64,
    #[serde(flatten)]
    pub representations: BTreeMap<String, Representation>,
}

/// The loaded configuration.
#[derive(Debug)]
pub struct ConfigStore {
    manifests: BTreeMap<SourceId, SourceManifest>,
    catalogs: BTreeMap<SourceId, BTreeMap<String, ItemInfo>>,
    /// item internal name -> owning source, built once at load.
    registry: BTreeMap<String, SourceId>,
    countries: BTreeMap<String, CountryInfo>,
    /// country code -> region internal name -> record.
    regions: BTreeMap<String, BTreeMap<String, RegionRecord>>,
}

impl ConfigStore {
    /// Load every configuration file under `dir`.
    ///
    /// Fails with `Config` on any missing or malformed file, and on an item
    /// internal name claimed by more than one source.
    pub fn load(dir: &Path) -> Result<Self> {
        let raw_manifests: BTreeMap<String, SourceManifest> =
            read_json(&dir.join("data-sources-config.json"))?;

        let mut manifests = BTreeMap::new();
        for (name, manifest) in raw_manifests {
            match name.parse::<SourceId>() {
                Ok(source) => {
                    manifests.insert(source, manifest);
                }
                Err(_) => warn!(source = %name, "ignoring manifest for unimplemented source"),
            }
        }

        let mut catalogs = BTreeMap::new();
        let mut registry: BTreeMap<String, SourceId> = BTreeMap::new();
        for source in manifests.keys().copied() {
            let path = dir
                .join("data_sources")
                .join(format!("{}-config.json", source.as_str()));
            let catalog: BTreeMap<String, ItemInfo> = read_json(&path)?;
            for item in catalog.keys() {
                if let Some(previous) = registry.insert(item.clone(), source) {
                    return Err(VigiaError::Config(format!(
                        "item '{}' declared by both {} and {}",
                        item, previous, source
                    )));
                }
            }
            catalogs.insert(source, catalog);
        }

        let countries: BTreeMap<String, CountryInfo> = read_json(&dir.join("countries.json"))?;
        let mut regions = BTreeMap::new();
        for (code, info) in &countries {
            let records: BTreeMap<String, RegionRecord> =
                read_json(&dir.join(&info.regions_file))?;
            regions.insert(code.clone(), records);
        }

        Ok(ConfigStore { manifests, catalogs, registry, countries, regions })
    }

    /// Sources present in the loaded configuration, in a stable order.
    pub fn sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.manifests.keys().copied()
    }

    pub fn manifest(&self, source: SourceId) -> Result<&SourceManifest> {
        self.manifests
            .get(&source)
            .ok_or_else(|| VigiaError::Config(format!("no manifest for source {}", source)))
    }

    pub fn catalog(&self, source: SourceId) -> Result<&BTreeMap<String, ItemInfo>> {
        self.catalogs
            .get(&source)
            .ok_or_else(|| VigiaError::Config(format!("no item catalog for source {}", source)))
    }

    /// The source owning an item internal name, if any.
    pub fn source_of(&self, item: &str) -> Option<SourceId> {
        self.registry.get(item).copied()
    }

    pub fn item_info(&self, item: &str) -> Option<(SourceId, &ItemInfo)> {
        let source = self.source_of(item)?;
        let info = self.catalogs.get(&source)?.get(item)?;
        Some((source, info))
    }

    /// An endpoint URL template of a source.
    pub fn endpoint(&self, source: SourceId, name: &str) -> Result<&str> {
        self.manifest(source)?
            .endpoints
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| {
                VigiaError::Config(format!("source {} has no '{}' endpoint", source, name))
            })
    }

    pub fn country(&self, code: &str) -> Result<&CountryInfo> {
        self.countries
            .get(code)
            .ok_or_else(|| VigiaError::Config(format!("country '{}' not implemented", code)))
    }

    pub fn country_codes(&self) -> Vec<&str> {
        self.countries.keys().map(String::as_str).collect()
    }

    pub fn region_records(&self, country: &str) -> Result<&BTreeMap<String, RegionRecord>> {
        self.country(country)?;
        self.regions
            .get(country)
            .ok_or_else(|| VigiaError::Config(format!("no region records for '{}'", country)))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        VigiaError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&text)
        .map_err(|e| VigiaError::Config(format!("malformed {}: {}", path.display(), e)))
}

/// Convenience for building the expected path of a config directory entry
/// (used by tooling and tests).
pub fn catalog_path(dir: &Path, source: SourceId) -> PathBuf {
    dir.join("data_sources").join(format!("{}-config.json", source.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translated_lookup() {
        let t = Translated { en: "Rain".into(), es: "Lluvia".into() };
        assert_eq!(t.get(Language::En), Some("Rain"));
        assert_eq!(t.get(Language::Es), Some("Lluvia"));
        assert_eq!(t.get(Language::Internal), None);
    }

    #[test]
    fn test_representation_untagged() {
        let single: Representation = serde_json::from_str("\"28\"").unwrap();
        assert_eq!(single.as_text(), Some("28"));
        let list: Representation = serde_json::from_str("[\"3194U\",\"3195\"]").unwrap();
        assert_eq!(list.as_list(), vec!["3194U", "3195"]);
    }

    #[test]
    fn test_region_record_flatten() {
        let record: RegionRecord = serde_json::from_str(
            r#"{"population": 6779888, "code_ine": "13", "name": "Madrid"}"#,
        )
        .unwrap();
        assert_eq!(record.population, 6779888);
        assert_eq!(record.representations["code_ine"].as_text(), Some("13"));
    }

    #[test]
    fn test_item_info_optional_fields() {
        let info: ItemInfo = serde_json::from_str(
            r#"{
                "display_name": {"EN": "Hospitalized", "ES": "Hospitalizados"},
                "description": {"EN": "d", "ES": "d"},
                "data_unit": {"EN": "people", "ES": "personas"},
                "field": "hospitalizados"
            }"#,
        )
        .unwrap();
        assert_eq!(info.field.as_deref(), Some("hospitalizados"));
        assert!(info.family.is_none());
        assert!(info.ine.is_none());
    }
}
