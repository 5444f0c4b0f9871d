//! Shared vocabulary types: classification, language, source identity.

use serde::{Deserialize, Serialize};
use vigia_common::VigiaError;

/// Classification of a data item or table.
///
/// TEMPORAL items form daily time series; GEOGRAPHICAL items are a single
/// snapshot value per region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Temporal,
    Geographical,
}

impl Classification {
    /// All implemented classifications, in a stable order.
    pub const ALL: [Classification; 2] = [Classification::Temporal, Classification::Geographical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Temporal => "temporal",
            Classification::Geographical => "geographical",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language of display names, descriptions and units.
///
/// `Internal` selects the canonical, language-independent identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    #[serde(rename = "ES")]
    #[default]
    Es,
    #[serde(rename = "EN")]
    En,
    #[serde(rename = "internal")]
    Internal,
}

impl std::str::FromStr for Language {
    type Err = VigiaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ES" | "es" => Ok(Language::Es),
            "EN" | "en" => Ok(Language::En),
            "internal" => Ok(Language::Internal),
            other => Err(VigiaError::Validation(format!("unknown language '{}'", other))),
        }
    }
}

/// Wire format of a data source payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Json,
    Csv,
}

/// Identity of an external data provider.
///
/// This is a closed set: routing from item to provider goes through the
/// registry built by the configuration store, not through dynamic lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceId {
    /// Meteorological service (AEMET open data).
    Aemet,
    /// Epidemiological series (legacy per-item CSVs plus the consolidated
    /// new-series CSV).
    Covid19,
    /// Community mobility reports (two independent providers).
    Mobility,
    /// All-cause excess mortality surveillance (MoMo).
    MoMo,
    /// Demographic and statistical series (INE).
    Ine,
}

impl SourceId {
    pub const ALL: [SourceId; 5] = [
        SourceId::Aemet,
        SourceId::Covid19,
        SourceId::Mobility,
        SourceId::MoMo,
        SourceId::Ine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Aemet => "AEMET",
            SourceId::Covid19 => "COVID19",
            SourceId::Mobility => "Mobility",
            SourceId::MoMo => "MoMo",
            SourceId::Ine => "INE",
        }
    }
}

impl std::str::FromStr for SourceId {
    type Err = VigiaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AEMET" => Ok(SourceId::Aemet),
            "COVID19" => Ok(SourceId::Covid19),
            "Mobility" => Ok(SourceId::Mobility),
            "MoMo" => Ok(SourceId::MoMo),
            "INE" => Ok(SourceId::Ine),
            other => Err(VigiaError::Config(format!("unknown data source '{}'", other))),
        }
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action to take when a source fails during a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log the failure, drop the affected source and keep going.
    #[default]
    Ignore,
    /// Abort the whole query on the first failure.
    Raise,
}

impl std::str::FromStr for ErrorPolicy {
    type Err = VigiaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(ErrorPolicy::Ignore),
            "raise" => Ok(ErrorPolicy::Raise),
            other => Err(VigiaError::Validation(format!("unknown error policy '{}'", other))),
        }
    }
}
