//! Community mobility source.
//!
//! Two independent providers, each with its own report file: a long-format
//! community mobility CSV (one row per region and date, one column per
//! place category) and a wide transit-trend CSV (one row per region and
//! transportation type, one column per date). A provider is fetched only
//! when a requested item carries its tag; region names arrive in English
//! spelling and are translated back to internal identifiers.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use vigia_common::{Result, VigiaError};

use crate::fetch::{CsvPayload, Handled, Payload};
use crate::table::{CellValue, ColumnKey, DataTable, ItemLabel, RowKey};
use crate::types::{Classification, SourceId};

use super::{item_field, AdapterContext, PivotAccumulator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    Google,
    Apple,
}

#[derive(Debug)]
pub struct MobilityAdapter {
    google_items: Vec<(String, String)>,
    apple_items: Vec<(String, String)>,
    english_to_region: BTreeMap<String, String>,
    google_url: String,
    apple_url: String,
    plan: Vec<Provider>,
}

impl MobilityAdapter {
    pub fn new(ctx: AdapterContext) -> Result<Self> {
        let manifest = ctx.config.manifest(SourceId::Mobility)?;
        let representation = manifest.region_representation.clone();
        let catalog = ctx.config.catalog(SourceId::Mobility)?;

        let mut google_items = Vec::new();
        let mut apple_items = Vec::new();
        for item in &ctx.items {
            let provider = catalog
                .get(item)
                .and_then(|info| info.provider.as_deref())
                .ok_or_else(|| {
                    VigiaError::Config(format!("mobility item '{}' has no provider tag", item))
                })?;
            let field = item_field(&ctx, SourceId::Mobility, item)?;
            match provider {
                "Google" => google_items.push((item.clone(), field)),
                "Apple" => apple_items.push((item.clone(), field)),
                other => {
                    return Err(VigiaError::Config(format!(
                        "mobility item '{}' has unknown provider '{}'",
                        item, other
                    )))
                }
            }
        }

        let english = ctx
            .directory
            .resolve_codes(&ctx.regions, &representation, &ctx.country)?;
        let english_to_region = english.into_iter().zip(ctx.regions.iter().cloned()).collect();

        Ok(MobilityAdapter {
            google_items,
            apple_items,
            english_to_region,
            google_url: ctx.config.endpoint(SourceId::Mobility, "google")?.to_string(),
            apple_url: ctx.config.endpoint(SourceId::Mobility, "apple")?.to_string(),
            plan: Vec::new(),
        })
    }

    pub fn build_urls(&mut self) -> Result<Vec<String>> {
        self.plan.clear();
        let mut urls = Vec::new();
        if !self.google_items.is_empty() {
            urls.push(self.google_url.clone());
            self.plan.push(Provider::Google);
        }
        if !self.apple_items.is_empty() {
            urls.push(self.apple_url.clone());
            self.plan.push(Provider::Apple);
        }
        Ok(urls)
    }

    pub fn handle_response(&self, body: &str) -> Result<Handled> {
        let csv = CsvPayload::parse(body)?;
        if csv.rows().is_empty() {
            return Ok(Handled::Empty);
        }
        Ok(Handled::Data(Payload::Csv(csv)))
    }

    pub fn reshape(&self, payload: Payload, seq: usize) -> Result<DataTable> {
        let Payload::Csv(csv) = payload else {
            return Err(VigiaError::Parse("Mobility: expected a CSV payload".into()));
        };
        match self.plan.get(seq) {
            Some(Provider::Google) => self.reshape_google(&csv),
            Some(Provider::Apple) => self.reshape_apple(&csv),
            None => Err(VigiaError::Parse(format!(
                "Mobility: no planned URL at position {}",
                seq
            ))),
        }
    }

    /// Long format: one row per (region, date), categories as columns.
    fn reshape_google(&self, csv: &CsvPayload) -> Result<DataTable> {
        let mut pivot = PivotAccumulator::new(Classification::Temporal);
        for row in csv.rows() {
            let Some(region) = csv
                .cell(row, "sub_region_1")
                .and_then(|name| self.english_to_region.get(name))
            else {
                continue;
            };
            // county-level rows duplicate the region name one level down
            if csv.cell(row, "sub_region_2").is_some_and(|v| !v.is_empty()) {
                continue;
            }
            let Some(date) = csv.cell(row, "date").and_then(|d| d.parse::<NaiveDate>().ok())
            else {
                continue;
            };
            for (item, field) in &self.google_items {
                let Some(value) = csv.cell(row, field).and_then(|v| v.trim().parse().ok())
                else {
                    continue;
                };
                pivot.add(
                    RowKey::Date(date),
                    ColumnKey::temporal(region.clone(), ItemLabel::new(item.clone())),
                    value,
                );
            }
        }
        Ok(pivot.finish())
    }

    /// Wide format: one row per (region, transportation type), dates as
    /// columns.
    fn reshape_apple(&self, csv: &CsvPayload) -> Result<DataTable> {
        let date_columns: Vec<(usize, NaiveDate)> = csv
            .headers()
            .iter()
            .enumerate()
            .filter_map(|(idx, h)| h.parse::<NaiveDate>().ok().map(|d| (idx, d)))
            .collect();
        if date_columns.is_empty() {
            return Err(VigiaError::Parse(
                "Mobility: transit report carries no date columns".into(),
            ));
        }

        let mut table = DataTable::new(Classification::Temporal);
        for row in csv.rows() {
            if csv.cell(row, "geo_type") != Some("sub-region") {
                continue;
            }
            let Some(region) = csv
                .cell(row, "region")
                .and_then(|name| self.english_to_region.get(name))
            else {
                continue;
            };
            let kind = csv.cell(row, "transportation_type").unwrap_or_default();
            for (item, field) in &self.apple_items {
                if field.as_str() != kind {
                    continue;
                }
                for (idx, date) in &date_columns {
                    let Some(value) =
                        row.get(*idx).and_then(|v| v.trim().parse::<f64>().ok())
                    else {
                        continue;
                    };
                    table.set(
                        RowKey::Date(*date),
                        ColumnKey::temporal(region.clone(), ItemLabel::new(item.clone())),
                        CellValue::Number(value),
                    );
                }
            }
        }
        Ok(table)
    }
}
