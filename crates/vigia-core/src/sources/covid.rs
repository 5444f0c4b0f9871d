//! Epidemiological source.
//!
//! Items are served by two URL families, detected at plan time from the
//! catalog `family` tag: a legacy per-item CSV (rows keyed by province code,
//! one column per date) and a consolidated "new series" CSV (long rows of
//! date, province code and raw count columns). Several items are derived
//! from the raw columns: running totals, trailing-window averages,
//! population-normalized incidence and trailing-window percentages. When the
//! whole-country aggregate is requested it is synthesized by summing every
//! reported sub-region; a missing raw column fails the reshape rather than
//! producing a silently partial aggregate.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use vigia_common::{Result, VigiaError};

use crate::fetch::{CsvPayload, Handled, Payload};
use crate::table::{CellValue, ColumnKey, DataTable, ItemLabel, RowKey};
use crate::types::{Classification, SourceId};
use crate::window::{cumulative_sum, percent_of_window, rolling_mean, rolling_sum};

use super::{ine_code, item_field, AdapterContext};

const DATE_COLUMN: &str = "fecha";
const CODE_COLUMN: &str = "cod_ine";
const CASES_FIELD: &str = "num_casos";

/// How an item's final series is computed from its raw column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DerivedRule {
    Raw,
    /// Running total per region.
    Accumulated,
    /// Trailing mean over a fixed window.
    RollingMean(usize),
    /// Trailing sum over a fixed window, per 100k inhabitants.
    IncidencePer100k(usize),
    /// Trailing sum as a percentage of the trailing cases sum.
    PercentOfCases(usize),
}

fn derived_rule(item: &str) -> DerivedRule {
    match item {
        "accumulated_cases" | "accumulated_deaths" => DerivedRule::Accumulated,
        "cases_avg_7d" => DerivedRule::RollingMean(7),
        "incidence_14d" => DerivedRule::IncidencePer100k(14),
        "deaths_per_cases_14d_pct" => DerivedRule::PercentOfCases(14),
        _ => DerivedRule::Raw,
    }
}

#[derive(Debug, Clone)]
enum PlannedUrl {
    /// One legacy per-item file.
    Legacy(String),
    /// The consolidated CSV covering every new-series item at once.
    NewSeries,
}

#[derive(Debug)]
pub struct CovidAdapter {
    legacy_items: Vec<String>,
    new_series_items: Vec<String>,
    /// Item -> raw column / file token.
    fields: BTreeMap<String, String>,
    code_to_region: BTreeMap<String, String>,
    /// Set when the whole-country aggregate was requested.
    country_region: Option<String>,
    populations: BTreeMap<String, u64>,
    legacy_template: String,
    new_series_url: String,
    plan: Vec<PlannedUrl>,
}

impl CovidAdapter {
    pub fn new(ctx: AdapterContext) -> Result<Self> {
        let manifest = ctx.config.manifest(SourceId::Covid19)?;
        let representation = manifest.region_representation.clone();
        let catalog = ctx.config.catalog(SourceId::Covid19)?;

        let mut legacy_items = Vec::new();
        let mut new_series_items = Vec::new();
        let mut fields = BTreeMap::new();
        for item in &ctx.items {
            let family = catalog.get(item).and_then(|info| info.family.as_deref());
            match family {
                Some("new_series") => new_series_items.push(item.clone()),
                _ => legacy_items.push(item.clone()),
            }
            fields.insert(item.clone(), item_field(&ctx, SourceId::Covid19, item)?);
        }

        let sub_regions = ctx.requested_sub_regions()?;
        let codes = ctx
            .directory
            .resolve_codes(&sub_regions, &representation, &ctx.country)?;
        let code_to_region: BTreeMap<String, String> =
            codes.into_iter().zip(sub_regions).collect();

        Ok(CovidAdapter {
            legacy_items,
            new_series_items,
            fields,
            code_to_region,
            country_region: ctx.requested_country_region()?,
            populations: ctx.directory.population(&ctx.country)?,
            legacy_template: ctx.config.endpoint(SourceId::Covid19, "legacy")?.to_string(),
            new_series_url: ctx.config.endpoint(SourceId::Covid19, "new_series")?.to_string(),
            plan: Vec::new(),
        })
    }

    pub fn build_urls(&mut self) -> Result<Vec<String>> {
        self.plan.clear();
        let mut urls = Vec::new();
        for item in &self.legacy_items {
            let field = &self.fields[item];
            urls.push(self.legacy_template.replace("{field}", field));
            self.plan.push(PlannedUrl::Legacy(item.clone()));
        }
        if !self.new_series_items.is_empty() {
            urls.push(self.new_series_url.clone());
            self.plan.push(PlannedUrl::NewSeries);
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
            return Err(VigiaError::Parse("COVID19: expected a CSV payload".into()));
        };
        let planned = self.plan.get(seq).ok_or_else(|| {
            VigiaError::Parse(format!("COVID19: no planned URL at position {}", seq))
        })?;

        match planned {
            PlannedUrl::Legacy(item) => {
                let (dates, series) = self.legacy_series(&csv)?;
                self.emit(std::iter::once(item.as_str()), &dates, |_| Ok(series.clone()))
            }
            PlannedUrl::NewSeries => {
                let dates = self.new_series_dates(&csv)?;
                let cases_needed = self
                    .new_series_items
                    .iter()
                    .any(|i| matches!(derived_rule(i), DerivedRule::PercentOfCases(_)));
                let cases = if cases_needed {
                    Some(self.field_series(&csv, CASES_FIELD, &dates)?)
                } else {
                    None
                };
                let items = self.new_series_items.iter().map(String::as_str);
                self.emit(items, &dates, |item| {
                    let raw = self.field_series(&csv, &self.fields[item], &dates)?;
                    self.apply_rule(item, raw, cases.as_ref())
                })
            }
        }
    }

    /// Requested regions in output order: mapped sub-regions plus the
    /// synthesized country aggregate.
    fn output_regions(&self) -> Vec<&str> {
        let mut regions: Vec<&str> =
            self.code_to_region.values().map(String::as_str).collect();
        if let Some(country) = &self.country_region {
            regions.push(country);
        }
        regions
    }

    fn emit<'a, F>(
        &self,
        items: impl Iterator<Item = &'a str>,
        dates: &[NaiveDate],
        mut series_of: F,
    ) -> Result<DataTable>
    where
        F: FnMut(&str) -> Result<BTreeMap<String, Vec<Option<f64>>>>,
    {
        let mut table = DataTable::new(Classification::Temporal);
        for item in items {
            let per_region = series_of(item)?;
            for region in self.output_regions() {
                let Some(series) = per_region.get(region) else {
                    continue;
                };
                for (date, value) in dates.iter().zip(series) {
                    if let Some(v) = value {
                        table.set(
                            RowKey::Date(*date),
                            ColumnKey::temporal(region, ItemLabel::new(item)),
                            CellValue::Number(*v),
                        );
                    }
                }
            }
        }
        Ok(table)
    }

    /// Per-region series from a legacy wide file: rows keyed by province
    /// code, one column per date.
    fn legacy_series(
        &self,
        csv: &CsvPayload,
    ) -> Result<(Vec<NaiveDate>, BTreeMap<String, Vec<Option<f64>>>)> {
        let date_columns: Vec<(usize, NaiveDate)> = csv
            .headers()
            .iter()
            .enumerate()
            .filter_map(|(idx, h)| h.parse::<NaiveDate>().ok().map(|d| (idx, d)))
            .collect();
        if date_columns.is_empty() {
            return Err(VigiaError::Parse(
                "COVID19: legacy file carries no date columns".into(),
            ));
        }
        let code_idx = csv.column_index(CODE_COLUMN).ok_or_else(|| {
            VigiaError::Parse(format!("COVID19: legacy file lacks '{}'", CODE_COLUMN))
        })?;

        let dates: Vec<NaiveDate> = date_columns.iter().map(|(_, d)| *d).collect();
        let mut series: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
        let mut country_totals = vec![None; dates.len()];

        for row in csv.rows() {
            let Some(code) = row.get(code_idx).map(String::as_str).and_then(ine_code) else {
                continue;
            };
            let values: Vec<Option<f64>> = date_columns
                .iter()
                .map(|(idx, _)| row.get(*idx).and_then(|v| v.trim().parse::<f64>().ok()))
                .collect();
            for (total, value) in country_totals.iter_mut().zip(&values) {
                if let Some(v) = value {
                    *total = Some(total.unwrap_or(0.0) + v);
                }
            }
            if let Some(region) = self.code_to_region.get(&code) {
                series.insert(region.clone(), values);
            }
        }
        if let Some(country) = &self.country_region {
            series.insert(country.clone(), country_totals);
        }
        Ok((dates, series))
    }

    fn new_series_dates(&self, csv: &CsvPayload) -> Result<Vec<NaiveDate>> {
        let date_idx = csv.column_index(DATE_COLUMN).ok_or_else(|| {
            VigiaError::Parse(format!("COVID19: series file lacks '{}'", DATE_COLUMN))
        })?;
        let dates: BTreeSet<NaiveDate> = csv
            .rows()
            .iter()
            .filter_map(|row| row.get(date_idx)?.parse().ok())
            .collect();
        Ok(dates.into_iter().collect())
    }

    /// Per-region raw series of one column of the consolidated file.
    /// Duplicate (date, region) rows are summed; the country aggregate sums
    /// every reported code.
    fn field_series(
        &self,
        csv: &CsvPayload,
        field: &str,
        dates: &[NaiveDate],
    ) -> Result<BTreeMap<String, Vec<Option<f64>>>> {
        let field_idx = csv.column_index(field).ok_or_else(|| {
            VigiaError::Parse(format!("COVID19: series file lacks raw column '{}'", field))
        })?;
        let date_idx = csv.column_index(DATE_COLUMN).ok_or_else(|| {
            VigiaError::Parse(format!("COVID19: series file lacks '{}'", DATE_COLUMN))
        })?;
        let code_idx = csv.column_index(CODE_COLUMN).ok_or_else(|| {
            VigiaError::Parse(format!("COVID19: series file lacks '{}'", CODE_COLUMN))
        })?;

        let positions: BTreeMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        let mut series: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
        let mut add = |region: &str, pos: usize, value: f64| {
            let entry = series
                .entry(region.to_string())
                .or_insert_with(|| vec![None; dates.len()]);
            entry[pos] = Some(entry[pos].unwrap_or(0.0) + value);
        };

        for row in csv.rows() {
            let Some(pos) = row
                .get(date_idx)
                .and_then(|d| d.parse::<NaiveDate>().ok())
                .and_then(|d| positions.get(&d).copied())
            else {
                continue;
            };
            let Some(code) = row.get(code_idx).map(String::as_str).and_then(ine_code) else {
                continue;
            };
            let Some(value) = row.get(field_idx).and_then(|v| v.trim().parse::<f64>().ok())
            else {
                continue;
            };
            if let Some(region) = self.code_to_region.get(&code) {
                add(region, pos, value);
            }
            if let Some(country) = &self.country_region {
                add(country, pos, value);
            }
        }
        Ok(series)
    }

    fn apply_rule(
        &self,
        item: &str,
        raw: BTreeMap<String, Vec<Option<f64>>>,
        cases: Option<&BTreeMap<String, Vec<Option<f64>>>>,
    ) -> Result<BTreeMap<String, Vec<Option<f64>>>> {
        let rule = derived_rule(item);
        let mut out = BTreeMap::new();
        for (region, series) in raw {
            let derived = match rule {
                DerivedRule::Raw => series,
                DerivedRule::Accumulated => cumulative_sum(&series),
                DerivedRule::RollingMean(window) => rolling_mean(&series, window),
                DerivedRule::IncidencePer100k(window) => {
                    let population = self.populations.get(&region).copied().ok_or_else(|| {
                        VigiaError::Config(format!("no population for region '{}'", region))
                    })?;
                    rolling_sum(&series, window)
                        .into_iter()
                        .map(|v| v.map(|s| s * 100_000.0 / population as f64))
                        .collect()
                }
                DerivedRule::PercentOfCases(window) => {
                    let cases_series = cases
                        .and_then(|m| m.get(&region))
                        .ok_or_else(|| {
                            VigiaError::Parse(format!(
                                "COVID19: no '{}' series for region '{}' to derive {}",
                                CASES_FIELD, region, item
                            ))
                        })?;
                    percent_of_window(&series, cases_series, window)
                }
            };
            out.insert(region, derived);
        }
        Ok(out)
    }
}
