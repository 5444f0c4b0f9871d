//! Meteorological source (AEMET open data).
//!
//! The API is rate limited and serves data with a publication lag of four
//! days, so both query dates are clamped to `today - 4`. One URL is built
//! per region, parameterized by the region's comma-joined station codes; the
//! response is an envelope whose `datos` field points at the real payload,
//! fetched with a dependent second request. Stations map many-to-one onto
//! regions and are aggregated by mean per date.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use reqwest::Client;
use tracing::warn;
use vigia_common::{Result, VigiaError};

use crate::fetch::{Handled, Payload};
use crate::table::{ColumnKey, DataTable, ItemLabel, RowKey};
use crate::types::{Classification, SourceId};

use super::{item_field, parse_decimal_comma, AdapterContext, PivotAccumulator};

/// Publication lag of the provider.
const PUBLICATION_LAG_DAYS: i64 = 4;

/// Baseline courtesy delay for the rate-limited API.
const BASELINE_DELAY: Duration = Duration::from_secs(4);

#[derive(Debug)]
pub struct AemetAdapter {
    start_date: NaiveDate,
    end_date: NaiveDate,
    api_key: Option<String>,
    /// Item internal name -> provider field, in request order.
    fields: Vec<(String, String)>,
    /// Regions with at least one station, with their joined station codes.
    plan: Vec<(String, String)>,
    station_to_region: BTreeMap<String, String>,
    url_template: String,
}

impl AemetAdapter {
    pub fn new(ctx: AdapterContext) -> Result<Self> {
        let manifest = ctx.config.manifest(SourceId::Aemet)?;

        let api_key = manifest.api_key.clone().filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!("AEMET API key is not configured; requests will likely be rejected");
        }

        let limit = Local::now().date_naive() - chrono::Duration::days(PUBLICATION_LAG_DAYS);
        let start_date = required_date(ctx.start_date, "start_date")?.min(limit);
        let end_date = required_date(ctx.end_date, "end_date")?.min(limit);

        let representation = manifest.region_representation.clone();
        let url_template = ctx.config.endpoint(SourceId::Aemet, "climatology")?.to_string();

        let fields = ctx
            .items
            .iter()
            .map(|item| Ok((item.clone(), item_field(&ctx, SourceId::Aemet, item)?)))
            .collect::<Result<Vec<_>>>()?;

        let stations =
            ctx.directory
                .resolve_representation(&ctx.regions, &representation, &ctx.country)?;
        let mut plan = Vec::new();
        let mut station_to_region = BTreeMap::new();
        for (region, value) in ctx.regions.iter().zip(stations) {
            let codes = value.as_list();
            if codes.is_empty() {
                continue;
            }
            for code in &codes {
                station_to_region.insert(code.to_string(), region.clone());
            }
            plan.push((region.clone(), codes.join(",")));
        }

        Ok(AemetAdapter {
            start_date,
            end_date,
            api_key,
            fields,
            plan,
            station_to_region,
            url_template,
        })
    }

    pub fn initial_delay(&self) -> Duration {
        BASELINE_DELAY
    }

    pub fn query_parameters(&self) -> Vec<(String, String)> {
        match &self.api_key {
            Some(key) => vec![("api_key".to_string(), key.clone())],
            None => Vec::new(),
        }
    }

    pub fn build_urls(&mut self) -> Result<Vec<String>> {
        let start = self.start_date.format("%Y-%m-%dT00:00:00UTC").to_string();
        let end = self.end_date.format("%Y-%m-%dT23:59:59UTC").to_string();
        Ok(self
            .plan
            .iter()
            .map(|(_, stations)| {
                self.url_template
                    .replace("{start}", &start)
                    .replace("{end}", &end)
                    .replace("{station}", stations)
            })
            .collect())
    }

    /// Unwrap the envelope and follow its `datos` pointer.
    pub async fn handle_response(&self, body: &str, client: &Client) -> Result<Handled> {
        let envelope: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| VigiaError::Parse(format!("AEMET: malformed envelope: {}", e)))?;
        let estado = envelope
            .get("estado")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| VigiaError::Parse("AEMET: envelope carries no estado".into()))?;

        match estado {
            429 => return Ok(Handled::Throttled),
            200 => {}
            // includes 404, which the provider also uses for "no data for
            // these criteria"; the source fails rather than reporting a
            // partial result
            other => {
                return Err(VigiaError::Transport(format!(
                    "AEMET: envelope estado {}",
                    other
                )))
            }
        }

        let datos = envelope
            .get("datos")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| VigiaError::Parse("AEMET: envelope carries no datos URL".into()))?;

        let mut request = client.get(datos);
        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key.as_str())]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| VigiaError::Transport(format!("AEMET: datos request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(VigiaError::Transport(format!(
                "AEMET: datos URL answered {}",
                response.status()
            )));
        }
        let records: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VigiaError::Parse(format!("AEMET: malformed datos payload: {}", e)))?;
        Ok(Handled::Data(Payload::Json(records)))
    }

    pub fn reshape(&self, payload: Payload, _seq: usize) -> Result<DataTable> {
        let Payload::Json(value) = payload else {
            return Err(VigiaError::Parse("AEMET: expected a JSON payload".into()));
        };
        let records = value
            .as_array()
            .ok_or_else(|| VigiaError::Parse("AEMET: expected a record array".into()))?;

        let mut pivot = PivotAccumulator::new(Classification::Temporal);
        for record in records {
            let Some(date) = record
                .get("fecha")
                .and_then(serde_json::Value::as_str)
                .and_then(|s| s.parse::<NaiveDate>().ok())
            else {
                continue;
            };
            let Some(region) = record
                .get("indicativo")
                .and_then(serde_json::Value::as_str)
                .and_then(|station| self.station_to_region.get(station))
            else {
                continue;
            };
            for (item, field) in &self.fields {
                // fields are strings with comma decimals; non-numeric markers
                // like "Ip" (inappreciable rainfall) are skipped
                let Some(number) = record
                    .get(field)
                    .and_then(serde_json::Value::as_str)
                    .and_then(parse_decimal_comma)
                else {
                    continue;
                };
                pivot.add(
                    RowKey::Date(date),
                    ColumnKey::temporal(region.clone(), ItemLabel::new(item.clone())),
                    number,
                );
            }
        }
        Ok(pivot.finish())
    }
}

fn required_date(date: Option<NaiveDate>, name: &str) -> Result<NaiveDate> {
    date.ok_or_else(|| VigiaError::Validation(format!("AEMET queries require {}", name)))
}
