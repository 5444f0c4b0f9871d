//! Demographic/statistical source (national statistics institute).
//!
//! One URL per item, composed of a function code, a dataset code and a
//! recency count. The response is a list of series whose label string
//! encodes "Region, SubCategory, Item"; region spellings may themselves
//! contain commas, so known region representations are substituted for
//! internal names before splitting. Only the subcategory meaning
//! "total/both sexes" is kept; zero or several distinct matches are
//! reported as parse errors instead of picking one silently. Item tokens
//! become column variants, aggregated by mean on duplicates.

use std::collections::BTreeSet;

use vigia_common::{Result, VigiaError};

use crate::config::IneQuery;
use crate::fetch::{Handled, Payload};
use crate::table::{ColumnKey, DataTable, ItemLabel, RowKey};
use crate::types::{Classification, SourceId};

use super::{AdapterContext, PivotAccumulator};

#[derive(Debug)]
pub struct IneAdapter {
    items: Vec<(String, IneQuery)>,
    /// Source spelling -> internal name, longest spellings first.
    replacements: Vec<(String, String)>,
    requested: BTreeSet<String>,
    url_template: String,
}

impl IneAdapter {
    pub fn new(ctx: AdapterContext) -> Result<Self> {
        let manifest = ctx.config.manifest(SourceId::Ine)?;
        let representation = manifest.region_representation.clone();
        let catalog = ctx.config.catalog(SourceId::Ine)?;

        let items = ctx
            .items
            .iter()
            .map(|item| {
                let query = catalog
                    .get(item)
                    .and_then(|info| info.ine.clone())
                    .ok_or_else(|| {
                        VigiaError::Config(format!(
                            "item '{}' has no statistical query coordinates",
                            item
                        ))
                    })?;
                Ok((item.clone(), query))
            })
            .collect::<Result<Vec<_>>>()?;

        let spellings = ctx
            .directory
            .resolve_codes(&ctx.regions, &representation, &ctx.country)?;
        let mut replacements: Vec<(String, String)> = spellings
            .into_iter()
            .zip(ctx.regions.iter().cloned())
            .collect();
        // longest first so "Madrid, Comunidad de" wins over any prefix
        replacements.sort_by_key(|(spelling, _)| std::cmp::Reverse(spelling.len()));

        Ok(IneAdapter {
            items,
            replacements,
            requested: ctx.regions.iter().cloned().collect(),
            url_template: ctx.config.endpoint(SourceId::Ine, "series")?.to_string(),
        })
    }

    pub fn build_urls(&mut self) -> Result<Vec<String>> {
        Ok(self
            .items
            .iter()
            .map(|(_, query)| {
                self.url_template
                    .replace("{function}", &query.function)
                    .replace("{dataset}", &query.dataset)
                    .replace("{recent}", &query.recent.to_string())
            })
            .collect())
    }

    pub fn handle_response(&self, body: &str) -> Result<Handled> {
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| VigiaError::Parse(format!("INE: malformed payload: {}", e)))?;
        if value.as_array().is_some_and(Vec::is_empty) {
            return Ok(Handled::Empty);
        }
        Ok(Handled::Data(Payload::Json(value)))
    }

    pub fn reshape(&self, payload: Payload, seq: usize) -> Result<DataTable> {
        let Payload::Json(value) = payload else {
            return Err(VigiaError::Parse("INE: expected a JSON payload".into()));
        };
        let (item, _) = self.items.get(seq).ok_or_else(|| {
            VigiaError::Parse(format!("INE: no planned URL at position {}", seq))
        })?;
        let series = value
            .as_array()
            .ok_or_else(|| VigiaError::Parse("INE: expected a series array".into()))?;

        let mut rows = Vec::new();
        for entry in series {
            let Some(label) = entry.get("Nombre").and_then(serde_json::Value::as_str) else {
                continue;
            };
            let Some((region, subcategory, token)) = self.split_label(label) else {
                continue;
            };
            let values: Vec<f64> = entry
                .get("Data")
                .and_then(serde_json::Value::as_array)
                .map(|data| {
                    data.iter()
                        .filter_map(|obs| obs.get("Valor")?.as_f64())
                        .collect()
                })
                .unwrap_or_default();
            rows.push((region, subcategory, token, values));
        }

        // labels occasionally lead with the sub-category when it names sexes
        if rows.iter().any(|(region, ..)| region.to_lowercase().contains("sexo")) {
            for (region, subcategory, ..) in &mut rows {
                std::mem::swap(region, subcategory);
            }
        }

        let chosen = self.total_subcategory(item, &rows)?;
        let mut pivot = PivotAccumulator::new(Classification::Geographical);
        for (region, subcategory, token, values) in rows {
            if subcategory != chosen
                || token.to_lowercase().contains("total")
                || !self.requested.contains(&region)
            {
                continue;
            }
            for value in values {
                pivot.add(
                    RowKey::Region(region.clone()),
                    ColumnKey::geographical(ItemLabel::with_variant(item.clone(), token.clone())),
                    value,
                );
            }
        }
        Ok(pivot.finish())
    }

    /// Substitute region spellings, then split into the three label parts.
    fn split_label(&self, label: &str) -> Option<(String, String, String)> {
        let mut normalized = label.to_string();
        for (spelling, internal) in &self.replacements {
            normalized = normalized.replace(spelling, internal);
        }
        let mut parts = normalized.splitn(3, ", ");
        let region = parts.next()?.to_string();
        let subcategory = parts.next()?.to_string();
        let token = parts.next()?.to_string();
        Some((region, subcategory, token))
    }

    /// The single subcategory meaning "total/both". Zero or several distinct
    /// candidates are parse errors.
    fn total_subcategory(
        &self,
        item: &str,
        rows: &[(String, String, String, Vec<f64>)],
    ) -> Result<String> {
        let candidates: BTreeSet<&str> = rows
            .iter()
            .map(|(_, subcategory, ..)| subcategory.as_str())
            .filter(|s| {
                let lower = s.to_lowercase();
                lower.contains("total") || lower.contains("ambos") || lower.contains("both")
            })
            .collect();
        match candidates.len() {
            0 => Err(VigiaError::Parse(format!(
                "INE: no total/both subcategory in '{}' payload",
                item
            ))),
            1 => Ok(candidates.into_iter().next().unwrap_or_default().to_string()),
            _ => Err(VigiaError::Parse(format!(
                "INE: ambiguous total subcategory in '{}' payload: {}",
                item,
                candidates.into_iter().collect::<Vec<_>>().join(" / ")
            ))),
        }
    }
}
