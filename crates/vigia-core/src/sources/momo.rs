//! All-cause excess mortality surveillance source.
//!
//! A single fixed endpoint serves every region, sex and age band in one long
//! CSV. Only the all-sexes, all-ages slice is kept; region codes arrive as
//! raw numbers and are normalized to the two-digit form before translation.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use vigia_common::{Result, VigiaError};

use crate::fetch::{CsvPayload, Handled, Payload};
use crate::table::{CellValue, ColumnKey, DataTable, ItemLabel, RowKey};
use crate::types::{Classification, SourceId};

use super::{ine_code, item_field, AdapterContext};

const DATE_COLUMN: &str = "fecha_defuncion";
const CODE_COLUMN: &str = "cod_ine_ambito";
const SEX_COLUMN: &str = "nombre_sexo";
const AGE_COLUMN: &str = "nombre_gedad";
const ALL_SLICE: &str = "todos";

#[derive(Debug)]
pub struct MoMoAdapter {
    fields: Vec<(String, String)>,
    code_to_region: BTreeMap<String, String>,
    url: String,
}

impl MoMoAdapter {
    pub fn new(ctx: AdapterContext) -> Result<Self> {
        let manifest = ctx.config.manifest(SourceId::MoMo)?;
        let representation = manifest.region_representation.clone();

        let fields = ctx
            .items
            .iter()
            .map(|item| Ok((item.clone(), item_field(&ctx, SourceId::MoMo, item)?)))
            .collect::<Result<Vec<_>>>()?;

        let codes = ctx
            .directory
            .resolve_codes(&ctx.regions, &representation, &ctx.country)?;
        let code_to_region = codes.into_iter().zip(ctx.regions.iter().cloned()).collect();

        Ok(MoMoAdapter {
            fields,
            code_to_region,
            url: ctx.config.endpoint(SourceId::MoMo, "momo")?.to_string(),
        })
    }

    pub fn build_urls(&mut self) -> Result<Vec<String>> {
        Ok(vec![self.url.clone()])
    }

    pub fn handle_response(&self, body: &str) -> Result<Handled> {
        let csv = CsvPayload::parse(body)?;
        if csv.rows().is_empty() {
            return Ok(Handled::Empty);
        }
        Ok(Handled::Data(Payload::Csv(csv)))
    }

    pub fn reshape(&self, payload: Payload, _seq: usize) -> Result<DataTable> {
        let Payload::Csv(csv) = payload else {
            return Err(VigiaError::Parse("MoMo: expected a CSV payload".into()));
        };

        let mut table = DataTable::new(Classification::Temporal);
        for row in csv.rows() {
            if csv.cell(row, SEX_COLUMN) != Some(ALL_SLICE)
                || csv.cell(row, AGE_COLUMN) != Some(ALL_SLICE)
            {
                continue;
            }
            // national rows have an empty code and are skipped
            let Some(region) = csv
                .cell(row, CODE_COLUMN)
                .and_then(ine_code)
                .and_then(|code| self.code_to_region.get(&code))
            else {
                continue;
            };
            let Some(date) = csv
                .cell(row, DATE_COLUMN)
                .and_then(|d| d.parse::<NaiveDate>().ok())
            else {
                continue;
            };
            for (item, field) in &self.fields {
                let Some(value) = csv.cell(row, field).and_then(|v| v.trim().parse().ok())
                else {
                    continue;
                };
                table.set(
                    RowKey::Date(date),
                    ColumnKey::temporal(region.clone(), ItemLabel::new(item.clone())),
                    CellValue::Number(value),
                );
            }
        }
        Ok(table)
    }
}
