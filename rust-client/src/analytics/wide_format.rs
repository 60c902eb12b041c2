use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{metering::round2, EntityType, MeteringRecord, ObisCatalog, ObisCategory};

pub const BASE_COLUMNS: [&str; 5] = ["year", "month", "entity_type", "name", "metering_point"];
pub const TOTAL_LABEL: &str = "TOTAL";
pub const DESCRIPTION_LABEL: &str = "DESCRIPTION";

/// One metering point with a value for every code column.
#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub year: i32,
    pub month: u8,
    pub entity_type: EntityType,
    pub name: String,
    pub metering_point: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(i64),
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn render(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Number(v) => v.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

/// Meter-by-code pivot of a period's available records.
///
/// Code columns are the consumption codes then the production codes, each
/// sorted lexically. An empty table has no rows at all, trailers included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideFormatTable {
    consumption_codes: Vec<String>,
    production_codes: Vec<String>,
    rows: Vec<WideRow>,
    totals: Vec<f64>,
    descriptions: Vec<String>,
}

impl WideFormatTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> + '_ {
        self.consumption_codes
            .iter()
            .chain(self.production_codes.iter())
            .map(String::as_str)
    }

    pub fn consumption_codes(&self) -> &[String] {
        &self.consumption_codes
    }

    pub fn production_codes(&self) -> &[String] {
        &self.production_codes
    }

    pub fn columns(&self) -> Vec<String> {
        BASE_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.codes().map(str::to_string))
            .collect()
    }

    pub fn data_rows(&self) -> &[WideRow] {
        &self.rows
    }

    pub fn totals(&self) -> &[f64] {
        &self.totals
    }

    pub fn descriptions(&self) -> &[String] {
        &self.descriptions
    }

    pub fn column_index(&self, code: &str) -> Option<usize> {
        self.codes().position(|c| c == code)
    }

    /// Every row as cells aligned with [`WideFormatTable::columns`], trailers last.
    pub fn to_cells(&self) -> Vec<Vec<Cell>> {
        if self.is_empty() {
            return Vec::new();
        }

        let blank_identity = |label: &str| {
            let mut cells = vec![Cell::Text(label.to_string())];
            cells.extend((1..BASE_COLUMNS.len()).map(|_| Cell::Text(String::new())));
            cells
        };

        let mut out: Vec<Vec<Cell>> = self
            .rows
            .iter()
            .map(|r| {
                let mut cells = vec![
                    Cell::Int(r.year as i64),
                    Cell::Int(r.month as i64),
                    Cell::Text(r.entity_type.to_string()),
                    Cell::Text(r.name.clone()),
                    Cell::Text(r.metering_point.clone()),
                ];
                cells.extend(r.values.iter().map(|&v| Cell::Number(v)));
                cells
            })
            .collect();

        let mut totals = blank_identity(TOTAL_LABEL);
        totals.extend(self.totals.iter().map(|&v| Cell::Number(v)));
        out.push(totals);

        let mut descriptions = blank_identity(DESCRIPTION_LABEL);
        descriptions.extend(self.descriptions.iter().cloned().map(Cell::Text));
        out.push(descriptions);

        out
    }
}

/// Pivot available records into one row per (entity_type, name, meter).
///
/// Columns cover every catalog code plus any code seen in the records.
/// Values are rounded to two decimals and missing codes are filled with 0.
pub fn project(catalog: &ObisCatalog, records: &[MeteringRecord]) -> WideFormatTable {
    let available: Vec<(&MeteringRecord, f64)> = records
        .iter()
        .filter_map(|r| r.available_value().map(|v| (r, v)))
        .collect();

    if available.is_empty() {
        return WideFormatTable::default();
    }

    let mut consumption: BTreeSet<&str> = catalog
        .codes_for(ObisCategory::Consumption)
        .map(|d| d.code.as_str())
        .collect();
    let mut production: BTreeSet<&str> = catalog
        .codes_for(ObisCategory::Production)
        .map(|d| d.code.as_str())
        .collect();

    type GroupKey<'a> = (EntityType, &'a str, &'a str);
    let mut groups: BTreeMap<GroupKey<'_>, (i32, u8, BTreeMap<&str, f64>)> = BTreeMap::new();

    for (r, value) in &available {
        match r.category {
            ObisCategory::Consumption => consumption.insert(r.obis_code.as_str()),
            ObisCategory::Production => production.insert(r.obis_code.as_str()),
        };

        groups
            .entry((r.entity_type, r.entity_name.as_str(), r.meter_id.as_str()))
            .or_insert_with(|| (r.year, r.month, BTreeMap::new()))
            .2
            .insert(r.obis_code.as_str(), round2(*value));
    }

    let codes: Vec<&str> = consumption.iter().chain(production.iter()).copied().collect();

    let rows: Vec<WideRow> = groups
        .into_iter()
        .map(|((entity_type, name, meter), (year, month, values))| WideRow {
            year,
            month,
            entity_type,
            name: name.to_string(),
            metering_point: meter.to_string(),
            values: codes
                .iter()
                .map(|c| values.get(c).copied().unwrap_or(0.0))
                .collect(),
        })
        .collect();

    let totals = (0..codes.len())
        .map(|i| round2(rows.iter().map(|r| r.values[i]).sum()))
        .collect();

    let descriptions = codes
        .iter()
        .map(|c| catalog.describe(c).unwrap_or_default().to_string())
        .collect();

    WideFormatTable {
        consumption_codes: consumption.into_iter().map(str::to_string).collect(),
        production_codes: production.into_iter().map(str::to_string).collect(),
        rows,
        totals,
        descriptions,
    }
}
