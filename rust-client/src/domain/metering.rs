use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use serde::Serialize;
use sqlx::{postgres::PgRow, FromRow, Row};
use time::OffsetDateTime;

use super::obis::ObisCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Consumer,
    Producer,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consumer => "consumer",
            Self::Producer => "producer",
        }
    }

    /// The only category of codes an entity of this type is queried for.
    pub fn category(&self) -> ObisCategory {
        match self {
            Self::Consumer => ObisCategory::Consumption,
            Self::Producer => ObisCategory::Production,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consumer" => Ok(Self::Consumer),
            "producer" => Ok(Self::Producer),
            other => Err(format!("unknown entity type '{other}'")),
        }
    }
}

/// Long-form reading: one per (year, month, meter_id, obis_code).
///
/// Unavailable records carry no value and never reach the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeteringRecord {
    pub year: i32,
    pub month: u8,
    pub entity_type: EntityType,
    pub entity_name: String,
    pub meter_id: String,
    pub obis_code: String,
    pub category: ObisCategory,
    pub description: String,
    pub value: Option<f64>,
    pub unit: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    pub calculated: Option<bool>,
    pub source_type: Option<String>,
    pub available: bool,
}

impl MeteringRecord {
    /// Value if the record is available.
    pub fn available_value(&self) -> Option<f64> {
        if self.available {
            self.value
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u8,
    pub obis_code: String,
    pub category: ObisCategory,
    pub description: String,
    pub total_value: f64,
    pub num_meters: i64,
    pub unit: String,
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Group available records by code and aggregate them into per-code totals.
///
/// `num_meters` counts distinct contributing entities. Output is ordered by code.
pub fn summarize(year: i32, month: u8, records: &[MeteringRecord]) -> Vec<MonthlySummary> {
    struct Acc<'a> {
        total: f64,
        entities: BTreeSet<&'a str>,
        unit: &'a str,
    }

    let mut groups: BTreeMap<(&str, ObisCategory, &str), Acc<'_>> = BTreeMap::new();

    for r in records {
        let Some(value) = r.available_value() else {
            continue;
        };
        let acc = groups
            .entry((r.obis_code.as_str(), r.category, r.description.as_str()))
            .or_insert_with(|| Acc {
                total: 0.0,
                entities: BTreeSet::new(),
                unit: r.unit.as_str(),
            });
        acc.total += value;
        acc.entities.insert(r.entity_name.as_str());
    }

    groups
        .into_iter()
        .map(|((code, category, description), acc)| MonthlySummary {
            year,
            month,
            obis_code: code.to_string(),
            category,
            description: description.to_string(),
            total_value: round2(acc.total),
            num_meters: acc.entities.len() as i64,
            unit: acc.unit.to_string(),
        })
        .collect()
}

fn decode_err(column: &str, msg: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: msg.into(),
    }
}

fn month_column(row: &PgRow) -> Result<u8, sqlx::Error> {
    let raw: i16 = row.try_get("month")?;
    u8::try_from(raw).map_err(|e| decode_err("month", e.to_string()))
}

impl<'r> FromRow<'r, PgRow> for MeteringRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let entity_type: String = row.try_get("entity_type")?;
        let category: String = row.try_get("obis_category")?;
        let value: f64 = row.try_get("value")?;
        let unit: Option<String> = row.try_get("unit")?;

        Ok(Self {
            year: row.try_get("year")?,
            month: month_column(row)?,
            entity_type: entity_type.parse().map_err(|e| decode_err("entity_type", e))?,
            entity_name: row.try_get("entity_name")?,
            meter_id: row.try_get("meter_id")?,
            obis_code: row.try_get("obis_code")?,
            category: category.parse().map_err(|e| decode_err("obis_category", e))?,
            description: row.try_get("obis_description")?,
            value: Some(value),
            unit: unit.unwrap_or_default(),
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            calculated: row.try_get("calculated")?,
            source_type: row.try_get("source_type")?,
            available: true,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for MonthlySummary {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let category: String = row.try_get("obis_category")?;
        let unit: Option<String> = row.try_get("unit")?;

        Ok(Self {
            year: row.try_get("year")?,
            month: month_column(row)?,
            obis_code: row.try_get("obis_code")?,
            category: category.parse().map_err(|e| decode_err("obis_category", e))?,
            description: row.try_get("obis_description")?,
            total_value: row.try_get("total_value")?,
            num_meters: row.try_get("num_meters")?,
            unit: unit.unwrap_or_default(),
        })
    }
}
