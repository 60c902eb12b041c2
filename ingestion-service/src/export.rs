use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use leneda_client::{
    analytics::{RatioReport, WideFormatTable},
    domain::{metering::round2, MeteringRecord, Period},
};
use serde::Serialize;

use crate::pipeline::PipelineError;

pub const DETAIL_COLUMNS: [&str; 10] = [
    "year",
    "month",
    "entity_type",
    "entity_name",
    "meter_id",
    "obis_code",
    "obis_category",
    "obis_description",
    "value",
    "unit",
];

#[derive(Serialize)]
struct DetailRow<'a> {
    year: i32,
    month: u8,
    entity_type: &'a str,
    entity_name: &'a str,
    meter_id: &'a str,
    obis_code: &'a str,
    obis_category: &'a str,
    obis_description: &'a str,
    value: f64,
    unit: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub wide_csv: Option<PathBuf>,
    pub detail_csv: PathBuf,
    pub json: PathBuf,
}

fn export_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Export(e.to_string())
}

/// Wide table as CSV, trailer rows included. An empty table writes nothing.
pub fn write_wide_csv<W: Write>(table: &WideFormatTable, writer: W) -> Result<(), PipelineError> {
    if table.is_empty() {
        return Ok(());
    }

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(table.columns()).map_err(export_err)?;
    for row in table.to_cells() {
        wtr.write_record(row.iter().map(|c| c.render())).map_err(export_err)?;
    }
    wtr.flush().map_err(export_err)?;
    Ok(())
}

/// Available records only, values rounded to two decimals.
///
/// The header row is always written, even when nothing is available.
pub fn write_detail_csv<W: Write>(
    records: &[MeteringRecord],
    writer: W,
) -> Result<(), PipelineError> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(DETAIL_COLUMNS).map_err(export_err)?;
    for r in records {
        let Some(value) = r.available_value() else {
            continue;
        };
        wtr.serialize(DetailRow {
            year: r.year,
            month: r.month,
            entity_type: r.entity_type.as_str(),
            entity_name: &r.entity_name,
            meter_id: &r.meter_id,
            obis_code: &r.obis_code,
            obis_category: r.category.as_str(),
            obis_description: &r.description,
            value: round2(value),
            unit: &r.unit,
        })
        .map_err(export_err)?;
    }
    wtr.flush().map_err(export_err)?;
    Ok(())
}

/// Period, ratio report and every record of the run, unavailable ones included.
pub fn period_document(
    period: &Period,
    ratios: &RatioReport,
    records: &[MeteringRecord],
) -> serde_json::Value {
    serde_json::json!({
        "period": {
            "year": period.year,
            "month": period.month,
            "start_date": period.start_date.to_string(),
            "end_date": period.end_date.to_string(),
        },
        "ratios": ratios,
        "records": records,
    })
}

/// Write `energy_data_YYYY_MM.{csv,json}` and `energy_data_YYYY_MM_detail.csv` into `dir`.
pub fn export_period(
    dir: &Path,
    period: &Period,
    table: &WideFormatTable,
    ratios: &RatioReport,
    records: &[MeteringRecord],
) -> Result<ExportPaths, PipelineError> {
    fs::create_dir_all(dir).map_err(export_err)?;
    let stem = format!("energy_data_{:04}_{:02}", period.year, period.month);

    let wide_csv = if table.is_empty() {
        tracing::warn!(%period, "no available records, skipping wide CSV");
        None
    } else {
        let path = dir.join(format!("{stem}.csv"));
        write_wide_csv(table, File::create(&path).map_err(export_err)?)?;
        Some(path)
    };

    let detail_csv = dir.join(format!("{stem}_detail.csv"));
    write_detail_csv(records, File::create(&detail_csv).map_err(export_err)?)?;

    let json = dir.join(format!("{stem}.json"));
    let doc = period_document(period, ratios, records);
    let file = File::create(&json).map_err(export_err)?;
    serde_json::to_writer_pretty(file, &doc).map_err(export_err)?;

    tracing::info!(
        dir = %dir.display(),
        wide_csv = wide_csv.is_some(),
        "exported period files"
    );

    Ok(ExportPaths {
        wide_csv,
        detail_csv,
        json,
    })
}
