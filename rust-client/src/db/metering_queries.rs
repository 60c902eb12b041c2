use anyhow::Result;
use sqlx::PgPool;

use crate::domain::{MeteringRecord, MonthlySummary};

/// Codes shown on the long-running trend view: metered and remaining energy per side.
pub const TREND_CODES: [&str; 4] = ["1-1:1.29.0", "1-1:2.29.0", "1-65:1.29.9", "1-65:2.29.9"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredPeriod {
    pub year: i32,
    pub month: i16,
}

/// All detail records persisted for one period.
pub async fn load_metering_records(
    pool: &PgPool,
    year: i32,
    month: u8,
) -> Result<Vec<MeteringRecord>> {
    let rows = sqlx::query_as::<_, MeteringRecord>(
        r#"
        SELECT
            year,
            month,
            entity_type,
            entity_name,
            meter_id,
            obis_code,
            obis_category,
            obis_description,
            value,
            unit,
            started_at,
            ended_at,
            calculated,
            source_type
        FROM metering_data
        WHERE year = $1
          AND month = $2
        ORDER BY entity_type, entity_name, meter_id, obis_code
        "#,
    )
    .bind(year)
    .bind(i16::from(month))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Per-code summaries persisted for one period.
pub async fn load_monthly_summaries(
    pool: &PgPool,
    year: i32,
    month: u8,
) -> Result<Vec<MonthlySummary>> {
    let rows = sqlx::query_as::<_, MonthlySummary>(
        r#"
        SELECT year, month, obis_code, obis_category, obis_description,
               total_value, num_meters, unit
        FROM monthly_summaries
        WHERE year = $1
          AND month = $2
        ORDER BY obis_code
        "#,
    )
    .bind(year)
    .bind(i16::from(month))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Periods that have detail records, newest first.
pub async fn available_periods(pool: &PgPool) -> Result<Vec<StoredPeriod>> {
    let rows = sqlx::query_as::<_, StoredPeriod>(
        r#"
        SELECT DISTINCT year, month
        FROM metering_data
        ORDER BY year DESC, month DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Summaries of the given codes across every stored period, oldest first.
pub async fn summary_trend(pool: &PgPool, codes: &[String]) -> Result<Vec<MonthlySummary>> {
    let rows = sqlx::query_as::<_, MonthlySummary>(
        r#"
        SELECT year, month, obis_code, obis_category, obis_description,
               total_value, num_meters, unit
        FROM monthly_summaries
        WHERE obis_code = ANY($1)
        ORDER BY year, month, obis_code
        "#,
    )
    .bind(codes)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
