use leneda_client::domain::{metering::round2, summarize, MeteringRecord, MonthlySummary, Period};
use sqlx::{postgres::PgPool, Postgres, QueryBuilder, Transaction};

use crate::pipeline::{PeriodSink, PersistOutcome, PipelineError};

pub const SCHEMA_SQL: &str = include_str!("../../sql/schema/01_metering.sql");

// 14 binds per detail row keeps each statement well under the 65535 bind limit.
const INSERT_CHUNK: usize = 1000;

/// Period-scoped store for detail records and their per-code summaries.
///
/// A replace deletes the period's rows and inserts the new set inside one
/// transaction, so re-running a period never duplicates and a failure leaves
/// the previous rows untouched. Concurrent replaces of the same period must be
/// serialized by the caller.
pub struct PgPeriodStore {
    pool: PgPool,
}

/// Detail rows and summaries that a replace of `period` writes.
///
/// Only available records are kept, with values rounded to two decimals.
pub fn prepare_period(
    period: &Period,
    records: &[MeteringRecord],
) -> Result<(Vec<MeteringRecord>, Vec<MonthlySummary>), PipelineError> {
    if let Some(stray) = records
        .iter()
        .find(|r| r.year != period.year || r.month != period.month)
    {
        return Err(PipelineError::PersistFailed(format!(
            "record for {:04}-{:02} passed to the {period} replace",
            stray.year, stray.month
        )));
    }

    let rows: Vec<MeteringRecord> = records
        .iter()
        .filter_map(|r| {
            r.available_value().map(|v| MeteringRecord {
                value: Some(round2(v)),
                ..r.clone()
            })
        })
        .collect();
    let summaries = summarize(period.year, period.month, &rows);

    Ok((rows, summaries))
}

fn nullable(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

impl PgPeriodStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<(), PipelineError> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::PersistFailed(format!("schema setup failed: {e}")))?;
        Ok(())
    }

    async fn replace_in_tx(
        &self,
        period: &Period,
        rows: &[MeteringRecord],
        summaries: &[MonthlySummary],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM metering_data WHERE year = $1 AND month = $2")
            .bind(period.year)
            .bind(i16::from(period.month))
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM monthly_summaries WHERE year = $1 AND month = $2")
            .bind(period.year)
            .bind(i16::from(period.month))
            .execute(&mut *tx)
            .await?;

        for chunk in rows.chunks(INSERT_CHUNK) {
            insert_records(&mut tx, chunk).await?;
        }
        for chunk in summaries.chunks(INSERT_CHUNK) {
            insert_summaries(&mut tx, chunk).await?;
        }

        // Dropping the transaction without commit rolls everything back.
        tx.commit().await
    }
}

async fn insert_records(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[MeteringRecord],
) -> Result<(), sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO metering_data (year, month, entity_type, entity_name, meter_id, obis_code, \
         obis_category, obis_description, value, unit, started_at, ended_at, calculated, \
         source_type) ",
    );

    builder.push_values(rows, |mut b, r| {
        b.push_bind(r.year)
            .push_bind(i16::from(r.month))
            .push_bind(r.entity_type.as_str())
            .push_bind(&r.entity_name)
            .push_bind(&r.meter_id)
            .push_bind(&r.obis_code)
            .push_bind(r.category.as_str())
            .push_bind(&r.description)
            .push_bind(r.value)
            .push_bind(nullable(&r.unit))
            .push_bind(r.started_at)
            .push_bind(r.ended_at)
            .push_bind(r.calculated)
            .push_bind(&r.source_type);
    });

    builder.build().execute(&mut **tx).await.map(|_| ())
}

async fn insert_summaries(
    tx: &mut Transaction<'_, Postgres>,
    summaries: &[MonthlySummary],
) -> Result<(), sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO monthly_summaries (year, month, obis_code, obis_category, obis_description, \
         total_value, num_meters, unit) ",
    );

    builder.push_values(summaries, |mut b, s| {
        b.push_bind(s.year)
            .push_bind(i16::from(s.month))
            .push_bind(&s.obis_code)
            .push_bind(s.category.as_str())
            .push_bind(&s.description)
            .push_bind(s.total_value)
            .push_bind(s.num_meters)
            .push_bind(nullable(&s.unit));
    });

    builder.build().execute(&mut **tx).await.map(|_| ())
}

#[async_trait::async_trait]
impl PeriodSink for PgPeriodStore {
    async fn replace_period(
        &self,
        period: &Period,
        records: &[MeteringRecord],
    ) -> Result<PersistOutcome, PipelineError> {
        let (rows, summaries) = prepare_period(period, records)?;

        if rows.is_empty() {
            tracing::warn!(%period, "no available records, keeping previously stored data");
            return Ok(PersistOutcome::Skipped);
        }

        match self.replace_in_tx(period, &rows, &summaries).await {
            Ok(()) => {
                metrics::counter!("metering_store_records_written_total")
                    .increment(rows.len() as u64);
                tracing::info!(
                    %period,
                    records = rows.len(),
                    summaries = summaries.len(),
                    "replaced stored data for period"
                );
                Ok(PersistOutcome::Replaced {
                    records: rows.len(),
                    summaries: summaries.len(),
                })
            }
            Err(e) => {
                metrics::counter!("metering_store_errors_total").increment(1);
                tracing::error!(%period, error = %e, "replace failed, transaction rolled back");
                Err(PipelineError::PersistFailed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leneda_client::{
        db::metering_queries::{load_metering_records, load_monthly_summaries},
        domain::{EntityType, ObisCategory},
    };
    use pretty_assertions::assert_eq;

    fn record(
        period: &Period,
        name: &str,
        meter: &str,
        code: &str,
        value: Option<f64>,
    ) -> MeteringRecord {
        let category = leneda_client::domain::classify(code).unwrap();
        MeteringRecord {
            year: period.year,
            month: period.month,
            entity_type: match category {
                ObisCategory::Consumption => EntityType::Consumer,
                ObisCategory::Production => EntityType::Producer,
            },
            entity_name: name.into(),
            meter_id: meter.into(),
            obis_code: code.into(),
            category,
            description: format!("desc {code}"),
            value,
            unit: if value.is_some() { "kWh".into() } else { String::new() },
            started_at: None,
            ended_at: None,
            calculated: value.map(|_| true),
            source_type: value.map(|_| "Actual".to_string()),
            available: value.is_some(),
        }
    }

    #[test]
    fn prepare_keeps_available_rounded_rows() {
        let period = Period::for_month(2024, 3).unwrap();
        let records = vec![
            record(&period, "A", "m-a", "1-1:1.29.0", Some(10.126)),
            record(&period, "A", "m-a", "1-65:1.29.9", None),
            record(&period, "B", "m-b", "1-1:1.29.0", Some(4.0)),
        ];

        let (rows, summaries) = prepare_period(&period, &records).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, Some(10.13));
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].total_value, 14.13);
        assert_eq!(summaries[0].num_meters, 2);
    }

    #[test]
    fn prepare_is_deterministic() {
        let period = Period::for_month(2024, 3).unwrap();
        let records = vec![
            record(&period, "A", "m-a", "1-1:1.29.0", Some(1.0)),
            record(&period, "P", "m-p", "1-1:2.29.0", Some(2.0)),
        ];

        let first = prepare_period(&period, &records).unwrap();
        let second = prepare_period(&period, &records).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn prepare_rejects_records_from_other_periods() {
        let period = Period::for_month(2024, 3).unwrap();
        let other = Period::for_month(2024, 2).unwrap();
        let records = vec![record(&other, "A", "m-a", "1-1:1.29.0", Some(1.0))];

        assert!(matches!(
            prepare_period(&period, &records),
            Err(PipelineError::PersistFailed(_))
        ));
    }

    async fn live_store() -> PgPeriodStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.unwrap();
        let store = PgPeriodStore::new(pool);
        store.ensure_schema().await.unwrap();
        store
    }

    #[tokio::test]
    #[ignore = "requires a Postgres database in DATABASE_URL"]
    async fn replace_is_idempotent_and_atomic() {
        let store = live_store().await;
        let period = Period::for_month(2099, 7).unwrap();
        let records = vec![
            record(&period, "A", "m-a", "1-1:1.29.0", Some(100.0)),
            record(&period, "A", "m-a", "1-65:1.29.9", Some(30.0)),
            record(&period, "P", "m-p", "1-1:2.29.0", Some(55.555)),
            record(&period, "P", "m-p", "1-65:2.29.9", None),
        ];

        let (year, month) = (period.year, period.month);

        store.replace_period(&period, &records).await.unwrap();
        let once = load_metering_records(store.pool(), year, month).await.unwrap();
        let once_summaries = load_monthly_summaries(store.pool(), year, month).await.unwrap();

        store.replace_period(&period, &records).await.unwrap();
        let twice = load_metering_records(store.pool(), year, month).await.unwrap();
        let twice_summaries = load_monthly_summaries(store.pool(), year, month).await.unwrap();

        assert_eq!(once.len(), 3);
        assert_eq!(once, twice);
        assert_eq!(once_summaries, twice_summaries);

        // Duplicate key violates the primary key; the earlier state must survive.
        let mut dup = records.clone();
        dup.push(record(&period, "A", "m-a", "1-1:1.29.0", Some(1.0)));
        let err = store.replace_period(&period, &dup).await.unwrap_err();
        assert!(matches!(err, PipelineError::PersistFailed(_)));

        let after = load_metering_records(store.pool(), year, month).await.unwrap();
        assert_eq!(after, once);

        // An all-unavailable run keeps what is stored.
        let outage: Vec<_> = records
            .iter()
            .map(|r| MeteringRecord {
                value: None,
                available: false,
                ..r.clone()
            })
            .collect();
        assert_eq!(
            store.replace_period(&period, &outage).await.unwrap(),
            PersistOutcome::Skipped
        );
    }
}
