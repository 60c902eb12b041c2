use anyhow::Result;
use leneda_client::{
    analytics::{compute_ratios, project},
    db::metering_queries::{
        available_periods, load_metering_records, load_monthly_summaries, summary_trend,
        TREND_CODES,
    },
    domain::Period,
};
use leneda_ingestion::{cli, config::AppConfig, export, observability};
use sqlx::postgres::PgPoolOptions;
use std::env;

const USAGE: &str = "usage: monthly_report [year] [month]";

/// Rebuild ratios and the wide table of a stored period without calling the API.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing("monthly_report");

    let cfg = AppConfig::load()?;
    let (year, month) = cli::period_args(env::args().skip(1), USAGE)?;
    let period = Period::resolve_now(year, month)?;
    let catalog = cfg.catalog()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let stored = available_periods(&pool).await?;
    tracing::info!(
        periods = stored.len(),
        latest = ?stored.first().map(|p| format!("{:04}-{:02}", p.year, p.month)),
        "stored periods"
    );

    let records = load_metering_records(&pool, period.year, period.month).await?;
    if records.is_empty() {
        tracing::warn!(%period, "nothing stored for period");
        return Ok(());
    }

    let summaries = load_monthly_summaries(&pool, period.year, period.month).await?;
    let ratios = compute_ratios(period.year, period.month, &records);
    let table = project(&catalog, &records);

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "period": period.to_string(),
            "ratios": ratios,
            "summaries": summaries,
        }))?
    );

    let trend_codes: Vec<String> = TREND_CODES.iter().map(|c| c.to_string()).collect();
    for s in summary_trend(&pool, &trend_codes).await? {
        tracing::info!(
            year = s.year,
            month = s.month,
            obis_code = %s.obis_code,
            total = s.total_value,
            meters = s.num_meters,
            "trend"
        );
    }

    if let Some(export_cfg) = &cfg.export {
        let paths =
            export::export_period(&export_cfg.output_dir, &period, &table, &ratios, &records)?;
        tracing::info!(detail = %paths.detail_csv.display(), "report files written");
    }

    Ok(())
}
