use anyhow::Result;
use leneda_client::{
    analytics::{compute_ratios, project},
    domain::Period,
};
use leneda_ingestion::{
    cli,
    config::AppConfig,
    export, metrics_server, observability,
    pipeline::{FetchOrchestrator, PersistOutcome, Pipeline},
    sinks::PgPeriodStore,
    sources::LenedaClient,
};
use sqlx::postgres::PgPoolOptions;
use std::{env, sync::Arc};

const USAGE: &str = "usage: leneda-ingestion [year] [month]";

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing("leneda_ingestion");

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let (year, month) = cli::period_args(env::args().skip(1), USAGE)?;
    let period = Period::resolve_now(year, month)?;

    let catalog = Arc::new(cfg.catalog()?);
    let roster = cfg.roster()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;
    let store = PgPeriodStore::new(pool);
    store.ensure_schema().await?;

    let client = LenedaClient::new(&cfg.leneda)?;
    let pipeline = Pipeline {
        orchestrator: FetchOrchestrator::new(
            client,
            Arc::clone(&catalog),
            roster,
            cfg.leneda.concurrency,
        )?,
        sink: store,
    };

    let run = pipeline.run(period).await?;
    if let PersistOutcome::Replaced { records, summaries } = run.persisted {
        tracing::info!(period = %run.period, records, summaries, "period stored");
    }

    let ratios = compute_ratios(run.period.year, run.period.month, &run.records);
    for (name, value) in ratios.entries() {
        tracing::info!(metric = name, value, "energy ratio");
    }

    let table = project(&catalog, &run.records);
    tracing::info!(
        rows = table.data_rows().len(),
        columns = table.columns().len(),
        "wide table built"
    );

    if let Some(export_cfg) = &cfg.export {
        let paths = export::export_period(
            &export_cfg.output_dir,
            &run.period,
            &table,
            &ratios,
            &run.records,
        )?;
        tracing::info!(json = %paths.json.display(), "export written");
    }

    if let Some(snapshot) = metrics_server::snapshot() {
        tracing::debug!(%snapshot, "metrics at end of run");
    }

    Ok(())
}
