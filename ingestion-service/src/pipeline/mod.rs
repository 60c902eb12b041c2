use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Instant,
};

use futures::{stream, StreamExt};
use leneda_client::{
    domain::{
        metering::round2, EntityType, MeteringRecord, ObisCatalog, ObisCodeDefinition, Period,
    },
    DomainError,
};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::transform;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("catalog error: {0}")]
    Catalog(String),
    #[error("roster error: {0}")]
    Roster(String),
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    #[error("persist failed: {0}")]
    PersistFailed(String),
    #[error("export error: {0}")]
    Export(String),
    #[error("config error: {0}")]
    Config(String),
}

/// Single aggregated point returned for a (meter, code, period).
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub value: f64,
    pub unit: String,
    pub started_at: Option<OffsetDateTime>,
    pub ended_at: Option<OffsetDateTime>,
    pub calculated: Option<bool>,
    pub source_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnavailableReason {
    NotFound,
    EmptySeries,
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Reading(Reading),
    Unavailable(UnavailableReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Replaced { records: usize, summaries: usize },
    /// Nothing available to store; the period's previous rows were kept.
    Skipped,
}

#[async_trait::async_trait]
pub trait MeteringSource: Send + Sync {
    async fn fetch(
        &self,
        meter_id: &str,
        obis_code: &str,
        period: &Period,
    ) -> Result<FetchOutcome, PipelineError>;
}

#[async_trait::async_trait]
pub trait PeriodSink: Send + Sync {
    /// Replace everything stored for `period` with `records`, atomically.
    async fn replace_period(
        &self,
        period: &Period,
        records: &[MeteringRecord],
    ) -> Result<PersistOutcome, PipelineError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Entity {
    pub name: String,
    pub meter_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    pub consumers: Vec<Entity>,
    pub producers: Vec<Entity>,
}

impl Roster {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.consumers.is_empty() && self.producers.is_empty() {
            return Err(PipelineError::Roster("no consumers or producers configured".to_string()));
        }

        for (kind, entities) in [("consumer", &self.consumers), ("producer", &self.producers)] {
            let mut meters = BTreeSet::new();
            for e in entities {
                if e.name.trim().is_empty() || e.meter_id.trim().is_empty() {
                    return Err(PipelineError::Roster(format!(
                        "{kind} entry needs both name and meter_id (got name='{}', meter_id='{}')",
                        e.name, e.meter_id
                    )));
                }
                if !meters.insert(e.meter_id.as_str()) {
                    return Err(PipelineError::Roster(format!(
                        "{kind} meter '{}' listed twice",
                        e.meter_id
                    )));
                }
            }
        }

        Ok(())
    }

    fn entities(&self) -> impl Iterator<Item = (EntityType, &Entity)> + '_ {
        self.consumers
            .iter()
            .map(|e| (EntityType::Consumer, e))
            .chain(self.producers.iter().map(|e| (EntityType::Producer, e)))
    }
}

/// Fans one call per (entity, code) out to a [`MeteringSource`].
///
/// Consumers are only asked for consumption codes and producers only for
/// production codes. Every call yields exactly one record.
pub struct FetchOrchestrator<S> {
    source: S,
    catalog: Arc<ObisCatalog>,
    roster: Roster,
    concurrency: usize,
}

impl<S: MeteringSource> FetchOrchestrator<S> {
    pub fn new(
        source: S,
        catalog: Arc<ObisCatalog>,
        roster: Roster,
        concurrency: usize,
    ) -> Result<Self, PipelineError> {
        if catalog.is_empty() {
            return Err(PipelineError::Catalog("catalog has no codes".to_string()));
        }
        roster.validate()?;

        Ok(Self {
            source,
            catalog,
            roster,
            concurrency: concurrency.max(1),
        })
    }

    pub fn catalog(&self) -> &ObisCatalog {
        &self.catalog
    }

    /// Planned (entity type, entity, code) calls, consumers first, in catalog order.
    fn plan(&self) -> Vec<(EntityType, &Entity, &ObisCodeDefinition)> {
        let catalog: &ObisCatalog = &self.catalog;
        self.roster
            .entities()
            .flat_map(move |(entity_type, entity)| {
                catalog
                    .codes_for(entity_type.category())
                    .map(move |def| (entity_type, entity, def))
            })
            .collect()
    }

    pub async fn run(&self, period: &Period) -> Result<Vec<MeteringRecord>, PipelineError> {
        let plan = self.plan();
        tracing::info!(
            period = %period,
            start_date = %period.start_date,
            end_date = %period.end_date,
            calls = plan.len(),
            concurrency = self.concurrency,
            "fetching metering data"
        );

        let mut slots: Vec<Option<MeteringRecord>> = vec![None; plan.len()];

        let mut completed = stream::iter(plan.into_iter().enumerate())
            .map(|(idx, (entity_type, entity, def))| async move {
                let reading = self.fetch_one(entity_type, entity, def, period).await;
                (idx, transform::materialize(period, entity_type, entity, def, reading))
            })
            .buffer_unordered(self.concurrency);

        while let Some((idx, record)) = completed.next().await {
            slots[idx] = Some(record);
        }

        Ok(slots.into_iter().flatten().collect())
    }

    async fn fetch_one(
        &self,
        entity_type: EntityType,
        entity: &Entity,
        def: &ObisCodeDefinition,
        period: &Period,
    ) -> Option<Reading> {
        metrics::counter!("leneda_fetch_requests_total").increment(1);
        let started = Instant::now();
        let outcome = self.source.fetch(&entity.meter_id, &def.code, period).await;
        metrics::histogram!("leneda_fetch_latency_seconds").record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(FetchOutcome::Reading(reading)) => {
                match transform::validate_reading(&reading, period) {
                    Ok(()) => {
                        tracing::debug!(
                            %entity_type,
                            entity = %entity.name,
                            obis_code = %def.code,
                            value = reading.value,
                            unit = %reading.unit,
                            "reading fetched"
                        );
                        Some(reading)
                    }
                    Err(e) => {
                        metrics::counter!("leneda_fetch_unavailable_total").increment(1);
                        tracing::warn!(
                            entity = %entity.name,
                            obis_code = %def.code,
                            error = %e,
                            "rejected reading"
                        );
                        None
                    }
                }
            }
            Ok(FetchOutcome::Unavailable(reason)) => {
                metrics::counter!("leneda_fetch_unavailable_total").increment(1);
                tracing::debug!(
                    entity = %entity.name,
                    obis_code = %def.code,
                    ?reason,
                    "no data available"
                );
                None
            }
            Err(e) => {
                metrics::counter!("leneda_fetch_failed_total").increment(1);
                tracing::warn!(
                    entity = %entity.name,
                    meter_id = %entity.meter_id,
                    obis_code = %def.code,
                    error = %e,
                    "fetch failed, recording as unavailable"
                );
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityTypeStats {
    pub entities: usize,
    pub total_value: f64,
}

/// Outcome counts of one fetch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub calls: usize,
    pub available: usize,
    pub unavailable: usize,
    pub by_entity_type: BTreeMap<EntityType, EntityTypeStats>,
}

impl RunStats {
    pub fn from_records(records: &[MeteringRecord]) -> Self {
        let mut stats = Self {
            calls: records.len(),
            ..Self::default()
        };
        let mut names: BTreeMap<EntityType, BTreeSet<&str>> = BTreeMap::new();

        for r in records {
            let Some(value) = r.available_value() else {
                stats.unavailable += 1;
                continue;
            };
            stats.available += 1;
            stats.by_entity_type.entry(r.entity_type).or_default().total_value += round2(value);
            names.entry(r.entity_type).or_default().insert(r.entity_name.as_str());
        }

        for (entity_type, set) in names {
            if let Some(s) = stats.by_entity_type.get_mut(&entity_type) {
                s.entities = set.len();
                s.total_value = round2(s.total_value);
            }
        }

        stats
    }

    pub fn log(&self, period: &Period) {
        tracing::info!(
            %period,
            calls = self.calls,
            successful = self.available,
            failed = self.unavailable,
            "fetch summary"
        );
        for (entity_type, s) in &self.by_entity_type {
            tracing::info!(
                %entity_type,
                entities = s.entities,
                total_kwh = s.total_value,
                "fetch summary by entity type"
            );
        }
    }
}

/// Result of a full fetch-then-persist run.
#[derive(Debug, Clone)]
pub struct PeriodRun {
    pub period: Period,
    pub records: Vec<MeteringRecord>,
    pub stats: RunStats,
    pub persisted: PersistOutcome,
}

/// Fetch a whole period, then hand the complete record set to the sink.
pub struct Pipeline<S, K> {
    pub orchestrator: FetchOrchestrator<S>,
    pub sink: K,
}

impl<S, K> Pipeline<S, K>
where
    S: MeteringSource,
    K: PeriodSink,
{
    pub async fn run(&self, period: Period) -> Result<PeriodRun, PipelineError> {
        let records = self.orchestrator.run(&period).await?;
        let stats = RunStats::from_records(&records);
        stats.log(&period);

        let persisted = self.sink.replace_period(&period, &records).await?;

        Ok(PeriodRun {
            period,
            records,
            stats,
            persisted,
        })
    }
}
