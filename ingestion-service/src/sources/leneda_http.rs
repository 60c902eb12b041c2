use std::time::Duration;

use leneda_client::domain::Period;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::{
    config::LenedaConfig,
    pipeline::{FetchOutcome, MeteringSource, PipelineError, Reading, UnavailableReason},
};

/// Client for the aggregated time-series endpoint of the metering API.
///
/// One GET per (meter, code, period), aggregated to a single point over the
/// whole period. 404s, empty series and undecodable payloads are reported as
/// [`FetchOutcome::Unavailable`]; timeouts and other statuses as errors.
#[derive(Clone)]
pub struct LenedaClient {
    client: Client,
    base_url: String,
    metering_data_path: String,
    energy_id_header: String,
    energy_id: String,
    api_key_header: String,
    api_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregatedResponse {
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    aggregated_time_series: Option<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregatedPoint {
    value: f64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    ended_at: Option<OffsetDateTime>,
    #[serde(default)]
    calculated: Option<bool>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

fn malformed(e: serde_json::Error) -> FetchOutcome {
    FetchOutcome::Unavailable(UnavailableReason::Malformed(e.to_string()))
}

/// Decode an aggregated time-series payload.
///
/// Only the first point is decoded; later points are ignored even if invalid.
pub fn parse_aggregated(body: &[u8]) -> FetchOutcome {
    let resp: AggregatedResponse = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => return malformed(e),
    };

    let Some(first) = resp
        .aggregated_time_series
        .and_then(|series| series.into_iter().next())
    else {
        return FetchOutcome::Unavailable(UnavailableReason::EmptySeries);
    };
    let point: AggregatedPoint = match serde_json::from_value(first) {
        Ok(p) => p,
        Err(e) => return malformed(e),
    };

    FetchOutcome::Reading(Reading {
        value: point.value,
        unit: resp.unit.unwrap_or_default(),
        started_at: point.started_at,
        ended_at: point.ended_at,
        calculated: point.calculated,
        source_type: point.kind,
    })
}

impl LenedaClient {
    pub fn new(cfg: &LenedaConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            metering_data_path: cfg.metering_data_path.clone(),
            energy_id_header: cfg.energy_id_header.clone(),
            energy_id: cfg.energy_id.clone(),
            api_key_header: cfg.api_key_header.clone(),
            api_key: cfg.api_key.clone(),
        })
    }

    fn series_url(&self, meter_id: &str) -> String {
        let path = self.metering_data_path.trim_matches('/');
        format!("{}/{}/{}/time-series/aggregated", self.base_url, path, meter_id)
    }
}

#[async_trait::async_trait]
impl MeteringSource for LenedaClient {
    async fn fetch(
        &self,
        meter_id: &str,
        obis_code: &str,
        period: &Period,
    ) -> Result<FetchOutcome, PipelineError> {
        let start_date = period.start_date.to_string();
        let end_date = period.end_date.to_string();

        let response = self
            .client
            .get(self.series_url(meter_id))
            .header(self.energy_id_header.as_str(), self.energy_id.as_str())
            .header(self.api_key_header.as_str(), self.api_key.as_str())
            .query(&[
                ("obisCode", obis_code),
                ("startDate", start_date.as_str()),
                ("endDate", end_date.as_str()),
                ("aggregationLevel", "Infinite"),
                ("transformationMode", "Accumulation"),
            ])
            .send()
            .await
            .map_err(|e| {
                let msg = if e.is_timeout() {
                    format!("request timeout for {meter_id} {obis_code}")
                } else {
                    format!("request error for {meter_id} {obis_code}: {e}")
                };
                PipelineError::FetchFailed(msg)
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(FetchOutcome::Unavailable(UnavailableReason::NotFound)),
            status if status.is_success() => {
                let body = response.bytes().await.map_err(|e| {
                    PipelineError::FetchFailed(format!(
                        "failed reading body for {meter_id} {obis_code}: {e}"
                    ))
                })?;
                Ok(parse_aggregated(&body))
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(PipelineError::FetchFailed(format!(
                    "status {status} for {meter_id} {obis_code}: {text}"
                )))
            }
        }
    }
}
