use serde::Deserialize;
use std::{fs, path::PathBuf};

use leneda_client::domain::ObisCatalog;

use crate::pipeline::{Entity, PipelineError, Roster};

#[derive(Debug, Clone, Deserialize)]
pub struct LenedaConfig {
    pub base_url: String,
    #[serde(default = "default_metering_data_path")]
    pub metering_data_path: String,
    #[serde(default = "default_energy_id_header")]
    pub energy_id_header: String,
    pub energy_id: String,
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_metering_data_path() -> String {
    "/api/metering-points/".to_string()
}

fn default_energy_id_header() -> String {
    "X-ENERGY-ID".to_string()
}

fn default_api_key_header() -> String {
    "X-API-KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObisCodeConfig {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub leneda: LenedaConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub consumers: Vec<Entity>,
    #[serde(default)]
    pub producers: Vec<Entity>,
    #[serde(default)]
    pub obis_codes: Vec<ObisCodeConfig>,
    pub metrics: Option<MetricsConfig>,
    pub export: Option<ExportConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("LENEDA_CONFIG").unwrap_or_else(|_| "leneda-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        let cfg: AppConfig = toml::from_str(&contents)?;
        Ok(cfg)
    }

    pub fn catalog(&self) -> Result<ObisCatalog, PipelineError> {
        let catalog = ObisCatalog::new(
            self.obis_codes
                .iter()
                .map(|c| (c.code.clone(), c.description.clone())),
        )?;
        if catalog.is_empty() {
            return Err(PipelineError::Catalog("no OBIS codes configured".to_string()));
        }
        Ok(catalog)
    }

    pub fn roster(&self) -> Result<Roster, PipelineError> {
        let roster = Roster {
            consumers: self.consumers.clone(),
            producers: self.producers.clone(),
        };
        roster.validate()?;
        Ok(roster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leneda_client::domain::ObisCategory;

    const SAMPLE: &str = r#"
        [leneda]
        base_url = "https://api.leneda.example"
        energy_id = "LUXE-XX-YY-1234"
        api_key = "secret"

        [database]
        uri = "postgres://localhost/energy"
        max_connections = 2

        [[consumers]]
        name = "School"
        meter_id = "LU0000000000000000000000000000001"

        [[producers]]
        name = "Rooftop PV"
        meter_id = "LU0000000000000000000000000000002"

        [[obis_codes]]
        code = "1-1:1.29.0"
        description = "Measured active consumption"

        [[obis_codes]]
        code = "1-1:2.29.0"
        description = "Measured active production"
    "#;

    #[test]
    fn parses_sample_with_defaults() {
        let cfg: AppConfig = toml::from_str(SAMPLE).unwrap();

        assert_eq!(cfg.leneda.metering_data_path, "/api/metering-points/");
        assert_eq!(cfg.leneda.api_key_header, "X-API-KEY");
        assert_eq!(cfg.leneda.timeout_secs, 30);
        assert!(cfg.metrics.is_none());

        let catalog = cfg.catalog().unwrap();
        assert_eq!(catalog.codes_for(ObisCategory::Consumption).count(), 1);
        assert_eq!(catalog.codes_for(ObisCategory::Production).count(), 1);

        let roster = cfg.roster().unwrap();
        assert_eq!(roster.consumers[0].name, "School");
    }

    #[test]
    fn empty_catalog_is_rejected() {
        let mut cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        cfg.obis_codes.clear();
        assert!(matches!(cfg.catalog(), Err(PipelineError::Catalog(_))));
    }

    #[test]
    fn reactive_codes_are_rejected_at_load() {
        let mut cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        cfg.obis_codes.push(ObisCodeConfig {
            code: "1-1:3.29.0".into(),
            description: "Measured reactive consumption".into(),
        });
        assert!(matches!(cfg.catalog(), Err(PipelineError::Domain(_))));
    }
}
