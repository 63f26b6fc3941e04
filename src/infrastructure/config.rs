use crate::application::aggregation_service::AggregationSettings;
use crate::domain::metric::{MetricDefinition, MetricKind, YAxisPosition};
use chrono::FixedOffset;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const CONFIG_FILE: &str = "config/settings";
const ENV_PREFIX: &str = "METER_INSIGHTS";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub source: SourceSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceSettings {
    pub host: String,
    pub token: String,
    #[serde(default = "default_source_path")]
    pub path: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_chart_ttl_secs")]
    pub chart_ttl_secs: u64,
    #[serde(default = "default_kpi_ttl_secs")]
    pub kpi_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            chart_ttl_secs: default_chart_ttl_secs(),
            kpi_ttl_secs: default_kpi_ttl_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AggregationConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_max_points")]
    pub max_points: u32,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            utc_offset_minutes: 0,
            max_points: default_max_points(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricKindConfig {
    Accumulator,
    Instantaneous,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricConfig {
    pub metric_type: String,
    pub telemetry_key: String,
    pub kind: MetricKindConfig,
    pub unit: String,
    #[serde(default)]
    pub y_axis: Option<String>,
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u32,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_source_path() -> String {
    "/api/plugins/telemetry/DEVICE/${entity_id}/values/timeseries".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_chart_ttl_secs() -> u64 {
    300
}

fn default_kpi_ttl_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_points() -> u32 {
    10_000
}

fn default_decimal_places() -> u32 {
    2
}

impl AppConfig {
    pub fn aggregation_settings(&self) -> anyhow::Result<AggregationSettings> {
        let offset_secs = self.aggregation.utc_offset_minutes * 60;
        let utc_offset = FixedOffset::east_opt(offset_secs).ok_or_else(|| {
            anyhow::anyhow!("utc_offset_minutes out of range: {}", self.aggregation.utc_offset_minutes)
        })?;

        Ok(AggregationSettings {
            timeout: Duration::from_secs(self.aggregation.timeout_secs),
            utc_offset,
            max_points: self.aggregation.max_points,
        })
    }

    pub fn metric_definitions(&self) -> Vec<MetricDefinition> {
        self.metrics.iter().map(MetricConfig::to_definition).collect()
    }
}

impl MetricConfig {
    pub fn to_definition(&self) -> MetricDefinition {
        let kind = match self.kind {
            MetricKindConfig::Accumulator => MetricKind::Accumulator,
            MetricKindConfig::Instantaneous => MetricKind::Instantaneous,
        };
        let y_axis_position = match self.y_axis.as_deref() {
            Some("right") => YAxisPosition::Right,
            _ => YAxisPosition::Left,
        };

        MetricDefinition::new(
            self.metric_type.clone(),
            self.telemetry_key.clone(),
            kind,
            self.unit.clone(),
            y_axis_position,
            self.decimal_places,
        )
    }
}

pub fn load_config() -> anyhow::Result<AppConfig> {
    build_config(config::File::with_name(CONFIG_FILE))
}

fn build_config<S>(file: S) -> anyhow::Result<AppConfig>
where
    S: config::Source + Send + Sync + 'static,
{
    let settings = config::Config::builder()
        .add_source(file)
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Replace template variables in a path or query string
pub fn prepare_path(template: &str, vars: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}
