// REST telemetry source implementation
use crate::application::telemetry_source::TelemetrySource;
use crate::domain::error::FetchError;
use crate::domain::telemetry::{Sample, TelemetryPayload, TelemetryQuery};
use crate::infrastructure::config::prepare_path;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpTelemetrySource {
    host: String,
    token: String,
    path_template: String,
    request_timeout: Duration,
    client: reqwest::Client,
}

/// One point as the REST API reports it; values arrive as numbers or
/// numeric strings.
#[derive(Debug, Deserialize)]
struct RawPoint {
    ts: i64,
    #[serde(default)]
    value: serde_json::Value,
}

type RawResponse = HashMap<String, Vec<RawPoint>>;

impl HttpTelemetrySource {
    pub fn new(
        host: String,
        token: String,
        path_template: String,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            token,
            path_template,
            request_timeout,
            client,
        })
    }

    fn build_query_url(&self, entity_id: &str, query: &TelemetryQuery) -> String {
        let mut vars = HashMap::new();
        vars.insert("entity_id".to_string(), urlencoding::encode(entity_id).into_owned());
        let path = prepare_path(&self.path_template, &vars);

        let mut params = vec![format!("keys={}", urlencoding::encode(&query.keys.join(",")))];
        if let Some(start) = query.start_ts {
            params.push(format!("startTs={}", start));
        }
        if let Some(end) = query.end_ts {
            params.push(format!("endTs={}", end));
        }
        if let Some(interval) = query.interval_ms {
            params.push(format!("interval={}", interval));
        }
        if let Some(agg) = query.aggregation {
            params.push(format!("agg={}", agg.as_str()));
        }
        if let Some(limit) = query.limit {
            params.push(format!("limit={}", limit));
        }
        if let Some(order) = query.order_by {
            params.push(format!("orderBy={}", order.as_str()));
        }

        format!("{}{}?{}", self.host, path, params.join("&"))
    }

    async fn execute_query(&self, url: &str) -> Result<RawResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .header("X-Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Transport(format!(
                "telemetry query failed with status {}: {}",
                status, body
            )));
        }

        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::DataShape(format!("failed to parse telemetry response: {}", e)))
    }

    fn transport_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.request_timeout)
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetrySource {
    async fn fetch(&self, entity_id: &str, query: &TelemetryQuery) -> Result<TelemetryPayload, FetchError> {
        let url = self.build_query_url(entity_id, query);
        tracing::debug!("Fetching telemetry for {}: {:?}", entity_id, query.keys);

        let raw = self.execute_query(&url).await?;
        let payload = into_payload(raw, &query.keys)?;

        tracing::debug!("Got {} samples for {}", payload.sample_count(), entity_id);
        Ok(payload)
    }
}

/// Validate a raw response into a payload holding every requested key.
///
/// The API omits keys that have no data in range; those become empty series.
fn into_payload(mut raw: RawResponse, keys: &[String]) -> Result<TelemetryPayload, FetchError> {
    let mut payload = TelemetryPayload::new();

    for key in keys {
        let points = raw.remove(key).unwrap_or_default();
        let samples = points
            .into_iter()
            .map(|point| to_sample(key, point))
            .collect::<Result<Vec<_>, _>>()?;
        payload.insert(key.clone(), samples);
    }

    Ok(payload)
}

fn to_sample(key: &str, point: RawPoint) -> Result<Sample, FetchError> {
    match &point.value {
        serde_json::Value::Null => Ok(Sample::empty(point.ts)),
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(|v| Sample::new(point.ts, v))
            .ok_or_else(|| FetchError::DataShape(format!("{}: unrepresentable number {}", key, n))),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(Sample::empty(point.ts)),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(|v| Sample::new(point.ts, v))
            .map_err(|_| FetchError::DataShape(format!("{}: non-numeric value '{}' at {}", key, s, point.ts))),
        other => Err(FetchError::DataShape(format!(
            "{}: unexpected value {} at {}",
            key, other, point.ts
        ))),
    }
}
