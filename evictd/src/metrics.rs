//! Prometheus query client for probe latency series.
//!
//! Pulls the blackbox-exporter ICMP probe metric over the HTTP range-query
//! API and reshapes the matrix response into per-link time series. The
//! HTTP call runs on the blocking pool so the tick timer and the shutdown
//! signal stay responsive while a fetch is in flight.

use chrono::{DateTime, Utc};
use evict_core::{Link, Sample, TimeSeries};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Probe latency metric exposed by blackbox_exporter.
const PROBE_LATENCY_QUERY: &str = r#"probe_duration_seconds{ping!=""}"#;
const LABEL_INSTANCE: &str = "instance";
const LABEL_PING: &str = "ping";
const QUERY_STEP: &str = "1s";

/// Extra lookback on top of the requested window so the sustain assertions
/// always have trailing samples despite scrape jitter.
const FETCH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics query failed: {0}")]
    Http(#[from] ureq::Error),
    #[error("failed to decode metrics response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("metrics backend reported query status {0:?}")]
    QueryFailed(String),
    #[error("unexpected result type {0:?}, expected a range matrix")]
    UnexpectedResultType(String),
    #[error("metrics fetch task was aborted")]
    FetchAborted,
}

#[derive(Debug, Deserialize)]
struct QueryRangeResponse {
    status: String,
    #[serde(default)]
    data: QueryData,
}

#[derive(Debug, Default, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType", default)]
    result_type: String,
    #[serde(default)]
    result: Vec<MatrixSeries>,
}

#[derive(Debug, Deserialize)]
struct MatrixSeries {
    metric: HashMap<String, String>,
    /// `[unix_seconds, "value"]` pairs.
    values: Vec<(f64, String)>,
}

/// Client for the metrics backend's range-query endpoint.
#[derive(Clone)]
pub struct MetricsClient {
    base_url: String,
    agent: ureq::Agent,
}

impl MetricsClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            base_url: address.into(),
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    /// Fetch one latency series per directional probe link, covering at
    /// least `window` plus a fixed safety margin back from now.
    ///
    /// An empty mapping is a valid result; the caller decides how loudly
    /// to report a no-data cycle.
    pub async fn fetch_latency_series(
        &self,
        window: Duration,
    ) -> Result<HashMap<Link, TimeSeries>, MetricsError> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.query_range(window + FETCH_MARGIN))
            .await
            .map_err(|_| MetricsError::FetchAborted)?
    }

    fn query_range(&self, lookback: Duration) -> Result<HashMap<Link, TimeSeries>, MetricsError> {
        let end = Utc::now().timestamp();
        let start = end - lookback.as_secs().min(i64::MAX as u64) as i64;
        let url = format!("{}/api/v1/query_range", self.base_url.trim_end_matches('/'));

        let mut response = self
            .agent
            .get(&url)
            .query("query", PROBE_LATENCY_QUERY)
            .query("start", start.to_string())
            .query("end", end.to_string())
            .query("step", QUERY_STEP)
            .call()?;
        let body = response.body_mut().read_to_string()?;
        debug!(url = %url, bytes = body.len(), "range query completed");

        parse_matrix(&body)
    }
}

fn parse_matrix(body: &str) -> Result<HashMap<Link, TimeSeries>, MetricsError> {
    let response: QueryRangeResponse = serde_json::from_str(body)?;
    if response.status != "success" {
        return Err(MetricsError::QueryFailed(response.status));
    }
    if response.data.result_type != "matrix" {
        return Err(MetricsError::UnexpectedResultType(
            response.data.result_type,
        ));
    }

    let mut series_by_link = HashMap::with_capacity(response.data.result.len());
    for series in response.data.result {
        let (Some(from), Some(to)) = (
            series.metric.get(LABEL_INSTANCE),
            series.metric.get(LABEL_PING),
        ) else {
            debug!(labels = ?series.metric, "skipping series without probe labels");
            continue;
        };
        let samples = series
            .values
            .iter()
            .filter_map(|(ts, value)| parse_sample(*ts, value))
            .collect();
        series_by_link.insert(Link::new(from, to), TimeSeries::new(samples));
    }
    Ok(series_by_link)
}

fn parse_sample(unix_seconds: f64, value: &str) -> Option<Sample> {
    if !unix_seconds.is_finite() {
        return None;
    }
    let timestamp = DateTime::from_timestamp_millis((unix_seconds * 1000.0) as i64)?;
    let seconds: f64 = value.parse().ok()?;
    let latency = Duration::try_from_secs_f64(seconds).ok()?;
    Some(Sample { timestamp, latency })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATRIX_BODY: &str = r#"{
        "status": "success",
        "data": {
            "resultType": "matrix",
            "result": [
                {
                    "metric": {"instance": "10.0.0.1", "ping": "10.0.0.2"},
                    "values": [[1700000000, "0.002"], [1700000001, "0.003"]]
                },
                {
                    "metric": {"instance": "10.0.0.2", "ping": "10.0.0.1"},
                    "values": [[1700000000, "1.5"]]
                }
            ]
        }
    }"#;

    #[test]
    fn parses_matrix_into_links() {
        let map = parse_matrix(MATRIX_BODY).unwrap();
        assert_eq!(map.len(), 2);
        let series = &map[&Link::new("10.0.0.1", "10.0.0.2")];
        assert_eq!(series.len(), 2);
        assert_eq!(series.samples()[0].latency, Duration::from_millis(2));
        assert_eq!(
            series.samples()[0].timestamp,
            DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
        );
    }

    #[test]
    fn empty_result_is_valid() {
        let body = r#"{"status":"success","data":{"resultType":"matrix","result":[]}}"#;
        let map = parse_matrix(body).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn non_success_status_is_an_error() {
        let body = r#"{"status":"error","data":{"resultType":"matrix","result":[]}}"#;
        let err = parse_matrix(body).unwrap_err();
        assert!(matches!(err, MetricsError::QueryFailed(status) if status == "error"));
    }

    #[test]
    fn vector_result_type_is_rejected() {
        let body = r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#;
        let err = parse_matrix(body).unwrap_err();
        assert!(matches!(err, MetricsError::UnexpectedResultType(t) if t == "vector"));
    }

    #[test]
    fn series_missing_probe_labels_is_skipped() {
        let body = r#"{
            "status": "success",
            "data": {
                "resultType": "matrix",
                "result": [
                    {"metric": {"instance": "10.0.0.1"}, "values": [[1700000000, "0.002"]]},
                    {"metric": {"instance": "10.0.0.1", "ping": "10.0.0.2"}, "values": []}
                ]
            }
        }"#;
        let map = parse_matrix(body).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn unparsable_and_negative_values_are_dropped() {
        let body = r#"{
            "status": "success",
            "data": {
                "resultType": "matrix",
                "result": [
                    {
                        "metric": {"instance": "a", "ping": "b"},
                        "values": [[1700000000, "NaN"], [1700000001, "-1"], [1700000002, "0.5"]]
                    }
                ]
            }
        }"#;
        let map = parse_matrix(body).unwrap();
        let series = &map[&Link::new("a", "b")];
        assert_eq!(series.len(), 1);
        assert_eq!(series.samples()[0].latency, Duration::from_millis(500));
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        assert!(matches!(
            parse_matrix("not json").unwrap_err(),
            MetricsError::Decode(_)
        ));
    }
}
