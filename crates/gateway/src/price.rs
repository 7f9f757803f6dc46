//! Ground truth from the Yahoo Finance chart API.
//!
//! Pulls recent 5-minute bars for the reference symbol. The latest close is
//! the realized price; the last close at or before the reference instant is
//! what the price was when the forecast was made.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use common::config::SourcesConfig;
use common::{Error, GroundTruth, Result};
use serde::Deserialize;
use tracing::debug;

use crate::traits::GroundTruthSource;

// ── Chart response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    pub chart: ChartBody,
}

#[derive(Debug, Deserialize)]
pub struct ChartBody {
    #[serde(default)]
    pub result: Option<Vec<ChartResult>>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ChartResult {
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
pub struct ChartIndicators {
    #[serde(default)]
    pub quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
pub struct ChartQuote {
    /// Bars still forming come back as null.
    #[serde(default)]
    pub close: Vec<Option<f64>>,
}

impl ChartResponse {
    /// Non-null closes paired with their bar start times, oldest first.
    pub fn closes(&self) -> Result<Vec<(DateTime<Utc>, f64)>> {
        if let Some(err) = self.chart.error.as_ref().filter(|e| !e.is_null()) {
            return Err(Error::GroundTruth(format!("chart API error: {}", err)));
        }
        let result = self
            .chart
            .result
            .as_ref()
            .and_then(|r| r.first())
            .ok_or_else(|| Error::GroundTruth("chart response has no result".into()))?;
        let quote = result
            .indicators
            .quote
            .first()
            .ok_or_else(|| Error::GroundTruth("chart response has no quote".into()))?;

        let mut bars: Vec<(DateTime<Utc>, f64)> = result
            .timestamp
            .iter()
            .zip(&quote.close)
            .filter_map(|(ts, close)| {
                let close = close.filter(|c| c.is_finite())?;
                let at = Utc.timestamp_opt(*ts, 0).single()?;
                Some((at, close))
            })
            .collect();
        bars.sort_by_key(|(at, _)| *at);
        Ok(bars)
    }
}

/// Derive ground truth from a close series sorted oldest first.
pub fn ground_truth_from_series(
    bars: &[(DateTime<Utc>, f64)],
    reference: DateTime<Utc>,
) -> Result<GroundTruth> {
    let (latest_at, price_now) = bars
        .last()
        .copied()
        .ok_or_else(|| Error::GroundTruth("no closes in series".into()))?;
    let (reference_at, price_at_reference) = bars
        .iter()
        .rev()
        .find(|(at, _)| *at <= reference)
        .copied()
        .ok_or_else(|| {
            Error::GroundTruth(format!("no close at or before reference {}", reference))
        })?;

    debug!(
        "ground truth: now={:.2} ({}), reference={:.2} ({})",
        price_now, latest_at, price_at_reference, reference_at
    );
    Ok(GroundTruth {
        price_now,
        price_at_reference,
    })
}

/// Chart API client with connection pooling.
#[derive(Debug, Clone)]
pub struct YahooChartClient {
    client: reqwest::Client,
    base_url: String,
    symbol: String,
}

impl YahooChartClient {
    pub fn new(cfg: &SourcesConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("oracle-validator/0.1")
            .pool_max_idle_per_host(2)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(format!("failed to build chart client: {}", e)))?;

        Ok(Self {
            client,
            base_url: cfg.chart_base_url.trim_end_matches('/').to_string(),
            symbol: cfg.symbol.clone(),
        })
    }

    fn chart_url(&self) -> String {
        format!(
            "{}/{}?interval=5m&range=5d",
            self.base_url,
            self.symbol.replace('^', "%5E")
        )
    }

    /// Fetch recent 5-minute closes, oldest first.
    pub async fn fetch_closes(&self) -> Result<Vec<(DateTime<Utc>, f64)>> {
        let url = self.chart_url();
        debug!("Fetching chart: {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(format!("chart request for {}: {}", self.symbol, e)))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::GroundTruth(format!(
                "chart API returned {} for {}: {}",
                status,
                self.symbol,
                &body[..body.len().min(500)]
            )));
        }

        let data: ChartResponse = resp
            .json()
            .await
            .map_err(|e| Error::Http(format!("chart body for {}: {}", self.symbol, e)))?;
        data.closes()
    }
}

#[async_trait]
impl GroundTruthSource for YahooChartClient {
    async fn fetch(&self, _now: DateTime<Utc>, reference: DateTime<Utc>) -> Result<GroundTruth> {
        let bars = self.fetch_closes().await?;
        ground_truth_from_series(&bars, reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(raw: &str) -> DateTime<Utc> {
        raw.parse().unwrap()
    }

    const BODY: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "^GSPC"},
                "timestamp": [1731596400, 1731596700, 1731597000, 1731597300],
                "indicators": {"quote": [{"close": [5900.25, 5901.5, null, 5903.75]}]}
            }],
            "error": null
        }
    }"#;

    #[test]
    fn parses_closes_and_skips_nulls() {
        let resp: ChartResponse = serde_json::from_str(BODY).unwrap();
        let bars = resp.closes().unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0], (ts("2024-11-14T15:00:00Z"), 5900.25));
        assert_eq!(bars[2], (ts("2024-11-14T15:15:00Z"), 5903.75));
    }

    #[test]
    fn api_error_is_reported() {
        let raw = r#"{"chart": {"result": null, "error": {"code": "Not Found"}}}"#;
        let resp: ChartResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.closes().is_err());
    }

    #[test]
    fn reference_uses_last_close_not_after() {
        let bars = vec![
            (ts("2024-11-14T14:55:00Z"), 10.0),
            (ts("2024-11-14T15:00:00Z"), 11.0),
            (ts("2024-11-14T15:05:00Z"), 12.0),
            (ts("2024-11-14T16:00:00Z"), 13.0),
        ];
        let truth = ground_truth_from_series(&bars, ts("2024-11-14T15:03:00Z")).unwrap();
        assert_eq!(truth.price_now, 13.0);
        assert_eq!(truth.price_at_reference, 11.0);
        assert!(truth.moved_up());

        let exact = ground_truth_from_series(&bars, ts("2024-11-14T15:05:00Z")).unwrap();
        assert_eq!(exact.price_at_reference, 12.0);
    }

    #[test]
    fn missing_reference_is_an_error() {
        let bars = vec![(ts("2024-11-14T15:00:00Z"), 11.0)];
        assert!(ground_truth_from_series(&bars, ts("2024-11-14T14:00:00Z")).is_err());
        assert!(ground_truth_from_series(&[], ts("2024-11-14T14:00:00Z")).is_err());
    }

    #[test]
    fn symbol_is_escaped_in_url() {
        let client = YahooChartClient::new(&SourcesConfig::default()).unwrap();
        assert_eq!(
            client.chart_url(),
            "https://query1.finance.yahoo.com/v8/finance/chart/%5EGSPC?interval=5m&range=5d"
        );
    }
}
