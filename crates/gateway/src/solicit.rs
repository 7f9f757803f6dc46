//! HTTP forecast solicitation.
//!
//! Each participant exposes an endpoint that accepts a `{"timestamp": …}`
//! challenge and answers with whatever subset of a forecast it produced.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use common::config::SourcesConfig;
use common::{Error, Forecast, ForecastSubmission, Interval, Participant, Result};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::traits::ForecastSource;

/// Challenge body sent to participants.
#[derive(Debug, Serialize)]
pub struct Challenge {
    pub timestamp: String,
}

/// Participant reply as it appears on the wire.
#[derive(Debug, Default, Deserialize)]
pub struct WireForecast {
    #[serde(default)]
    pub prediction: Option<f64>,
    #[serde(default)]
    pub direction: Option<bool>,
    /// `[low, high]`; any other length is ignored.
    #[serde(default)]
    pub interval: Option<Vec<f64>>,
}

impl WireForecast {
    pub fn into_forecast(self) -> Forecast {
        let interval = match self.interval.as_deref() {
            Some([low, high]) => Some(Interval::new(*low, *high)),
            _ => None,
        };
        Forecast {
            point: self.prediction,
            interval,
            direction: self.direction,
        }
        .sanitized()
    }
}

#[derive(Debug, Clone)]
pub struct HttpForecastClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpForecastClient {
    pub fn new(cfg: &SourcesConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("oracle-validator/0.1")
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| Error::Http(format!("failed to build solicitation client: {}", e)))?;

        Ok(Self {
            client,
            timeout: Duration::from_secs(cfg.solicit_timeout_secs.max(1)),
        })
    }

    async fn ask(&self, participant: &Participant, challenge: &Challenge) -> Result<Forecast> {
        if participant.endpoint.is_empty() {
            return Err(Error::Solicitation(format!(
                "participant {} has no endpoint",
                participant.id
            )));
        }

        let resp = self
            .client
            .post(&participant.endpoint)
            .timeout(self.timeout)
            .json(challenge)
            .send()
            .await
            .map_err(|e| Error::Solicitation(format!("participant {}: {}", participant.id, e)))?;

        if !resp.status().is_success() {
            return Err(Error::Solicitation(format!(
                "participant {} returned {}",
                participant.id,
                resp.status()
            )));
        }

        let wire: WireForecast = resp
            .json()
            .await
            .map_err(|e| Error::Solicitation(format!("participant {} body: {}", participant.id, e)))?;
        Ok(wire.into_forecast())
    }
}

#[async_trait]
impl ForecastSource for HttpForecastClient {
    async fn solicit(
        &self,
        participants: &[Participant],
        timestamp: DateTime<Utc>,
    ) -> Vec<ForecastSubmission> {
        let challenge = Challenge {
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        };

        let replies = join_all(participants.iter().map(|p| self.ask(p, &challenge))).await;

        let submissions: Vec<ForecastSubmission> = participants
            .iter()
            .zip(replies)
            .filter_map(|(p, reply)| match reply {
                Ok(forecast) if !forecast.is_empty() => Some(ForecastSubmission {
                    participant: p.id,
                    forecast,
                }),
                Ok(_) => {
                    debug!("participant {} sent an empty forecast", p.id);
                    None
                }
                Err(e) => {
                    debug!("{}", e);
                    None
                }
            })
            .collect();

        info!(
            "Solicited {} participants for {}: {} answered",
            participants.len(),
            challenge.timestamp,
            submissions.len()
        );
        submissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Forecast {
        serde_json::from_str::<WireForecast>(raw).unwrap().into_forecast()
    }

    #[test]
    fn full_reply_is_decoded() {
        let f = parse(r#"{"prediction": 5901.5, "direction": true, "interval": [5890.0, 5910.0]}"#);
        assert_eq!(f.point, Some(5901.5));
        assert_eq!(f.direction, Some(true));
        assert_eq!(f.interval, Some(Interval::new(5890.0, 5910.0)));
    }

    #[test]
    fn bad_interval_length_is_absent() {
        assert_eq!(parse(r#"{"interval": [1.0]}"#).interval, None);
        assert_eq!(parse(r#"{"interval": [1.0, 2.0, 3.0]}"#).interval, None);
    }

    #[test]
    fn partial_and_empty_replies() {
        let f = parse(r#"{"direction": false}"#);
        assert_eq!(f.point, None);
        assert_eq!(f.direction, Some(false));
        assert!(parse("{}").is_empty());
        assert!(parse(r#"{"prediction": null}"#).is_empty());
    }

    #[test]
    fn challenge_serializes_timestamp() {
        let ts: DateTime<Utc> = "2024-11-14T15:00:00Z".parse().unwrap();
        let c = Challenge {
            timestamp: ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        assert_eq!(
            serde_json::to_string(&c).unwrap(),
            r#"{"timestamp":"2024-11-14T15:00:00Z"}"#
        );
    }

    #[tokio::test]
    async fn unreachable_participants_are_missing() {
        let client = HttpForecastClient::new(&SourcesConfig {
            solicit_timeout_secs: 1,
            ..SourcesConfig::default()
        })
        .unwrap();
        let participants = vec![
            Participant {
                id: 1,
                identity: "a".into(),
                endpoint: String::new(),
            },
            Participant {
                id: 2,
                identity: "b".into(),
                endpoint: "http://127.0.0.1:9/forecast".into(),
            },
        ];
        let out = client.solicit(&participants, Utc::now()).await;
        assert!(out.is_empty());
    }
}
