//! Weather-telemetry client and poller.
//!
//! The weather feed lives on a separate REST service. A blocking `ureq`
//! client fetches the latest reading; a fixed-interval tokio task
//! re-invokes it and publishes each completion into a `watch` channel, so
//! overlapping completions resolve last-write-wins. A failed poll keeps
//! the previous reading on display and is retried implicitly on the next
//! tick.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("telemetry request failed: {0}")]
    Request(#[from] ureq::Error),
    #[error("telemetry payload decode failed: {0}")]
    Decode(#[from] std::io::Error),
}

/// Latest reading reported by a weather station.
///
/// Fields suffixed `10` are fixed-point values scaled by 10; use the
/// accessor methods for display units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReading {
    pub id: Option<i64>,
    pub ts: Option<String>,
    pub device_id: Option<String>,
    pub temp10: Option<f64>,
    pub hum10: Option<f64>,
    pub press10: Option<f64>,
    pub lux: Option<f64>,
    pub wind10: Option<f64>,
    pub wind_lv: Option<i64>,
    pub rain10: Option<f64>,
    pub soil_n: Option<f64>,
    pub soil_p: Option<f64>,
    pub soil_k: Option<f64>,
}

impl TelemetryReading {
    pub fn temperature_c(&self) -> Option<f64> {
        self.temp10.map(|v| v / 10.0)
    }

    pub fn humidity_pct(&self) -> Option<f64> {
        self.hum10.map(|v| v / 10.0)
    }

    pub fn pressure_hpa(&self) -> Option<f64> {
        self.press10.map(|v| v / 10.0)
    }

    pub fn wind_speed_ms(&self) -> Option<f64> {
        self.wind10.map(|v| v / 10.0)
    }

    pub fn rainfall_mm(&self) -> Option<f64> {
        self.rain10.map(|v| v / 10.0)
    }
}

/// Blocking REST client for the telemetry service.
#[derive(Clone)]
pub struct TelemetryClient {
    agent: ureq::Agent,
    base: String,
    auth: String,
}

impl TelemetryClient {
    pub fn new(base: &str, username: &str, password: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base: base.trim_end_matches('/').to_string(),
            auth: basic_auth(username, password),
        }
    }

    /// `GET <base>/api/telemetry/latest?deviceId=<id>`.
    pub fn fetch_latest(&self, device_id: &str) -> Result<TelemetryReading, TelemetryError> {
        let url = format!("{}/api/telemetry/latest", self.base);
        let reading = self
            .agent
            .get(&url)
            .query("deviceId", device_id)
            .set("Authorization", &self.auth)
            .call()?
            .into_json()?;
        Ok(reading)
    }
}

fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
}

/// What the most recent completed poll produced.
///
/// A failed poll keeps the previous reading and records the failure
/// message; the next successful poll clears it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub reading: Option<TelemetryReading>,
    pub error: Option<String>,
}

/// Fixed-interval poll task publishing into a `watch` channel.
pub struct TelemetryPoller {
    task: JoinHandle<()>,
    rx: watch::Receiver<TelemetrySnapshot>,
}

impl TelemetryPoller {
    /// Spawn the recurring poll task on the current tokio runtime.
    pub fn spawn(client: TelemetryClient, device_id: String, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(TelemetrySnapshot::default());

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;

                let fetch_client = client.clone();
                let fetch_device = device_id.clone();
                let outcome =
                    tokio::task::spawn_blocking(move || fetch_client.fetch_latest(&fetch_device))
                        .await;

                let snapshot = match outcome {
                    Ok(Ok(reading)) => {
                        tracing::debug!(device = %device_id, "telemetry poll complete");
                        TelemetrySnapshot {
                            reading: Some(reading),
                            error: None,
                        }
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(device = %device_id, error = %e, "telemetry poll failed");
                        TelemetrySnapshot {
                            reading: tx.borrow().reading.clone(),
                            error: Some(e.to_string()),
                        }
                    }
                    Err(e) => {
                        tracing::warn!(device = %device_id, error = %e, "telemetry poll panicked");
                        TelemetrySnapshot {
                            reading: tx.borrow().reading.clone(),
                            error: Some(e.to_string()),
                        }
                    }
                };

                // Unconditional overwrite: last completion wins.
                let _ = tx.send(snapshot);
            }
        });

        Self { task, rx }
    }

    /// Most recent snapshot; never blocks.
    pub fn latest(&self) -> TelemetrySnapshot {
        self.rx.borrow().clone()
    }

    /// Cancel the recurring task.
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for TelemetryPoller {
    fn drop(&mut self) {
        // The timer must not outlive its view.
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    #[test]
    fn test_reading_uses_wire_field_names() {
        let json = r#"{
            "id": 7,
            "ts": "2026-08-04T12:00:00Z",
            "deviceId": "dev01",
            "temp10": 253,
            "hum10": 612,
            "press10": 10132,
            "lux": 1200,
            "wind10": 34,
            "windLv": 2,
            "rain10": 5,
            "soilN": 48,
            "soilP": 31,
            "soilK": 77
        }"#;
        let reading: TelemetryReading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.device_id.as_deref(), Some("dev01"));
        assert_eq!(reading.wind_lv, Some(2));
        assert_eq!(reading.soil_n, Some(48.0));
    }

    #[test]
    fn test_fixed_point_fields_scale_by_ten() {
        let reading = TelemetryReading {
            temp10: Some(253.0),
            hum10: Some(612.0),
            press10: Some(10132.0),
            wind10: Some(34.0),
            rain10: Some(5.0),
            ..Default::default()
        };
        assert_eq!(reading.temperature_c(), Some(25.3));
        assert_eq!(reading.humidity_pct(), Some(61.2));
        assert_eq!(reading.pressure_hpa(), Some(1013.2));
        assert_eq!(reading.wind_speed_ms(), Some(3.4));
        assert_eq!(reading.rainfall_mm(), Some(0.5));
    }

    #[test]
    fn test_missing_fields_stay_absent() {
        let reading: TelemetryReading = serde_json::from_str(r#"{"deviceId":"dev01"}"#).unwrap();
        assert_eq!(reading.temperature_c(), None);
        assert_eq!(reading.lux, None);
    }

    #[test]
    fn test_basic_auth_header() {
        // btoa("admin:abc123456")
        assert_eq!(basic_auth("admin", "abc123456"), "Basic YWRtaW46YWJjMTIzNDU2");
    }

    #[test]
    fn test_fetch_latest_hits_endpoint_with_auth() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = stream.read(&mut buf).unwrap();
                raw.extend_from_slice(&buf[..n]);
                if raw.windows(4).any(|w| w == b"\r\n\r\n") || n == 0 {
                    break;
                }
            }
            let body = r#"{"deviceId":"dev01","temp10":253,"lux":1200}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&raw).into_owned()
        });

        // Trailing slash must not produce a double-slash path.
        let client = TelemetryClient::new(
            &format!("http://{addr}/"),
            "admin",
            "abc123456",
            Duration::from_secs(10),
        );
        let reading = client.fetch_latest("dev01").unwrap();
        assert_eq!(reading.device_id.as_deref(), Some("dev01"));
        assert_eq!(reading.temperature_c(), Some(25.3));
        assert_eq!(reading.lux, Some(1200.0));

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /api/telemetry/latest?deviceId=dev01"));
        assert!(request.contains("Basic YWRtaW46YWJjMTIzNDU2"));
    }

    #[test]
    fn test_fetch_latest_reports_unreachable_service() {
        // Bind-then-drop guarantees nothing is listening on the port.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = TelemetryClient::new(
            &format!("http://{addr}"),
            "admin",
            "abc123456",
            Duration::from_secs(1),
        );
        assert!(matches!(
            client.fetch_latest("dev01"),
            Err(TelemetryError::Request(_))
        ));
    }

    #[tokio::test]
    async fn test_poller_snapshot_starts_empty_and_abort_stops_it() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = TelemetryClient::new(
            &format!("http://{addr}"),
            "admin",
            "abc123456",
            Duration::from_secs(1),
        );
        let poller = TelemetryPoller::spawn(client, "dev01".to_string(), Duration::from_secs(60));

        let snapshot = poller.latest();
        assert!(snapshot.reading.is_none());

        poller.abort();
    }
}
