//! ==============================================================================
//! gateway.rs - the cooperative gateway loop
//! ==============================================================================
//!
//! purpose:
//!     one task drives everything. each tick, in this order:
//!
//!       1. poll the radio; record readings/alerts, notify on alerts
//!       2. accept at most one http client and answer one request
//!       3. sleep `tick_interval`
//!
//!     nothing from tick N+1 starts before tick N is done. every error inside
//!     a tick is logged and dropped; the loop itself never stops.
//!
//! lifecycle:
//!
//!     Joining ──ok──> Running (forever)
//!        │
//!        └──fail──> Fatal (process exits)
//!
//! relationships:
//!     - owns: radio.rs (RadioLink), http.rs (AlertHttpServer),
//!             notifier.rs (Notifier), dashboard.rs (DashboardState)
//!     - used by: main.rs
//!
//! ==============================================================================

use crate::config::GatewayConfig;
use crate::dashboard::DashboardState;
use crate::domain::RadioPayload;
use crate::error::Result;
use crate::http::{AlertHttpServer, HttpOutcome};
use crate::join::{join_network, NetworkProbe};
use crate::notifier::{Notifier, TelegramNotifier};
use crate::radio::{parse_payload, RadioLink, UdpRadio};

use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// prefix for alerts received over the radio
pub const RADIO_ALERT_PREFIX: &str = "📡 LoRa Alert: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayPhase {
    Joining,
    Running,
    Fatal,
}

impl fmt::Display for GatewayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayPhase::Joining => write!(f, "joining"),
            GatewayPhase::Running => write!(f, "running"),
            GatewayPhase::Fatal => write!(f, "fatal"),
        }
    }
}

/// What step 1 of a tick did
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    Idle,
    Sensor,
    Alert,
    /// frame did not decode; state untouched
    Rejected,
    LinkError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub radio: RadioEvent,
    pub http: Option<HttpOutcome>,
}

pub struct GatewayLoop<R, N> {
    radio: R,
    server: AlertHttpServer,
    notifier: N,
    state: DashboardState,
    accept_timeout: Duration,
    tick_interval: Duration,
    show_sensor_data: bool,
}

impl<R: RadioLink, N: Notifier> GatewayLoop<R, N> {
    pub fn new(radio: R, server: AlertHttpServer, notifier: N, config: &GatewayConfig) -> Self {
        Self {
            radio,
            server,
            notifier,
            state: DashboardState::new(),
            accept_timeout: config.http.accept_timeout(),
            tick_interval: config.gateway.tick_interval(),
            show_sensor_data: config.logging.show_sensor_data,
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> &crate::domain::DashboardSnapshot {
        self.state.snapshot()
    }

    /// run ticks forever
    pub async fn run(&mut self) {
        info!(phase = %GatewayPhase::Running, "gateway loop started");
        loop {
            let report = self.tick().await;
            trace!(?report, "tick");
            tokio::time::sleep(self.tick_interval).await;
        }
    }

    /// one pass of radio then http, without the trailing sleep
    pub async fn tick(&mut self) -> TickReport {
        let radio = self.service_radio().await;
        let http = self.service_http().await;
        TickReport { radio, http }
    }

    async fn service_radio(&mut self) -> RadioEvent {
        let frame = match self.radio.poll().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return RadioEvent::Idle,
            Err(e) => {
                warn!(
                    error = %e,
                    code = e.error_code(),
                    mode = %self.radio.mode(),
                    "radio poll failed"
                );
                return RadioEvent::LinkError;
            }
        };

        match parse_payload(&frame) {
            Ok(RadioPayload::Sensor(reading)) => {
                if self.show_sensor_data {
                    info!(
                        temperature = reading.temperature,
                        humidity = reading.humidity,
                        "sensor data"
                    );
                }
                self.state.record_sensor(reading);
                RadioEvent::Sensor
            }
            Ok(RadioPayload::Alert(alert)) => {
                info!(alert = %alert, "alert received over radio");
                let text = format!("{}{}", RADIO_ALERT_PREFIX, alert);
                self.state.record_alert(alert);
                if let Err(e) = self.notifier.notify(&text).await {
                    warn!(error = %e, code = e.error_code(), "telegram error");
                }
                RadioEvent::Alert
            }
            Err(e) => {
                warn!(raw = %hex::encode(&frame), error = %e, "undecodable radio frame");
                RadioEvent::Rejected
            }
        }
    }

    async fn service_http(&mut self) -> Option<HttpOutcome> {
        let (stream, peer) = match self.server.try_accept(self.accept_timeout).await {
            Ok(Some(conn)) => conn,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "http accept failed");
                return None;
            }
        };

        match self
            .server
            .handle(stream, peer, self.state.snapshot(), &mut self.radio, &self.notifier)
            .await
        {
            Ok(outcome) => {
                debug!(
                    peer = %outcome.peer,
                    status = outcome.status.code(),
                    route = ?outcome.route,
                    "http handled"
                );
                Some(outcome)
            }
            Err(e) => {
                warn!(%peer, error = %e, "http handling failed");
                None
            }
        }
    }
}

/// Joining -> Running, or the error that makes the gateway Fatal
pub async fn start<P>(
    config: &GatewayConfig,
    probe: &mut P,
) -> Result<GatewayLoop<UdpRadio, TelegramNotifier>>
where
    P: NetworkProbe + ?Sized,
{
    info!(phase = %GatewayPhase::Joining, "gateway starting");
    let network = &config.network;
    let retries = match join_network(probe, network.join_attempts, network.join_interval()).await {
        Ok(retries) => retries,
        Err(e) => {
            error!(phase = %GatewayPhase::Fatal, error = %e, "network join failed");
            return Err(e);
        }
    };
    info!(retries, "network joined");

    let radio = UdpRadio::open(&config.radio).await?;
    let server = AlertHttpServer::bind(&config.http).await?;
    let notifier = TelegramNotifier::new(&config.telegram);

    Ok(GatewayLoop::new(radio, server, notifier, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AlertText, DashboardSnapshot, SensorReading};
    use crate::notifier::mock::RecordingNotifier;
    use crate::radio::mock::MockRadio;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn test_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.http.bind = "127.0.0.1:0".parse().unwrap();
        config.http.accept_timeout_ms = 10;
        config.http.request_timeout_ms = 500;
        config
    }

    async fn gateway(frames: &[&'static str]) -> GatewayLoop<MockRadio, RecordingNotifier> {
        let config = test_config();
        let server = AlertHttpServer::bind(&config.http).await.unwrap();
        let radio = MockRadio::with_frames(frames.iter().map(|f| Bytes::from_static(f.as_bytes())));
        GatewayLoop::new(radio, server, RecordingNotifier::default(), &config)
    }

    async fn request(addr: std::net::SocketAddr, raw: &'static [u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn test_idle_tick() {
        let mut gw = gateway(&[]).await;
        let report = gw.tick().await;
        assert_eq!(report, TickReport { radio: RadioEvent::Idle, http: None });
        assert_eq!(gw.snapshot(), &DashboardSnapshot::default());
    }

    #[tokio::test]
    async fn test_sensor_frame_updates_snapshot() {
        let mut gw = gateway(&[r#"{"temp": 24.5, "hum": 60}"#]).await;
        assert_eq!(gw.tick().await.radio, RadioEvent::Sensor);
        assert_eq!(
            gw.snapshot().latest_sensor,
            Some(SensorReading { temperature: 24.5, humidity: 60.0 })
        );
        assert!(gw.snapshot().latest_alert.is_none());
        assert!(gw.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_alert_frame_updates_snapshot_and_notifies() {
        let mut gw = gateway(&[r#""motion detected""#]).await;
        assert_eq!(gw.tick().await.radio, RadioEvent::Alert);
        assert_eq!(gw.snapshot().latest_alert, Some(AlertText::new("motion detected")));
        assert_eq!(
            gw.notifier.messages(),
            vec!["📡 LoRa Alert: motion detected".to_string()]
        );
    }

    #[tokio::test]
    async fn test_empty_alert_frame_renders_placeholder() {
        let mut gw = gateway(&[r#""""#]).await;
        assert_eq!(gw.tick().await.radio, RadioEvent::Alert);
        let html = crate::dashboard::render_dashboard(gw.snapshot());
        assert!(html.contains("No alert received"));
    }

    #[tokio::test]
    async fn test_bad_frame_leaves_state_alone() {
        let mut gw = gateway(&[r#"{"temp": 20, "hum": 50}"#, "{not json"]).await;
        gw.tick().await;
        let before = gw.snapshot().clone();

        assert_eq!(gw.tick().await.radio, RadioEvent::Rejected);
        assert_eq!(gw.snapshot(), &before);
        assert!(gw.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_one_frame_per_tick_in_order() {
        let mut gw = gateway(&[r#""first""#, r#""second""#]).await;
        gw.tick().await;
        assert_eq!(gw.snapshot().latest_alert, Some(AlertText::new("first")));
        gw.tick().await;
        assert_eq!(gw.snapshot().latest_alert, Some(AlertText::new("second")));
        assert_eq!(gw.tick().await.radio, RadioEvent::Idle);
    }

    #[tokio::test]
    async fn test_dashboard_reflects_radio_from_same_tick() {
        let mut gw = gateway(&[r#"{"temp": 18, "hum": 35.5}"#]).await;
        let addr = gw.server.local_addr().unwrap();
        gw.accept_timeout = Duration::from_secs(2);

        let client = tokio::spawn(request(addr, b"GET /dashboard HTTP/1.1\r\nHost: gw\r\n\r\n"));
        let report = gw.tick().await;
        let body = client.await.unwrap();

        assert_eq!(report.radio, RadioEvent::Sensor);
        assert_eq!(report.http.unwrap().status.code(), 200);
        assert!(body.contains("No alert received"));
        assert!(body.contains("Temperature: 18 °C"));
        assert!(body.contains("Humidity: 35.5 %"));
    }

    #[tokio::test]
    async fn test_http_alert_goes_to_radio_and_telegram() {
        let mut gw = gateway(&[]).await;
        let addr = gw.server.local_addr().unwrap();
        gw.accept_timeout = Duration::from_secs(2);

        let client = tokio::spawn(request(
            addr,
            b"POST /alert HTTP/1.1\r\nContent-Length: 18\r\n\r\n{\"message\":\"fire\"}",
        ));
        let report = gw.tick().await;
        let response = client.await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(report.http.unwrap().status.code(), 200);
        assert_eq!(gw.radio.sent_frames(), vec![b"fire".to_vec()]);
        assert_eq!(gw.notifier.messages(), vec!["📢 HTTP Alert: fire".to_string()]);
        // http alerts are relayed, not recorded
        assert!(gw.snapshot().latest_alert.is_none());
    }

    #[tokio::test]
    async fn test_unknown_route_does_not_touch_state() {
        let mut gw = gateway(&[]).await;
        let addr = gw.server.local_addr().unwrap();
        gw.accept_timeout = Duration::from_secs(2);

        let client = tokio::spawn(request(addr, b"GET /unknown HTTP/1.1\r\n\r\n"));
        let report = gw.tick().await;
        let response = client.await.unwrap();

        assert!(response.starts_with("HTTP/1.1 404 Not Found"));
        assert_eq!(report.http.unwrap().status.code(), 404);
        assert_eq!(gw.snapshot(), &DashboardSnapshot::default());
        assert!(gw.radio.sent_frames().is_empty());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(GatewayPhase::Joining.to_string(), "joining");
        assert_eq!(GatewayPhase::Fatal.to_string(), "fatal");
    }
}
