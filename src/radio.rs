//! ==============================================================================
//! radio.rs - long-range radio link
//! ==============================================================================
//!
//! purpose:
//!     receives and sends LoRa frames through a radio modem that exposes one
//!     datagram per frame, and decodes inbound frames into sensor readings or
//!     alert text.
//!
//! ordering:
//!     `poll` and `send` both take `&mut self`. the gateway loop is the only
//!     owner of the link, so a send can never overlap a poll. the link still
//!     records which mode it is in so the logs show when it is transmitting.
//!
//! relationships:
//!     - used by: gateway.rs (poll every tick), http.rs (send on POST /alert)
//!     - produces: domain.rs (RadioPayload)
//!
//! ==============================================================================

use crate::config::RadioConfig;
use crate::domain::{AlertText, RadioPayload, SensorReading};
use crate::error::{GatewayError, Result};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::fmt;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// key carrying the temperature in a sensor frame
pub const TEMPERATURE_KEY: &str = "temp";
/// key carrying the humidity in a sensor frame
pub const HUMIDITY_KEY: &str = "hum";

/// Trait for radio links
///
/// Abstracts the transport so the gateway loop can run against the real
/// modem socket or an in-memory link in tests.
#[async_trait]
pub trait RadioLink: Send {
    /// Return the next pending frame without waiting.
    ///
    /// Returns `None` if nothing is pending.
    async fn poll(&mut self) -> Result<Option<Bytes>>;

    /// Transmit one frame.
    async fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Current link mode
    fn mode(&self) -> LinkMode;
}

/// What the link is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Listening for frames
    Receive,
    /// A frame is being handed to the modem
    Transmit,
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkMode::Receive => write!(f, "receive"),
            LinkMode::Transmit => write!(f, "transmit"),
        }
    }
}

/// decode a radio frame
///
/// a json object with both `temp` and `hum` is a sensor reading. any other
/// json value is alert text: strings are taken as-is, everything else in its
/// compact json form. bytes that are not json are a decode error.
///
/// a `temp`/`hum` object whose values are not numeric is also a decode error,
/// rather than being stored as a reading with raw values.
pub fn parse_payload(bytes: &[u8]) -> Result<RadioPayload> {
    let decoded: Value =
        serde_json::from_slice(bytes).map_err(|e| GatewayError::RadioDecode(e.to_string()))?;

    if let Value::Object(map) = &decoded {
        if let (Some(temp), Some(hum)) = (map.get(TEMPERATURE_KEY), map.get(HUMIDITY_KEY)) {
            let temperature = numeric(temp).ok_or_else(|| {
                GatewayError::RadioDecode(format!("{} is not numeric: {}", TEMPERATURE_KEY, temp))
            })?;
            let humidity = numeric(hum).ok_or_else(|| {
                GatewayError::RadioDecode(format!("{} is not numeric: {}", HUMIDITY_KEY, hum))
            })?;
            return Ok(RadioPayload::Sensor(SensorReading { temperature, humidity }));
        }
    }

    let text = match decoded {
        Value::String(s) => s,
        other => other.to_string(),
    };
    Ok(RadioPayload::Alert(AlertText::new(text)))
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ==============================================================================
// udp modem link
// ==============================================================================

/// Radio link backed by a datagram socket to the radio modem
pub struct UdpRadio {
    socket: UdpSocket,
    mode: LinkMode,
    max_payload: usize,
    send_timeout: Duration,
}

impl UdpRadio {
    /// Bind the local address and fix the modem as the only peer
    pub async fn open(config: &RadioConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind).await?;
        socket.connect(config.peer).await?;
        info!(
            bind = %socket.local_addr()?,
            peer = %config.peer,
            frequency_hz = config.frequency_hz,
            sf = config.spreading_factor,
            "radio link open"
        );
        Ok(Self {
            socket,
            mode: LinkMode::Receive,
            max_payload: config.max_payload,
            send_timeout: config.send_timeout(),
        })
    }

    #[cfg(test)]
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl RadioLink for UdpRadio {
    async fn poll(&mut self) -> Result<Option<Bytes>> {
        let mut buf = vec![0u8; self.max_payload];
        match self.socket.try_recv(&mut buf) {
            Ok(0) => Ok(None),
            Ok(n) => {
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_payload {
            return Err(GatewayError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }

        self.mode = LinkMode::Transmit;
        debug!(bytes = payload.len(), mode = %self.mode, "radio send");
        let result = tokio::time::timeout(self.send_timeout, self.socket.send(payload)).await;
        self.mode = LinkMode::Receive;

        match result {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(GatewayError::RadioSendTimeout {
                timeout_ms: self.send_timeout.as_millis() as u64,
            }),
        }
    }

    fn mode(&self) -> LinkMode {
        self.mode
    }
}

// ==============================================================================
// in-memory link for tests
// ==============================================================================
