//! ==============================================================================
//! notifier.rs - telegram bot notifications
//! ==============================================================================
//!
//! purpose:
//!     fire-and-forget alert messages to a telegram chat.
//!
//!     each call opens a fresh tls connection to the bot api, writes one
//!     hand-built GET request and closes the socket. the response is never
//!     read. nothing is retried.
//!
//! limits:
//!     only spaces in the text are escaped (as `+`). `&`, `#` and `%` go out
//!     raw and can cut the message short on the telegram side.
//!
//!     the whole call is bounded by `telegram.timeout_ms` so an unreachable
//!     api host cannot hold the gateway loop.
//!
//! ==============================================================================

use crate::config::TelegramConfig;
use crate::error::{GatewayError, Result};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

/// What a notify call ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Request written to the api
    Sent,
    /// Text was blank after trimming
    SkippedEmpty,
    /// Notifications are turned off in config
    Disabled,
}

/// Outbound notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<NotifyOutcome>;
}

/// Build the sendMessage request target (path and query)
pub fn send_message_path(bot_token: &str, chat_id: i64, text: &str) -> String {
    format!(
        "/bot{}/sendMessage?chat_id={}&text={}",
        bot_token,
        chat_id,
        text.replace(' ', "+")
    )
}

/// Build the raw HTTP/1.1 request written over TLS
pub fn build_request(host: &str, path: &str) -> String {
    format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, host
    )
}

/// Telegram bot api notifier
pub struct TelegramNotifier {
    config: TelegramConfig,
    connector: TlsConnector,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        let root_store = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };

        let tls = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Self {
            config: config.clone(),
            connector: TlsConnector::from(Arc::new(tls)),
        }
    }

    async fn deliver(&self, text: &str) -> Result<()> {
        let host = self.config.api_host.as_str();
        let path = send_message_path(&self.config.bot_token, self.config.chat_id, text);

        let tcp = TcpStream::connect((host, self.config.api_port))
            .await
            .map_err(|e| GatewayError::Notify(format!("connect to {}: {}", host, e)))?;

        let domain = ServerName::try_from(host.to_string())
            .map_err(|e| GatewayError::Notify(format!("invalid api host {}: {}", host, e)))?;

        let mut tls = self
            .connector
            .connect(domain, tcp)
            .await
            .map_err(|e| GatewayError::Notify(format!("tls handshake: {}", e)))?;

        tls.write_all(build_request(host, &path).as_bytes())
            .await
            .map_err(|e| GatewayError::Notify(format!("write request: {}", e)))?;

        // close without reading the response
        if let Err(e) = tls.shutdown().await {
            debug!(error = %e, "telegram socket shutdown");
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<NotifyOutcome> {
        let text = text.trim();
        if text.is_empty() {
            warn!("skipping empty telegram message");
            return Ok(NotifyOutcome::SkippedEmpty);
        }
        if !self.config.enabled {
            info!(text, "telegram disabled, alert not forwarded");
            return Ok(NotifyOutcome::Disabled);
        }

        let timeout: Duration = self.config.timeout();
        match tokio::time::timeout(timeout, self.deliver(text)).await {
            Ok(Ok(())) => {
                info!(text, "telegram alert sent");
                Ok(NotifyOutcome::Sent)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(GatewayError::NotifyTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

// ==============================================================================
// recording notifier for tests
// ==============================================================================
