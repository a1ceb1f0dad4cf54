//! network join phase
//!
//! The gateway refuses to start its loop until the uplink works. The probe is
//! checked once, then re-checked after each `interval` up to `attempts` times.
//! There is no reconnect once the loop is running.

use crate::error::{GatewayError, Result};

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Something that can tell whether the uplink is usable
#[async_trait]
pub trait NetworkProbe: Send {
    async fn is_connected(&mut self) -> bool;

    /// Label for logs
    fn target(&self) -> String;
}

/// Treats successful name resolution of a host as "network up"
pub struct DnsProbe {
    host: String,
    port: u16,
}

impl DnsProbe {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

#[async_trait]
impl NetworkProbe for DnsProbe {
    async fn is_connected(&mut self) -> bool {
        match tokio::net::lookup_host((self.host.as_str(), self.port)).await {
            Ok(mut addrs) => addrs.next().is_some(),
            Err(e) => {
                debug!(host = %self.host, error = %e, "probe lookup failed");
                false
            }
        }
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Wait for the network. Returns how many retries were needed.
pub async fn join_network<P>(probe: &mut P, attempts: u32, interval: Duration) -> Result<u32>
where
    P: NetworkProbe + ?Sized,
{
    info!(probe = %probe.target(), "connecting to network");
    if probe.is_connected().await {
        return Ok(0);
    }

    for attempt in 1..=attempts {
        info!(attempt, max = attempts, "waiting for network");
        tokio::time::sleep(interval).await;
        if probe.is_connected().await {
            return Ok(attempt);
        }
    }

    Err(GatewayError::JoinFailed { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reports disconnected for the first `fail_for` checks
    struct ScriptedProbe {
        fail_for: u32,
        checks: u32,
    }

    #[async_trait]
    impl NetworkProbe for ScriptedProbe {
        async fn is_connected(&mut self) -> bool {
            self.checks += 1;
            self.checks > self.fail_for
        }

        fn target(&self) -> String {
            "scripted".to_string()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_immediately() {
        let mut probe = ScriptedProbe { fail_for: 0, checks: 0 };
        let retries = join_network(&mut probe, 20, Duration::from_secs(1)).await.unwrap();
        assert_eq!(retries, 0);
        assert_eq!(probe.checks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_after_retries() {
        let mut probe = ScriptedProbe { fail_for: 5, checks: 0 };
        let start = tokio::time::Instant::now();
        let retries = join_network(&mut probe, 20, Duration::from_secs(1)).await.unwrap();
        assert_eq!(retries, 5);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_bound() {
        let mut probe = ScriptedProbe { fail_for: u32::MAX, checks: 0 };
        let err = join_network(&mut probe, 20, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, GatewayError::JoinFailed { attempts: 20 }));
        assert_eq!(probe.checks, 21);
    }

    #[tokio::test]
    async fn test_dns_probe_resolves_localhost() {
        let mut probe = DnsProbe::new("localhost", 443);
        assert!(probe.is_connected().await);
        assert_eq!(probe.target(), "localhost:443");
    }
}
