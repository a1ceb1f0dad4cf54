//! ==============================================================================
//! main.rs - lora alert gateway entry point
//! ==============================================================================
//!
//! purpose:
//!     the process that runs on the radio-equipped gateway. it bridges a lora
//!     radio network and a small http control surface:
//!
//!     - sensor nodes send {"temp": .., "hum": ..} frames over lora
//!     - any other lora frame is an alert, relayed to telegram
//!     - the camera service POSTs alerts to /alert, which go out over lora
//!       and to telegram
//!     - /dashboard shows the latest alert and sensor reading
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                 gateway loop (gateway.rs)                   │
//!     │                                                             │
//!     │   tick: radio poll ──> http accept/handle ──> sleep 100ms   │
//!     │            │                 │                               │
//!     │     ┌──────┴──────┐   ┌──────┴──────┐   ┌────────────────┐  │
//!     │     │ radio link  │   │ http server │   │ telegram (tls) │  │
//!     │     │ (udp modem) │   │ (port 80)   │   │ fire & forget  │  │
//!     │     └─────────────┘   └─────────────┘   └────────────────┘  │
//!     │                                                             │
//!     │          dashboard state: owned by the loop only            │
//!     └─────────────────────────────────────────────────────────────┘
//!
//! startup:
//!     load config -> init logging -> validate -> join network (bounded)
//!     -> open radio + http -> run forever.
//!     a failed join is fatal; nothing after it is.
//!
//! ==============================================================================

mod config;
mod dashboard;
mod domain;
mod error;
mod gateway;
mod http;
mod join;
mod notifier;
mod radio;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  LoRa Alert Gateway");
    println!("  radio <-> http <-> telegram");
    println!("===========================================================");

    // step 1: load configuration
    let mut config = config::GatewayConfig::load_or_default();
    config.apply_env_overrides()?;

    // step 2: logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.print_summary();
    config.validate()?;

    // step 3: join the network, then open the radio and http sockets
    let network = &config.network;
    let mut probe = join::DnsProbe::new(network.probe_host.clone(), network.probe_port);
    let mut gateway = match gateway::start(&config, &mut probe).await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!(fatal = e.is_fatal(), code = e.error_code(), "gateway failed to start");
            return Err(e).context("gateway startup");
        }
    };

    // step 4: run until the process is killed
    tokio::select! {
        _ = gateway.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
    }

    Ok(())
}
