//! EVSE simulator
//!
//! Builds one virtual EVSE from the configuration file and walks it through
//! a reservation, a remote start and a remote stop, logging every event the
//! EVSE publishes. The charge detail record is printed as JSON at the end.
//!
//! ```sh
//! # Run with default config (~/.config/evse-engine/config.toml)
//! evse-sim
//!
//! # Custom config path, shorter session
//! evse-sim --config ./evse.toml --session-secs 5
//!
//! # Validate config without running the scenario
//! evse-sim --check
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use evse_engine::config::AppConfig;
use evse_engine::domain::{
    CommandOptions, RemoteStartRequest, RemoteStartResult, RemoteStopRequest, RemoteStopResult,
    ReservationResult, ReserveRequest,
};
use evse_engine::runtime::{init_fallback_tracing, init_tracing};
use evse_engine::shared::{cancel_on_ctrl_c, CancellationSignal};
use evse_engine::{EvseBuilder, EvseSettings};

/// EVSE simulator: reserve, start and stop a charging session on a virtual EVSE.
#[derive(Parser, Debug)]
#[command(
    name = "evse-sim",
    version,
    about = "Drive a virtual EVSE through a reservation and a charging session",
    long_about = "Builds a virtual EVSE from the configuration file, reserves it, \
                  starts a session on the reservation and stops it again.\n\n\
                  Default config: ~/.config/evse-engine/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "EVSE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Override how long the simulated session charges.
    #[arg(long)]
    session_secs: Option<u64>,

    /// Per-command timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    timeout_ms: u64,

    /// Validate the configuration file and exit without running.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────────
    let config_path = cli
        .config
        .unwrap_or_else(evse_engine::default_config_path);

    let mut config = match AppConfig::load(&config_path) {
        Ok(mut cfg) => {
            if let Some(ref level) = cli.log_level {
                cfg.logging.level = level.clone();
            }
            init_tracing(&cfg);
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            init_fallback_tracing();
            error!("Failed to load config from {}: {}", config_path.display(), e);
            if cli.check {
                return Err(e.into());
            }
            error!("Using default configuration.");
            AppConfig::default()
        }
    };

    // ── Apply CLI overrides ────────────────────────────────────────
    if let Some(secs) = cli.session_secs {
        info!("CLI override: session_secs = {}", secs);
        config.simulation.session_secs = secs;
    }

    // ── Config validation mode ─────────────────────────────────────
    if cli.check {
        println!("✅ Configuration is valid");
        println!("   Config file     : {}", config_path.display());
        println!("   EVSE            : {}", config.evse.id);
        println!("   Max reservation : {}s", config.evse.max_reservation_duration_secs);
        println!("   Rated power     : {} kW", config.evse.rated_power_kw);
        println!("   Log level       : {}", config.logging.level);
        return Ok(());
    }

    // ── Build the EVSE ─────────────────────────────────────────────
    let evse = EvseBuilder::new(config.evse.id.as_str())
        .with_settings(EvseSettings::from(&config.evse))
        .build();

    let mut events = evse.subscribe();
    let logger = tokio::spawn(async move {
        while let Some(message) = events.recv().await {
            info!(
                event = message.event.event_type(),
                evse_id = %message.event.evse_id(),
                "📣 Event"
            );
        }
    });

    let shutdown = CancellationSignal::new();
    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));
    let options = CommandOptions::default()
        .with_timeout(Duration::from_millis(cli.timeout_ms))
        .with_cancel(shutdown.clone());

    // ── Scenario ───────────────────────────────────────────────────
    let sim = &config.simulation;
    let reserve = ReserveRequest::new(sim.provider_id.as_str(), sim.auth_identity.as_str())
        .at(evse.id().clone());
    let reservation = match evse.reserve(reserve, options.clone()).await.result {
        ReservationResult::Success(reservation) => reservation,
        other => {
            error!(result = ?other, "Reservation failed");
            return Err(format!("reservation failed: {:?}", other).into());
        }
    };
    info!(reservation_id = %reservation.id, end_time = %reservation.end_time(), "🅿️ EVSE reserved");

    let start = RemoteStartRequest::new()
        .at(evse.id().clone())
        .with_reservation(reservation.id.clone())
        .by(sim.provider_id.as_str(), sim.auth_identity.as_str());
    let session = match evse.remote_start(start, options.clone()).await.result {
        RemoteStartResult::Success(session) => session,
        other => {
            error!(result = ?other, "Remote start failed");
            return Err(format!("remote start failed: {:?}", other).into());
        }
    };
    info!(session_id = %session.id, "🔌 Charging started, stopping in {}s", sim.session_secs);

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(sim.session_secs)) => {}
        _ = shutdown.cancelled() => warn!("Interrupted, stopping the session early"),
    }

    // The shutdown signal may have fired; the stop itself must not be cancelled.
    let stop_options = CommandOptions::default().with_timeout(Duration::from_millis(cli.timeout_ms));
    let stop = RemoteStopRequest::new(session.id.clone()).by(sim.provider_id.as_str(), sim.auth_identity.as_str());
    match evse.remote_stop(stop, stop_options).await.result {
        RemoteStopResult::Success(cdr) => {
            info!(energy_wh = cdr.energy_wh, duration_secs = cdr.duration.num_seconds(), "⚡ Session finished");
            println!("{}", serde_json::to_string_pretty(&cdr)?);
        }
        other => {
            error!(result = ?other, "Remote stop failed");
        }
    }

    info!(status = %evse.operational_status(), "Final operational status");
    shutdown.cancel();
    drop(evse);
    logger.abort();

    Ok(())
}
