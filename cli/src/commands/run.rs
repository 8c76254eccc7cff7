// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `spacegate run`: the enforcement engine against the HTTP feed and the
//! simulated host described by `spec.simulation`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use spacegate_core::application::{EngineCapabilities, EnforcementLoop, EnforcementLoopConfig};
use spacegate_core::domain::capabilities::DebugPositionFeed;
use spacegate_core::domain::engine_config::{EngineConfigManifest, SimulationConfig};
use spacegate_core::domain::events::EnforcementEvent;
use spacegate_core::infrastructure::debug_position::HttpDebugPositionFeed;
use spacegate_core::infrastructure::event_bus::{EventBus, EventBusError};
use spacegate_core::infrastructure::http_feed::HttpPolicyFeed;
use spacegate_core::infrastructure::signature::CryptoSignatureVerifier;
use spacegate_core::infrastructure::simulation::{InMemoryHost, SimulatedConnectivity, SimulatedPositionSource};

#[derive(Args)]
pub struct RunArgs {
    /// Print events as JSON lines instead of colored text
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: RunArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = EngineConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let spec = &config.spec;
    let simulation = spec.simulation.clone().unwrap_or_else(|| {
        warn!("No spec.simulation section; the simulated host has no apps and no position");
        SimulationConfig {
            installed_apps: Vec::new(),
            location_enabled: true,
            network_available: true,
            position: None,
        }
    });

    let feed = HttpPolicyFeed::from_config(&spec.feed, spec.timeouts.fetch())
        .context("Failed to build policy feed client")?;

    let debug_feed = match &spec.feed.debug_position_url {
        Some(url) => {
            let feed = HttpDebugPositionFeed::new(url.clone(), spec.timeouts.fetch())
                .context("Failed to build debug position client")?;
            Some(Arc::new(feed) as Arc<dyn DebugPositionFeed>)
        }
        None => None,
    };

    let capabilities = EngineCapabilities {
        host: Arc::new(InMemoryHost::from_config(&simulation)),
        position: Arc::new(SimulatedPositionSource::new(
            simulation.location_enabled,
            simulation.position,
        )),
        connectivity: Arc::new(SimulatedConnectivity::new(simulation.network_available)),
        feed: Arc::new(feed),
        verifier: Arc::new(CryptoSignatureVerifier::new()),
        debug_feed,
    };

    let event_bus = EventBus::with_default_capacity();
    let mut events = event_bus.subscribe();
    let engine = Arc::new(EnforcementLoop::new(
        EnforcementLoopConfig::from_spec(spec),
        capabilities,
        event_bus,
    ));
    let query = engine.query();
    let shutdown = engine.shutdown_token();

    println!(
        "{}",
        format!("Starting spacegate ({}) against {}", config.metadata.name, spec.feed.base_url).bold()
    );
    let handle = engine.start();

    let json = args.json;
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", render_event(&event, json)),
                Err(EventBusError::Lagged(skipped)) => {
                    warn!(skipped, "Event printer fell behind");
                }
                Err(_) => break,
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");
    shutdown.cancel();
    handle.await.context("Enforcement loop task failed")?;
    printer.abort();

    let active = query.list_active_restrictions();
    println!();
    println!(
        "{} {:?}, {} active restriction(s)",
        "Stopped. Final state:".bold(),
        query.fail_secure_state(),
        active.len()
    );
    for restriction in active {
        println!("  {}", restriction);
    }

    Ok(())
}

/// One-line rendering of an engine event.
pub fn render_event(event: &EnforcementEvent, json: bool) -> String {
    if json {
        return serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e));
    }

    match event {
        EnforcementEvent::PolicySynced {
            authorities_updated,
            highest_timestamp_seen,
            ..
        } => format!(
            "{} {} authorities updated (timestamp {})",
            "sync".cyan(),
            authorities_updated,
            highest_timestamp_seen
        ),
        EnforcementEvent::SyncFailed { reason, .. } => {
            format!("{} {}", "sync failed".yellow(), reason)
        }
        EnforcementEvent::FailSecureEntered { reason, .. } => {
            format!("{} {:?}", "FAIL-SECURE".red().bold(), reason)
        }
        EnforcementEvent::FailSecureExited { .. } => {
            format!("{}", "fail-secure cleared".green())
        }
        EnforcementEvent::RestrictionsApplied {
            restrictions,
            revoked_user_grants,
            ..
        } => format!(
            "{} [{}] ({} grants revoked)",
            "restricted".red(),
            restrictions.join(", "),
            revoked_user_grants
        ),
        EnforcementEvent::RestrictionsCleared {
            restored_user_grants,
            ..
        } => format!(
            "{} ({} grants restored)",
            "unrestricted".green(),
            restored_user_grants
        ),
        EnforcementEvent::ResolutionFailed { position, reason, .. } => {
            format!("{} at {}: {}", "resolution failed".yellow(), position, reason)
        }
        EnforcementEvent::PositionUpdated {
            position,
            from_debug_feed,
            ..
        } => {
            let source = if *from_debug_feed { " (debug override)" } else { "" };
            format!("{} {}{}", "position".dimmed(), position, source)
        }
    }
}
