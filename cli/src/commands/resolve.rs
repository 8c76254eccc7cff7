// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Offline resolution against a saved policy update.
//!
//! The snapshot is the same JSON envelope the feed serves. Signatures are only
//! checked with `--verify`, so hand-written fixtures can be resolved directly.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use spacegate_core::application::resolver::{PolicyResolver, Resolution, ResolutionError};
use spacegate_core::application::sync_reconciler::reconcile;
use spacegate_core::domain::capabilities::SignatureVerifier;
use spacegate_core::domain::engine_config::EngineConfigManifest;
use spacegate_core::domain::geometry::Coordinate;
use spacegate_core::domain::policy_graph::PolicyGraph;
use spacegate_core::domain::sync_state::SyncState;
use spacegate_core::infrastructure::feed_codec::UpdateEnvelope;
use spacegate_core::infrastructure::signature::CryptoSignatureVerifier;

#[derive(Args)]
pub struct ResolveArgs {
    /// Policy update JSON file
    #[arg(long, value_name = "FILE")]
    pub snapshot: PathBuf,

    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub alt: f64,

    /// Check the snapshot signature with the configured feed key
    #[arg(long)]
    pub verify: bool,
}

/// Resolution of one position plus the chain failure, if any.
#[derive(Debug)]
pub struct SnapshotResolution {
    pub authorities: usize,
    pub resolution: Resolution,
    pub failure: Option<ResolutionError>,
}

pub async fn execute(args: ResolveArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = EngineConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config
        .spec
        .resolver
        .validate()
        .context("Configuration validation failed")?;

    let blob = std::fs::read(&args.snapshot)
        .with_context(|| format!("Failed to read snapshot {:?}", args.snapshot))?;

    let position = Coordinate::new(args.lat, args.lon, args.alt);
    let key = if args.verify {
        let key = config
            .spec
            .feed
            .public_key
            .clone()
            .context("--verify requires spec.feed.public_key")?;
        Some((config.spec.feed.algorithm.clone(), key))
    } else {
        None
    };

    let outcome = resolve_snapshot(
        &blob,
        &position,
        config.spec.resolver.max_delegation_hops,
        key.as_ref().map(|(algorithm, key)| (algorithm.as_str(), key.as_str())),
    )?;

    println!(
        "Resolved {} against {} authorities",
        position.to_string().bold(),
        outcome.authorities
    );

    if let Some(failure) = &outcome.failure {
        println!("{} {}", "⚠ Delegation chain broken:".yellow(), failure);
        println!(
            "{}",
            format!(
                "  Applying the {} restriction(s) resolved before the break",
                failure.partial().len()
            )
            .yellow()
        );
    }

    match &outcome.resolution {
        Resolution::NotControlled => {
            println!("{}", "Position is not controlled by any authority".green());
        }
        Resolution::Controlled(entries) if entries.is_empty() => {
            println!("{}", "Controlled, no restrictions apply".green());
        }
        Resolution::Controlled(entries) => {
            println!("{}", format!("{} restriction(s):", entries.len()).bold());
            for entry in entries {
                println!("  {}", entry.to_string().red());
            }
        }
    }

    Ok(())
}

/// Decode `blob`, load it into a fresh graph and resolve `position`.
///
/// With `verify = Some((algorithm, public_key))` an unsigned or badly signed
/// snapshot is an error.
pub fn resolve_snapshot(
    blob: &[u8],
    position: &Coordinate,
    max_hops: usize,
    verify: Option<(&str, &str)>,
) -> Result<SnapshotResolution> {
    let envelope = UpdateEnvelope::decode(blob).context("Snapshot is not a valid policy update")?;

    if let Some((algorithm, public_key)) = verify {
        let signature = envelope
            .signature
            .as_deref()
            .context("Snapshot is not signed")?;
        if envelope.algorithm.as_deref().is_some_and(|claimed| claimed != algorithm) {
            anyhow::bail!("Snapshot is signed with a different algorithm than {}", algorithm);
        }
        if !CryptoSignatureVerifier::new().verify(&envelope.payload, signature, algorithm, public_key) {
            anyhow::bail!("Snapshot signature does not verify with the configured key");
        }
    }

    let update = envelope.into_update().context("Snapshot contains an invalid policy")?;

    let mut graph = PolicyGraph::new();
    let mut sync_state = SyncState::new();
    reconcile(update, &mut graph, &mut sync_state, chrono::Utc::now());

    let (resolution, failure) = match PolicyResolver::new(max_hops).resolve(&graph, position) {
        Ok(resolution) => (resolution, None),
        Err(err) => (err.clone().into_fail_closed(), Some(err)),
    };

    Ok(SnapshotResolution {
        authorities: graph.len(),
        resolution,
        failure,
    })
}
