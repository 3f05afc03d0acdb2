//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{DriverConfig, FanoutBlueprint};
use std::time::Duration;
use tracing::info;

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut blueprint, args)?;

    info!(
        devices = blueprint.driver.device_count(),
        consumers = blueprint.consumers.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        duration: (args.duration > 0).then(|| Duration::from_secs(args.duration)),
        stats_interval: Duration::from_millis(args.stats_interval_ms.max(1)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    let stats = Pipeline::new(pipeline_config)
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        duration_secs = stats.duration.as_secs_f64(),
        interrupted = stats.interrupted,
        "Run finished"
    );
    stats.print_summary();

    Ok(())
}

/// Apply CLI overrides to the replay driver
fn apply_overrides(blueprint: &mut FanoutBlueprint, args: &RunArgs) -> Result<()> {
    if args.replay_speed.is_none() && !args.replay_loop {
        return Ok(());
    }

    match &mut blueprint.driver {
        DriverConfig::Replay {
            speed,
            loop_playback,
            ..
        } => {
            if let Some(s) = args.replay_speed {
                if !config_loader::is_positive_finite(s) {
                    anyhow::bail!("--replay-speed must be finite and > 0, got {s}");
                }
                info!(speed = s, "Overriding replay speed from CLI");
                *speed = s;
            }
            if args.replay_loop {
                *loop_playback = true;
            }
            Ok(())
        }
        DriverConfig::Mock { .. } => {
            anyhow::bail!("--replay-speed/--replay-loop require a replay driver")
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &FanoutBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    let kind = match &blueprint.driver {
        DriverConfig::Mock { .. } => "mock".to_string(),
        DriverConfig::Replay {
            speed,
            loop_playback,
            ..
        } => format!("replay (speed {speed}, loop {loop_playback})"),
    };
    println!("Driver: {kind}");
    println!("\nDevices ({}):", blueprint.driver.device_count());
    for (i, id) in blueprint.driver.device_ids().iter().enumerate() {
        println!("  {}. {}", i + 1, id);
    }

    if !blueprint.consumers.is_empty() {
        println!("\nConsumers ({}):", blueprint.consumers.len());
        for consumer in &blueprint.consumers {
            println!(
                "  - {} ({:?}, device_index {}, {:?})",
                consumer.name, consumer.output.output_type, consumer.device_index, consumer.queue
            );
        }
    }

    println!();
}
