//! ledstrip - LED strip animation harness
//!
//! Opens the configured strip, runs one command and always closes the
//! controller on the way out (including errors and Ctrl-C).

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use cli::{Cli, Commands};
use ledstrip::{
    build_led_control, frame_delay_from_millis, Backend, LedConfig, LedControl, Rgb,
    StatusIndicator,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = load_config(&cli)?;

    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let control = build_led_control(&config)
        .await
        .context("Failed to open LED strip")?;

    let result = tokio::select! {
        r = run(&cli, &config, Arc::clone(&control)) => r,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
    };

    if let Err(e) = control.close().await {
        warn!("Close failed: {}", e);
    }
    result
}

fn load_config(cli: &Cli) -> Result<LedConfig> {
    let path = cli.config.clone().unwrap_or_else(LedConfig::default_path);
    info!("Loading config from {:?}", path);
    let mut config = LedConfig::load(&path)?;

    if cli.mock {
        config.backend = Backend::Mock;
    }
    if let Some(count) = cli.count {
        config.count = count;
    }
    if let Some(brightness) = cli.brightness {
        config.brightness = brightness;
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: &Cli, config: &LedConfig, control: Arc<dyn LedControl>) -> Result<()> {
    let hold = Duration::from_millis(cli.hold_ms);

    match &cli.command {
        Commands::Solid { color } => {
            control.set_all(*color).await?;
            tokio::time::sleep(hold).await;
        }
        Commands::Wipe { color, delay_ms } => {
            let delay = frame_delay_from_millis(*delay_ms)?;
            control.color_wipe(*color, delay).await?;
            tokio::time::sleep(hold).await;
        }
        Commands::Rainbow {
            wait_ms,
            duration_ms,
        } => {
            let handle = control.rainbow(frame_delay_from_millis(*wait_ms)?).await?;
            run_for(*duration_ms).await;
            control.stop_animation().await?;
            handle.wait().await?;
        }
        Commands::Cycle { wait_ms, cycles } => {
            let handle = control
                .rainbow_cycle(frame_delay_from_millis(*wait_ms)?, *cycles)
                .await?;
            let outcome = handle.wait().await?;
            info!("Rainbow cycle {:?}", outcome);
            tokio::time::sleep(hold).await;
        }
        Commands::Pulse {
            color,
            delay_ms,
            duration_ms,
        } => {
            let handle = control
                .pulsed_wipe(*color, frame_delay_from_millis(*delay_ms)?)
                .await?;
            run_for(*duration_ms).await;
            control.stop_animation().await?;
            handle.wait().await?;
        }
        Commands::Off => {
            control.off().await?;
        }
        Commands::Brightness { level, color } => {
            control.set_all(*color).await?;
            control.set_brightness(*level).await?;
            tokio::time::sleep(hold).await;
        }
        Commands::Status { states, step_ms } => {
            let indicator = StatusIndicator::new(Arc::clone(&control), config.palette()?);
            for state in states {
                info!("State: {}", state);
                indicator.set_state(*state);
                tokio::time::sleep(Duration::from_millis(*step_ms)).await;
            }
            indicator.shutdown().await?;
        }
        Commands::Demo => demo(control.as_ref()).await?,
        // Handled before the strip is opened
        Commands::Config => {}
    }
    Ok(())
}

/// Sleep for `duration_ms`, or forever (until Ctrl-C) when not given
async fn run_for(duration_ms: Option<u64>) {
    match duration_ms {
        Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        None => std::future::pending().await,
    }
}

async fn demo(control: &dyn LedControl) -> Result<()> {
    info!("Demo: red");
    control.set_all(Rgb::RED).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;

    info!("Demo: green wipe");
    control
        .color_wipe(Rgb::GREEN, Duration::from_millis(50))
        .await?;

    info!("Demo: rainbow");
    let rainbow = control.rainbow(Duration::from_millis(20)).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;

    control.close().await?;
    info!("Demo: rainbow {:?}", rainbow.wait().await?);
    Ok(())
}
