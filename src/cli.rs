// CLI definitions using clap

use clap::{Parser, Subcommand};
use ledstrip::{IndicatorState, Rgb};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ledstrip")]
#[command(author, version, about = "Addressable LED strip animation harness")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/ledstrip/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Use the log-only mock controller instead of the SPI strip
    #[arg(long, global = true)]
    pub mock: bool,

    /// Override the pixel count
    #[arg(long, global = true)]
    pub count: Option<usize>,

    /// Override the initial brightness (0-255)
    #[arg(long, global = true)]
    pub brightness: Option<u8>,

    /// Keep the final frame visible this long before closing (ms)
    #[arg(long, global = true, default_value = "2000")]
    pub hold_ms: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show one colour on every pixel
    #[command(visible_alias = "set")]
    Solid {
        /// Colour: "#RRGGBB", "r,g,b" or a name
        color: Rgb,
    },

    /// Light pixels one after another
    Wipe {
        color: Rgb,
        /// Delay per pixel (ms)
        #[arg(short, long, default_value = "50")]
        delay_ms: f64,
    },

    /// Endless rainbow (until Ctrl-C or --duration-ms)
    Rainbow {
        /// Delay per frame (ms)
        #[arg(short, long, default_value = "20")]
        wait_ms: f64,
        /// Stop after this many ms
        #[arg(long)]
        duration_ms: Option<u64>,
    },

    /// Rainbow spread over the whole strip, `cycles` times
    Cycle {
        #[arg(short, long, default_value = "20")]
        wait_ms: f64,
        #[arg(short, long, default_value = "1")]
        cycles: u32,
    },

    /// Endless colour wipe / black wipe
    Pulse {
        color: Rgb,
        #[arg(short, long, default_value = "20")]
        delay_ms: f64,
        #[arg(long)]
        duration_ms: Option<u64>,
    },

    /// Blank the strip
    Off,

    /// Show a colour, then change global brightness
    Brightness {
        level: u8,
        #[arg(long, default_value = "white")]
        color: Rgb,
    },

    /// Play indicator states in order (boot, ready, wake, listen, ...)
    Status {
        #[arg(required = true)]
        states: Vec<IndicatorState>,
        /// Time each state stays on (ms)
        #[arg(long, default_value = "1500")]
        step_ms: u64,
    },

    /// Smoke sequence: red, green wipe, one second of rainbow
    Demo,

    /// Print the effective configuration as TOML
    Config,
}
