// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "tethercam")]
#[command(about = "Remote control for tethered cameras")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Number of simulated cameras to attach
    #[arg(long, global = true, default_value = "1")]
    devices: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Take a photo
    Photo {
        /// Camera index to use (from 'tethercam list')
        #[arg(short, long, default_value = "0")]
        camera: usize,

        /// Output directory (default: ~/Pictures/tethercam)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Read one camera option
    Get {
        name: String,

        #[arg(short, long, default_value = "0")]
        camera: usize,
    },

    /// Write one camera option
    Set {
        name: String,

        /// Parsed as integer, then float, then boolean, else string
        value: String,

        #[arg(short, long, default_value = "0")]
        camera: usize,
    },

    /// Print the camera's option tree
    Options {
        #[arg(short, long, default_value = "0")]
        camera: usize,
    },

    /// Run the live view and report frames
    Preview {
        #[arg(short, long, default_value = "0")]
        camera: usize,

        /// Number of frames to receive
        #[arg(short, long, default_value = "30")]
        frames: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=tethercam=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let devices = cli.devices;

    match cli.command {
        Commands::List => cli::list_cameras(devices),
        Commands::Photo { camera, output } => cli::take_photo(devices, camera, output),
        Commands::Get { name, camera } => cli::get_option(devices, camera, &name),
        Commands::Set {
            name,
            value,
            camera,
        } => cli::set_option(devices, camera, &name, &value),
        Commands::Options { camera } => cli::list_options(devices, camera),
        Commands::Preview { camera, frames } => cli::preview(devices, camera, frames),
    }
}
