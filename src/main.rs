use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stgctl::{init_logging, list_ports, open_stage, prepare_raster, Config, MoveOutcome, Size};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Drive an XY stage through a VMX stepping motor controller"
)]
struct Args {
    /// Configuration file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port of the controller; overrides configuration and discovery
    #[arg(short, long)]
    port: Option<String>,

    /// Use the built-in simulated controller and only log trigger signals
    #[arg(long)]
    simulate: bool,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Home, then record the positions of all four limit switch corners
    Startup {
        /// Write the recorded positions to the limit switch file
        #[arg(long)]
        save: bool,
    },
    /// Run the raster scan
    Raster {
        /// Do not send acquisition start and stop signals
        #[arg(long)]
        no_signal: bool,

        /// Limit switch positions recorded by a previous startup
        #[arg(long)]
        limit_switch_file: Option<PathBuf>,
    },
    /// Send both stages to the positive limit switches and set the origin there
    Home,
    /// Check the acquisition trigger with a short test move
    TestSignal,
    /// Move to index coordinates
    Goto {
        /// X index
        #[arg(allow_negative_numbers = true)]
        x: i64,

        /// Y index
        #[arg(allow_negative_numbers = true)]
        y: i64,

        /// Move relative to the current position
        #[arg(short, long)]
        relative: bool,

        /// Motor speed in idx/s
        #[arg(short, long)]
        speed: Option<u32>,
    },
    /// List serial ports, marking those that match the device pattern
    Ports,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    let log_path = init_logging(&config.logging)?;
    tracing::info!("stgctl {} logging to {}", stgctl::VERSION, log_path.display());

    if let Action::Ports = args.command {
        let pattern = config.device.pattern()?;
        for port in list_ports()? {
            let marker = if port.matches(&pattern) { "*" } else { " " };
            println!("{} {}  {}", marker, port.port_name, port.description);
        }
        return Ok(());
    }

    let mut stage = open_stage(&config, args.port.as_deref(), args.simulate)?;

    match args.command {
        Action::Startup { save } => {
            let sample = stage.startup(save)?;
            if sample.is_complete() {
                println!("Limit switch positions: {:?}", sample.positions());
            } else {
                anyhow::bail!(
                    "Startup recorded only {} of 5 limit switch positions",
                    sample.len()
                );
            }
        }
        Action::Raster {
            no_signal,
            limit_switch_file,
        } => {
            prepare_raster(&mut stage, limit_switch_file.as_deref())?;
            stage.raster(!no_signal)?;
        }
        Action::Home => {
            if stage.home()? == MoveOutcome::TimedOut {
                anyhow::bail!("Homing did not complete");
            }
        }
        Action::TestSignal => stage.test_signal_setup()?,
        Action::Goto {
            x,
            y,
            relative,
            speed,
        } => {
            let speed = speed.unwrap_or(config.motion.goto_speed);
            if stage.goto(Size::new(x, y), relative, speed)? == MoveOutcome::TimedOut {
                anyhow::bail!("Move did not complete; stage position is unknown");
            }
        }
        Action::Ports => {}
    }

    Ok(())
}
