//! # Hy8601 Controller Binary
//!
//! Brings up one Hy8601 card and either keeps it running or issues a single
//! command against it.
//!
//! # Usage
//!
//! ```bash
//! # Run against the simulated carrier until Ctrl-C
//! hy8601 --simulate run
//!
//! # Run on real hardware through UIO, one device per slot
//! hy8601 --config /etc/hy8601/config.toml --uio /dev/uio0 run
//!
//! # One-shot commands
//! hy8601 -s move 0 1000 --relative
//! hy8601 -s jog 1 -- -500 --duration-ms 2000
//! hy8601 -s report --level 1 --format json
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use hy8601_common::config::{ConfigError, ConfigLoader, Hy8601Config, LogLevel};
use hy8601_common::consts::DEFAULT_CONFIG_PATH;
use hy8601_common::hal::config::CardConfig;
use hy8601_hal::{CarrierOptions, Controller, ParamStore, default_registry};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Hy8601 stepper-motor IP card controller
#[derive(Parser, Debug)]
#[command(name = "hy8601")]
#[command(version)]
#[command(about = "Controller for the Hytec 8601 four-axis stepper-motor IP card")]
#[command(long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use the simulated carrier (exclusive - ignores --uio)
    #[arg(short = 's', long)]
    simulate: bool,

    /// UIO device for each carrier slot, in slot order (can be repeated)
    #[arg(long = "uio", action = clap::ArgAction::Append)]
    uio: Vec<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep the controller running until Ctrl-C
    Run,
    /// Print the controller report
    Report {
        /// Detail level, 2 and above adds the published parameters
        #[arg(long, default_value_t = 1)]
        level: u32,
        /// Output format
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// Move an axis and wait for completion
    Move {
        axis: usize,
        #[arg(allow_hyphen_values = true)]
        position: f64,
        /// Treat the position as a delta
        #[arg(long)]
        relative: bool,
        #[arg(long, default_value_t = 1000.0)]
        velocity: f64,
        #[arg(long, default_value_t = 0.0)]
        acceleration: f64,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 30)]
        timeout_s: u64,
    },
    /// Home an axis and wait for completion
    Home {
        axis: usize,
        /// Search in the negative direction
        #[arg(long)]
        reverse: bool,
        #[arg(long, default_value_t = 1000.0)]
        velocity: f64,
        #[arg(long, default_value_t = 30)]
        timeout_s: u64,
    },
    /// Jog an axis for a fixed time, then stop on the ramp
    Jog {
        axis: usize,
        /// Signed velocity in steps per second
        #[arg(allow_hyphen_values = true)]
        velocity: f64,
        #[arg(long, default_value_t = 1000)]
        duration_ms: u64,
        #[arg(long, default_value_t = 1000.0)]
        deceleration: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("hy8601 failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = load_config(&args);
    let log_level = loaded
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);

    info!("Hy8601 controller v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = loaded?;
    config.validate()?;
    let card = config.card;

    let (carrier_name, options) = carrier_selection(&args, &card);
    info!("Using carrier '{}'", carrier_name);
    let carrier = default_registry().create(carrier_name, &options)?;

    let params = Arc::new(ParamStore::new());
    params.subscribe(|axis, param, value| {
        debug!(axis, name = param.name(), %value, "parameter changed");
    });
    let mut controller = Controller::configure(card, carrier, params.clone());
    if let Some(e) = controller.setup_error() {
        warn!("Controller is not operational: {}", e);
    }

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run_until_signal(&controller)?,
        Command::Report { level, format } => match format {
            ReportFormat::Text => {
                let mut out = std::io::stdout().lock();
                controller.report(&mut out, level)?;
                if level >= 2 {
                    for axis in 0..controller.num_axes() {
                        writeln!(out, "  axis {axis} parameters")?;
                        params.write_values(&mut out, axis)?;
                    }
                }
            }
            ReportFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&controller.report_data())?)
            }
        },
        Command::Move {
            axis,
            position,
            relative,
            velocity,
            acceleration,
            timeout_s,
        } => {
            controller.move_axis(axis, position, relative, 0.0, velocity, acceleration)?;
            wait_idle(&controller, axis, Duration::from_secs(timeout_s))?;
            println!("axis {} at {}", axis, controller.read_position(axis)?);
        }
        Command::Home {
            axis,
            reverse,
            velocity,
            timeout_s,
        } => {
            controller.home(axis, 0.0, velocity, 0.0, !reverse)?;
            wait_idle(&controller, axis, Duration::from_secs(timeout_s))?;
            println!("axis {} homed at {}", axis, controller.read_position(axis)?);
        }
        Command::Jog {
            axis,
            velocity,
            duration_ms,
            deceleration,
        } => {
            controller.move_velocity(axis, 0.0, velocity, 0.0)?;
            std::thread::sleep(Duration::from_millis(duration_ms));
            controller.stop(axis, deceleration)?;
            wait_idle(&controller, axis, Duration::from_secs(10))?;
            println!("axis {} stopped at {}", axis, controller.read_position(axis)?);
        }
    }

    controller.shutdown();
    info!("Hy8601 controller shutdown complete");
    Ok(())
}

/// Load the configuration file. A missing file in simulation mode falls
/// back to defaults.
fn load_config(args: &Args) -> Result<Hy8601Config, ConfigError> {
    match Hy8601Config::load(&args.config) {
        Err(ConfigError::FileNotFound) if args.simulate => Ok(Hy8601Config {
            shared: hy8601_common::config::SharedConfig {
                log_level: LogLevel::default(),
                service_name: "hy8601-sim".to_string(),
            },
            card: CardConfig::new("HY8601_SIM"),
        }),
        other => other,
    }
}

fn carrier_selection(args: &Args, card: &CardConfig) -> (&'static str, CarrierOptions) {
    let sim_options = CarrierOptions {
        sim_slots: card.slot as usize + 1,
        sim_clock: Some(Duration::from_millis(10)),
        ..CarrierOptions::default()
    };

    if args.simulate {
        info!("Simulation mode enabled (exclusive)");
        ("simulation", sim_options)
    } else if !args.uio.is_empty() {
        (
            "uio",
            CarrierOptions {
                uio_devices: args.uio.clone(),
                ..CarrierOptions::default()
            },
        )
    } else {
        warn!("No --uio device given, falling back to the simulated carrier");
        ("simulation", sim_options)
    }
}

fn run_until_signal(controller: &Controller) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        let _ = tx.try_send(());
    })?;

    info!("{} running, press Ctrl-C to stop", controller.port_name());
    let _ = rx.recv();
    Ok(())
}

fn wait_idle(
    controller: &Controller,
    axis: usize,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let deadline = Instant::now() + timeout;
    loop {
        let idle = controller
            .axis_states()
            .get(axis)
            .map_or(true, |state| state.is_idle());
        if idle {
            return Ok(());
        }
        if Instant::now() >= deadline {
            warn!("Axis {} still moving after {:?}, stopping", axis, timeout);
            controller.stop(axis, 0.0)?;
            return Err(format!("axis {axis} did not finish within {timeout:?}").into());
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Setup tracing subscriber from CLI arguments and the configured level.
fn setup_tracing(args: &Args, level: LogLevel) {
    let directive = if args.verbose {
        "debug"
    } else {
        level.as_directive()
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(directive.parse().unwrap_or_else(|_| tracing::Level::INFO.into()));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
