use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use ell7_driver::config::{self, ControllerConfig};
use ell7_driver::stage::MotionController;

/// Drive a Thorlabs ELL7 stage over its serial port
#[derive(Debug, Parser)]
#[command(name = "ell7", version)]
struct Cli {
    /// Serial port the stage is attached to
    #[arg(long, default_value = config::DEFAULT_PORT)]
    port: String,

    /// Per-read serial timeout in milliseconds
    #[arg(long, default_value_t = config::DEFAULT_TIMEOUT.as_millis() as u64)]
    timeout_ms: u64,

    /// Sleep between read attempts in milliseconds
    #[arg(long, default_value_t = config::DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    poll_ms: u64,

    /// Give up on a response after this many milliseconds
    #[arg(long, default_value_t = config::DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64)]
    response_timeout_ms: u64,

    /// Give up on homing after this many milliseconds
    #[arg(long, default_value_t = config::DEFAULT_HOME_TIMEOUT.as_millis() as u64)]
    home_timeout_ms: u64,

    /// Don't log the reported position
    #[arg(long)]
    quiet: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Report the homed position. Opening the stage already runs the homing
    /// cycle, so no second `ho` command is sent.
    Home,
    /// Print the absolute position in motor units
    Position,
    /// Move to an absolute position in motor units
    MoveAbs {
        #[arg(allow_negative_numbers = true)]
        position: i32,
    },
    /// Move by a signed offset in motor units
    MoveRel {
        #[arg(allow_negative_numbers = true)]
        offset: i32,
    },
    /// Serve stage commands over zenoh
    Serve,
}

impl Cli {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            poll_interval: Duration::from_millis(self.poll_ms),
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            home_timeout: Duration::from_millis(self.home_timeout_ms),
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("ell7 error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = cli.controller_config();
    let verbose = !cli.quiet;

    let open = || MotionController::open_with_config(&cli.port, config.clone());
    let position = match cli.command {
        Cmd::Serve => return ell7_driver::runtime::run(&cli.port, config.clone()).await,
        // Opening the stage homes it; report where it landed
        Cmd::Home => open()?.get_abs(false)?,
        Cmd::Position => open()?.get_abs(verbose)?,
        Cmd::MoveAbs { position } => open()?.move_abs(position, verbose)?,
        Cmd::MoveRel { offset } => open()?.move_rel(offset, verbose)?,
    };
    println!("{}", position);

    Ok(())
}
