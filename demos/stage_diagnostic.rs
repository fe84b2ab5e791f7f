// Stage diagnostic: home, read back the position, optionally jog and return
//
// Usage: cargo run --example stage_diagnostic -- [port]
// Example: cargo run --example stage_diagnostic -- /dev/ttyUSB2
//
// Opening the stage homes it, so the carriage WILL move.

use ell7_driver::config::{ControllerConfig, DEFAULT_PORT};
use ell7_driver::stage::MotionController;
use std::io::{self, Write};
use tracing_subscriber::filter::LevelFilter;

const TEST_OFFSET: i32 = 2048; // motor units

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(LevelFilter::DEBUG.into()),
        )
        .init();

    // Get port from args or use default
    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_PORT.to_string());

    println!("ELL7 stage diagnostic");
    println!("Serial port: {}", port);
    println!();

    if !confirm("Opening the stage homes it. Is the travel range clear?")? {
        return Ok(());
    }

    // Step 1: open and home
    println!("Step 1: Opening serial port and homing...");
    let mut stage = match MotionController::open_with_config(&port, ControllerConfig::default()) {
        Ok(stage) => {
            println!("  ✓ Stage homed");
            stage
        }
        Err(e) => {
            println!("  ✗ Failed to open or home the stage: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the USB cable is connected and the stage is powered");
            return Err(e.into());
        }
    };
    println!();

    // Step 2: read back
    println!("Step 2: Reading position...");
    let home = stage.get_abs(true)?;
    println!("  ✓ Position: {} motor units", home);
    println!();

    // Step 3: optional jog
    if !confirm(&format!("Step 3: move by +{} units and back?", TEST_OFFSET))? {
        return Ok(());
    }

    let out = stage.move_rel(TEST_OFFSET, true)?;
    println!("  Moved to {} (expected {})", out, home + TEST_OFFSET);
    let back = stage.move_abs(home, true)?;
    println!("  Returned to {} (expected {})", back, home);

    if back == home {
        println!("  ✓ Stage returned to its starting position");
    } else {
        println!("  ⚠ Stage settled {} units away", back - home);
    }

    Ok(())
}
