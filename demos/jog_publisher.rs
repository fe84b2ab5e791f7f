// Keyboard jog: A/D step, R/F step size, G read position, H home, Q quit
//
// Publishes StageCommand JSON to the runtime started with `ell7 serve`.
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use ell7_driver::config::{TOPIC_CMD_STAGE, TOPIC_STATE_POSITION};
use ell7_driver::messages::{StageCommand, StageReport};
use std::time::Duration;
use tracing::{info, warn};

const STEPS: [i32; 4] = [16, 256, 2048, 16384]; // motor units

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Controls: A/D=jog, R/F=step size, G=position, H=home, Q=quit");
    print_step(0);

    enable_raw_mode()?;
    let result = run_jog(&session).await;
    disable_raw_mode()?;

    result
}

async fn run_jog(
    session: &zenoh::Session,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let publisher = session.declare_publisher(TOPIC_CMD_STAGE).await?;
    let reports = session.declare_subscriber(TOPIC_STATE_POSITION).await?;
    let mut step_idx: usize = 0;

    loop {
        // Poll for key with 20ms timeout
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press;

                let cmd = match code {
                    KeyCode::Char('a') if pressed => Some(StageCommand::MoveRel {
                        offset: -STEPS[step_idx],
                    }),
                    KeyCode::Char('d') if pressed => Some(StageCommand::MoveRel {
                        offset: STEPS[step_idx],
                    }),
                    KeyCode::Char('g') if pressed => Some(StageCommand::GetPosition),
                    KeyCode::Char('h') if pressed => Some(StageCommand::Home),

                    // Step size
                    KeyCode::Char('r') if pressed => {
                        step_idx = (step_idx + 1).min(STEPS.len() - 1);
                        print_step(step_idx);
                        None
                    }
                    KeyCode::Char('f') if pressed => {
                        step_idx = step_idx.saturating_sub(1);
                        print_step(step_idx);
                        None
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => None,
                };

                if let Some(cmd) = cmd {
                    publisher.put(serde_json::to_string(&cmd)?).await?;
                }
            }
        }

        // Show what the stage reported
        while let Ok(Some(sample)) = reports.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<StageReport>(&payload) {
                Ok(report) => info!("Stage at {}\r", report.position),
                Err(e) => warn!("Failed to parse report: {}\r", e),
            }
        }
    }

    Ok(())
}

fn print_step(idx: usize) {
    info!("Step: {} units\r", STEPS[idx]);
}
