// Command loop: zenoh commands in, stage reports and health out
// The controller blocks while the stage moves, so each command runs through
// block_in_place and commands are handled strictly one at a time.

use std::time::Duration;
use tokio::task::block_in_place;
use tokio::time::interval;
use tracing::{info, warn};

// local imports
use crate::config::{ControllerConfig, LOOP_HZ, TOPIC_CMD_STAGE, TOPIC_HEALTH, TOPIC_STATE_POSITION};
use crate::messages::{RuntimeHealth, StageCommand, StageReport};
use crate::stage::{Ell7Error, MotionController, Transport};

pub struct Runtime {
    health: RuntimeHealth,
    last_position: Option<i32>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            health: RuntimeHealth::Ok,
            last_position: None,
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn last_position(&self) -> Option<i32> {
        self.last_position
    }

    /// Run one command against the stage and track health
    pub fn execute<T: Transport>(
        &mut self,
        controller: &mut MotionController<T>,
        cmd: StageCommand,
    ) -> Result<StageReport, Ell7Error> {
        info!("Received command: {:?}", &cmd);
        let result = match cmd {
            StageCommand::Home => controller.home(),
            StageCommand::GetPosition => controller.get_abs(true),
            StageCommand::MoveAbs { position } => controller.move_abs(position, true),
            StageCommand::MoveRel { offset } => controller.move_rel(offset, true),
        };

        match result {
            Ok(position) => {
                self.health = RuntimeHealth::Ok;
                self.last_position = Some(position);
                Ok(StageReport {
                    command: cmd,
                    position,
                })
            }
            Err(e) => {
                warn!("Stage command {:?} failed: {}", cmd, e);
                self.health = RuntimeHealth::Fault;
                Err(e)
            }
        }
    }
}

pub async fn run(
    port: &str,
    config: ControllerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_STAGE).await?;
    let pub_position = session.declare_publisher(TOPIC_STATE_POSITION).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    info!("Homing stage on {}...", port);
    let mut controller = block_in_place(|| MotionController::open_with_config(port, config))?;

    let mut runtime = Runtime::new();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!("Runtime started: {}Hz loop", LOOP_HZ);
    info!("Subscribed to: {}", TOPIC_CMD_STAGE);
    info!("Publishing to: {}, {}", TOPIC_STATE_POSITION, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain pending commands (non-blocking), executing them in order
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            let cmd = match serde_json::from_slice::<StageCommand>(&payload) {
                Ok(cmd) => cmd,
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                    continue;
                }
            };

            // 2. Execute and publish the reported position
            if let Ok(report) = block_in_place(|| runtime.execute(&mut controller, cmd)) {
                let report_json = serde_json::to_string(&report)?;
                pub_position.put(report_json).await?;
            }
        }

        // 3. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;
    use crate::stage::transport::scripted::ScriptedTransport;

    fn controller(replies: &[&[u8]]) -> MotionController<ScriptedTransport> {
        let mut transport = ScriptedTransport::new().then(b"0PO00000000\r\n");
        for reply in replies {
            transport.queue(reply);
        }
        let config = ControllerConfig {
            timeout: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
            response_timeout: Duration::from_millis(50),
            home_timeout: Duration::from_millis(50),
        };
        MotionController::with_transport(transport, config).unwrap()
    }

    #[test]
    fn test_execute_reports_position() {
        let mut stage = controller(&[b"0PO000001F4\r\n", b"0PO000001EA\r\n"]);
        let mut runtime = Runtime::new();

        let report = runtime
            .execute(&mut stage, StageCommand::MoveAbs { position: 500 })
            .unwrap();
        assert_eq!(report.position, 500);

        let report = runtime
            .execute(&mut stage, StageCommand::MoveRel { offset: -10 })
            .unwrap();
        assert_eq!(report.command, StageCommand::MoveRel { offset: -10 });
        assert_eq!(report.position, 490);
        assert_eq!(runtime.last_position(), Some(490));
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_failure_sets_fault_until_next_success() {
        let mut stage = controller(&[b"0ER0000\r\n", b"0PO00000007\r\n"]);
        let mut runtime = Runtime::new();

        assert!(runtime.execute(&mut stage, StageCommand::GetPosition).is_err());
        assert_eq!(runtime.health(), RuntimeHealth::Fault);
        assert_eq!(runtime.last_position(), None);

        let report = runtime.execute(&mut stage, StageCommand::GetPosition).unwrap();
        assert_eq!(report.position, 7);
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }

    #[test]
    #[traced_test]
    fn test_every_failure_is_logged() {
        let mut stage = controller(&[b"0ER0000\r\n"]);
        let mut runtime = Runtime::new();

        assert!(runtime.execute(&mut stage, StageCommand::GetPosition).is_err());
        assert!(runtime
            .execute(&mut stage, StageCommand::MoveRel { offset: 5 })
            .is_err());

        assert_eq!(runtime.health(), RuntimeHealth::Fault);
        assert!(logs_contain("Stage command GetPosition failed: Malformed response"));
        assert!(logs_contain("failed: Timeout after"));
    }

    #[test]
    fn test_home_command_rehomes() {
        let mut stage = controller(&[b"0PO00000000\r\n"]);
        let mut runtime = Runtime::new();

        let report = runtime.execute(&mut stage, StageCommand::Home).unwrap();
        assert_eq!(report.position, 0);
        assert_eq!(stage.transport().last_write(), Some(&b"0ho0\r\n"[..]));
    }
}
