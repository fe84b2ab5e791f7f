// Serial defaults, timeouts, topics
use std::time::Duration;

// Serial port the stage enumerates on
pub const DEFAULT_PORT: &str = "/dev/ttyUSB2";

// Per-read timeout handed to the serial port
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

// Sleep between read attempts while a response is incomplete
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

// Upper bound on waiting for one response (moves included)
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

// Upper bound on a full homing cycle
pub const DEFAULT_HOME_TIMEOUT: Duration = Duration::from_secs(30);

// Runtime loop frequency
pub const LOOP_HZ: u64 = 20;

// Zenoh topics
pub const TOPIC_CMD_STAGE: &str = "ell7/cmd/stage"; // commands
pub const TOPIC_STATE_POSITION: &str = "ell7/state/position"; // reports
pub const TOPIC_HEALTH: &str = "ell7/state/health"; // health status

/// Timing parameters for one controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub response_timeout: Duration,
    pub home_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            home_timeout: DEFAULT_HOME_TIMEOUT,
        }
    }
}
