// Message types shared by the controller, the runtime and its clients

use serde::{Deserialize, Serialize};

/// Command from clients -> runtime, tagged by "op"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StageCommand {
    Home,
    GetPosition,
    MoveAbs { position: i32 },
    MoveRel { offset: i32 },
}

/// Position reported by the stage after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub command: StageCommand,
    pub position: i32,
}

/// Notification emitted by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MotionEvent {
    Homed { position: i32 },
    Position { position: i32 },
}

impl MotionEvent {
    pub fn position(&self) -> i32 {
        match *self {
            MotionEvent::Homed { position } | MotionEvent::Position { position } => position,
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    Fault,
}
