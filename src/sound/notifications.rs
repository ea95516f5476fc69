//! notifications the engine sends to whoever drives the UI
use serde_json::json;
use std::fmt;

use crate::common::room_info::RoomInfo;

use super::local_input::InputRouting;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotification {
    EnteredRoom(RoomInfo),
    ExitedRoom { error: bool },
    InputSelectionChanged { input_index: usize, routing: InputRouting },
    EngineStopped { reason: String },
    SampleRateChanged(u32),
    Status(serde_json::Value),
}

impl EngineNotification {
    pub fn as_json(&self) -> serde_json::Value {
        match self {
            EngineNotification::EnteredRoom(room) => json!({
                "event": "enteredRoom",
                "roomId": room.id,
                "name": room.name,
                "server": room.server.to_string(),
            }),
            EngineNotification::ExitedRoom { error } => json!({
                "event": "exitedRoom",
                "error": error,
            }),
            EngineNotification::InputSelectionChanged { input_index, routing } => json!({
                "event": "inputSelectionChanged",
                "inputIndex": input_index,
                "routing": routing.to_string(),
            }),
            EngineNotification::EngineStopped { reason } => json!({
                "event": "engineStopped",
                "reason": reason,
            }),
            EngineNotification::SampleRateChanged(rate) => json!({
                "event": "sampleRateChanged",
                "sampleRate": rate,
            }),
            EngineNotification::Status(v) => json!({
                "event": "status",
                "status": v,
            }),
        }
    }
}

impl fmt::Display for EngineNotification {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_json())
    }
}
