//! These modules are shared by the audio side and the control side of the engine.
pub mod atomic_float;
pub mod box_error;
pub mod config;
pub mod engine_settings;
pub mod room_info;
pub mod rt_swap;
pub mod stream_time_stat;

use rand::Rng;

/// a fresh random identifier, 32 lowercase hex characters
///
/// Used to tag this engine instance when it talks to a session server.
pub fn new_guid() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
