//! typed view of the engine configuration
//!
//! Built from a [`Config`] so values can come from a settings file, or from
//! [`EngineSettings::default`] for tests and embedded use.
use simple_error::bail;
use std::time::Duration;

use super::box_error::BoxError;
use super::config::Config;

/// Stereo placement law used by the mixer when applying a track's pan
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PanLaw {
    /// sqrt gains, both sides at unity in the center
    ConstantPower,
    /// straight-line balance, both sides at unity in the center
    Linear,
}

impl PanLaw {
    pub fn from_name(name: &str) -> Option<PanLaw> {
        match name {
            "constant_power" => Some(PanLaw::ConstantPower),
            "linear" => Some(PanLaw::Linear),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub sample_rate: u32,
    pub frame_size: usize,
    pub relay_queue_depth: usize,
    pub relay_send_timeout: Duration,
    pub relay_drain_timeout: Duration,
    pub event_queue_depth: usize,
    pub peak_release_ms: f64,
    pub peak_hold_ms: f64,
    pub pan_law: PanLaw,
    pub room_prebuffer_ms: u32,
    pub room_buffer_ms: u32,
    pub capture_buffer_ms: u32,
    pub midi_queue_depth: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            sample_rate: 48_000,
            frame_size: 128,
            relay_queue_depth: 256,
            relay_send_timeout: Duration::from_millis(5),
            relay_drain_timeout: Duration::from_millis(500),
            event_queue_depth: 64,
            peak_release_ms: 300.0,
            peak_hold_ms: 50.0,
            pan_law: PanLaw::ConstantPower,
            room_prebuffer_ms: 40,
            room_buffer_ms: 500,
            capture_buffer_ms: 100,
            midi_queue_depth: 256,
        }
    }
}

impl EngineSettings {
    /// json defaults handed to [`Config::build`] so every key has a value
    pub fn config_defaults() -> json::JsonValue {
        let d = EngineSettings::default();
        json::object! {
            "sample_rate": d.sample_rate,
            "frame_size": d.frame_size as u32,
            "relay_queue_depth": d.relay_queue_depth as u32,
            "relay_send_timeout_ms": d.relay_send_timeout.as_millis() as u32,
            "relay_drain_timeout_ms": d.relay_drain_timeout.as_millis() as u32,
            "event_queue_depth": d.event_queue_depth as u32,
            "peak_release_ms": d.peak_release_ms,
            "peak_hold_ms": d.peak_hold_ms,
            "pan_law": "constant_power",
            "room_prebuffer_ms": d.room_prebuffer_ms,
            "room_buffer_ms": d.room_buffer_ms,
            "capture_buffer_ms": d.capture_buffer_ms,
            "midi_queue_depth": d.midi_queue_depth as u32,
        }
    }

    pub fn from_config(config: &Config) -> Result<EngineSettings, BoxError> {
        let pan_name = config.get_str_value("pan_law", None)?;
        let pan_law = match PanLaw::from_name(&pan_name) {
            Some(law) => law,
            None => bail!("unknown pan_law '{}'", pan_name),
        };
        let settings = EngineSettings {
            sample_rate: config.get_u32_value("sample_rate", None)?,
            frame_size: config.get_u32_value("frame_size", None)? as usize,
            relay_queue_depth: config.get_u32_value("relay_queue_depth", None)? as usize,
            relay_send_timeout: Duration::from_millis(
                config.get_u32_value("relay_send_timeout_ms", None)? as u64,
            ),
            relay_drain_timeout: Duration::from_millis(
                config.get_u32_value("relay_drain_timeout_ms", None)? as u64,
            ),
            event_queue_depth: config.get_u32_value("event_queue_depth", None)? as usize,
            peak_release_ms: config.get_f64_value("peak_release_ms", None)?,
            peak_hold_ms: config.get_f64_value("peak_hold_ms", None)?,
            pan_law,
            room_prebuffer_ms: config.get_u32_value("room_prebuffer_ms", None)?,
            room_buffer_ms: config.get_u32_value("room_buffer_ms", None)?,
            capture_buffer_ms: config.get_u32_value("capture_buffer_ms", None)?,
            midi_queue_depth: config.get_u32_value("midi_queue_depth", None)? as usize,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), BoxError> {
        if self.sample_rate == 0 {
            bail!("sample_rate must be greater than zero");
        }
        if self.frame_size == 0 {
            bail!("frame_size must be greater than zero");
        }
        if self.relay_queue_depth == 0 || self.event_queue_depth == 0 || self.midi_queue_depth == 0 {
            bail!("queue depths must be greater than zero");
        }
        if self.peak_release_ms < 0.0 || self.peak_hold_ms < 0.0 {
            bail!("peak meter times cannot be negative");
        }
        if self.room_prebuffer_ms > self.room_buffer_ms {
            bail!("room_prebuffer_ms cannot exceed room_buffer_ms");
        }
        Ok(())
    }

    /// number of frames that fit in `msec` at the given rate
    pub fn frames_for_ms(msec: u32, sample_rate: u32) -> usize {
        (msec as u64 * sample_rate as u64 / 1000) as usize
    }
}
