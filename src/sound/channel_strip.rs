//! per-track controls shared between the control side and the mixer
//!
//! Every field is atomic so the control side can change a track while the
//! callback is mixing it. A change lands at the next block.
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::common::atomic_float::AtomicF32;
use crate::common::engine_settings::{EngineSettings, PanLaw};
use crate::utils::clip_float;

use super::fader::Fader;
use super::peak_meter::{PeakMeter, PeakReading};

/// the controls of one strip as read once at the start of a block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripReading {
    pub muted: bool,
    pub soloed: bool,
    pub level: f32,
    pub pan: f32,
}

impl StripReading {
    /// audible under the solo state of the whole mix
    pub fn is_audible(&self, any_solo: bool) -> bool {
        !self.muted && (!any_solo || self.soloed)
    }
    /// (left, right) gains with level and pan applied
    pub fn gains(&self, law: PanLaw) -> (f32, f32) {
        let fader = Fader::at(law, self.pan);
        (self.level * fader.left(), self.level * fader.right())
    }
}

#[derive(Debug)]
pub struct ChannelStrip {
    mute: AtomicBool,
    solo: AtomicBool,
    level: AtomicF32,
    pan: AtomicF32,
    meter: PeakMeter,
}

impl ChannelStrip {
    pub fn new(settings: &EngineSettings) -> ChannelStrip {
        ChannelStrip {
            mute: AtomicBool::new(false),
            solo: AtomicBool::new(false),
            level: AtomicF32::new(1.0),
            pan: AtomicF32::new(0.0),
            meter: PeakMeter::new(settings.peak_hold_ms, settings.peak_release_ms, settings.sample_rate),
        }
    }
    pub fn set_mute(&self, v: bool) -> () {
        self.mute.store(v, Ordering::Release);
    }
    pub fn is_muted(&self) -> bool {
        self.mute.load(Ordering::Acquire)
    }
    pub fn set_solo(&self, v: bool) -> () {
        self.solo.store(v, Ordering::Release);
    }
    pub fn is_soloed(&self) -> bool {
        self.solo.load(Ordering::Acquire)
    }
    /// linear gain, negative or non-finite values are ignored
    pub fn set_level(&self, v: f32) -> bool {
        if !v.is_finite() || v < 0.0 {
            return false;
        }
        self.level.store(v);
        true
    }
    pub fn get_level(&self) -> f32 {
        self.level.load()
    }
    pub fn set_pan(&self, v: f32) -> () {
        self.pan.store(clip_float(v));
    }
    pub fn get_pan(&self) -> f32 {
        self.pan.load()
    }
    /// every control at once, so a block mixes with one consistent view
    pub fn reading(&self) -> StripReading {
        StripReading {
            muted: self.is_muted(),
            soloed: self.is_soloed(),
            level: self.get_level(),
            pan: self.get_pan(),
        }
    }
    pub fn meter(&self) -> &PeakMeter {
        &self.meter
    }
    pub fn peak(&self) -> PeakReading {
        self.meter.reading()
    }
    pub fn as_json(&self) -> serde_json::Value {
        let peak = self.peak();
        json!({
            "mute": self.is_muted(),
            "solo": self.is_soloed(),
            "level": self.get_level(),
            "pan": self.get_pan(),
            "peak": peak.instant,
            "peakDecayed": peak.decayed,
        })
    }
}
