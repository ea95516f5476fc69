//! block peak metering with hold and exponential release
//!
//! The audio callback is the only writer. Any thread may read; the instant and
//! decayed values are published together so a reader never sees a torn pair.
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::common::atomic_float::{AtomicF32, AtomicF32Pair};
use crate::utils::get_coef;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct PeakReading {
    /// max absolute sample of the most recent block
    pub instant: f32,
    /// held and released value for display
    pub decayed: f32,
}

impl fmt::Display for PeakReading {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{ instant: {:.4}, decayed: {:.4} }}", self.instant, self.decayed)
    }
}

#[derive(Debug)]
pub struct PeakMeter {
    reading: AtomicF32Pair,
    hold_ms: f64,
    release_ms: f64,
    sample_rate: AtomicU32,
    hold_left: AtomicU32,
    release_coef: AtomicF32,
}

impl PeakMeter {
    pub fn new(hold_ms: f64, release_ms: f64, sample_rate: u32) -> PeakMeter {
        let meter = PeakMeter {
            reading: AtomicF32Pair::new(0.0, 0.0),
            hold_ms: hold_ms.max(0.0),
            release_ms: release_ms.max(0.0),
            sample_rate: AtomicU32::new(sample_rate),
            hold_left: AtomicU32::new(0),
            release_coef: AtomicF32::new(0.0),
        };
        meter.set_sample_rate(sample_rate);
        meter
    }

    /// per-sample release coefficient is derived from the rate
    pub fn set_sample_rate(&self, sample_rate: u32) -> () {
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
        let coef = get_coef(self.release_ms / 1000.0, sample_rate as f64);
        self.release_coef.store(coef as f32);
    }

    pub fn reading(&self) -> PeakReading {
        let (instant, decayed) = self.reading.load();
        PeakReading { instant, decayed }
    }

    pub fn reset(&self) -> () {
        self.hold_left.store(0, Ordering::Relaxed);
        self.reading.store(0.0, 0.0);
    }

    /// feed the peak of a just-processed block of `frames` samples
    pub fn update(&self, block_peak: f32, frames: usize) -> () {
        let block_peak = if block_peak.is_finite() { block_peak.abs() } else { 0.0 };
        let (_, decayed) = self.reading.load();
        let frames = frames as u32;
        let next = if block_peak >= decayed {
            let rate = self.sample_rate.load(Ordering::Relaxed) as f64;
            let hold = (self.hold_ms * rate / 1000.0) as u32;
            self.hold_left.store(hold, Ordering::Relaxed);
            block_peak
        } else {
            let hold_left = self.hold_left.load(Ordering::Relaxed);
            if hold_left > 0 {
                self.hold_left.store(hold_left.saturating_sub(frames), Ordering::Relaxed);
                decayed
            } else {
                let coef = self.release_coef.load();
                let released = decayed * coef.powi(frames as i32);
                // never drop below what this block actually reached
                released.max(block_peak)
            }
        };
        self.reading.store(block_peak, next);
    }
}
