//! running statistics over a stream of timing samples
//!
//! The engine feeds it the wall-clock duration of each audio callback so the
//! control side can report how close the callback runs to its deadline.

use std::f64;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamTimeStat {
    peak: f64,
    mean: f64,
    sigma: f64,
    window: u64,
    peak_decay: f64,
}

impl StreamTimeStat {
    pub fn build(window_size: u64) -> StreamTimeStat {
        StreamTimeStat {
            peak: 0.0,
            mean: 0.0,
            sigma: 0.0,
            window: window_size.max(1),
            peak_decay: 0.05,
        }
    }
    /// amount the peak falls back per sample when the sample is below it
    pub fn with_peak_decay(mut self, decay: f64) -> StreamTimeStat {
        self.peak_decay = decay.max(0.0);
        self
    }
    pub fn clear(&mut self) -> () {
        self.peak = 0.0;
        self.mean = 0.0;
        self.sigma = 0.0;
    }
    pub fn get_peak(&self) -> f64 {
        self.peak
    }
    pub fn get_mean(&self) -> f64 {
        self.mean
    }

    pub fn add_sample(&mut self, sample: f64) -> () {
        if sample > self.peak {
            self.peak = sample;
        } else {
            self.peak = (self.peak - self.peak_decay).max(sample);
        }
        let scale: f64 = (self.window as f64 - 1.0) / self.window as f64;
        self.mean = scale * (self.mean + sample / self.window as f64);
        self.sigma = scale * (self.sigma + (self.mean - sample).abs() / self.window as f64);
    }
}

impl fmt::Display for StreamTimeStat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ peak: {}, mean: {}, sigma: {} window: {} }}",
            self.peak, self.mean, self.sigma, self.window
        )
    }
}
