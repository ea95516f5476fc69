//! table-free oscillator used for modulation and simple synthesis
use num::{Float, FromPrimitive, Zero};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaveShape {
    Sine,
    Square,
    Ramp,
}

pub struct LowFreqOsc<T> {
    shape: WaveShape,
    amp: T,
    phase_inc: T,
    phase: T,
    pi: T,
    two_pi: T,
}

impl<T: Float + FromPrimitive> LowFreqOsc<T> {
    pub fn new() -> LowFreqOsc<T> {
        LowFreqOsc {
            shape: WaveShape::Sine,
            amp: T::one(),
            phase_inc: T::from_f64(0.01).unwrap_or_else(T::zero),
            phase: Zero::zero(),
            pi: T::from_f64(std::f64::consts::PI).unwrap_or_else(T::zero),
            two_pi: T::from_f64(std::f64::consts::PI * 2.0).unwrap_or_else(T::zero),
        }
    }
    pub fn init(&mut self, shape: WaveShape, freq: T, amp: T, sample_rate: T) -> () {
        self.shape = shape;
        self.set_frequency(freq, sample_rate);
        self.amp = amp;
    }
    /// retune without touching the phase, so a running tone does not click
    pub fn set_frequency(&mut self, freq: T, sample_rate: T) -> () {
        if sample_rate > T::zero() {
            self.phase_inc = self.two_pi * freq / sample_rate;
        }
    }
    pub fn reset(&mut self) -> () {
        self.phase = Zero::zero();
    }
    pub fn get_sample(&mut self) -> T {
        let val = match self.shape {
            WaveShape::Sine => self.amp * T::sin(self.phase),
            WaveShape::Square => {
                if self.phase < self.pi {
                    self.amp
                } else {
                    -self.amp
                }
            }
            WaveShape::Ramp => self.amp * self.phase / self.two_pi,
        };
        self.phase = self.phase + self.phase_inc;
        if self.phase >= self.two_pi {
            self.phase = self.phase - self.two_pi;
        }
        val
    }
}
