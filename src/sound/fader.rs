//! left/right pan gains for a track
//!
//! Both laws leave the center position at unity on each side, so a centered
//! track at level 1.0 passes through unchanged.

use std::fmt;

use crate::common::engine_settings::PanLaw;

#[derive(Debug, Clone, Copy)]
pub struct Fader {
    law: PanLaw,
    left: f32,
    right: f32,
    val: f32,
}

impl Fader {
    pub fn new(law: PanLaw) -> Fader {
        Fader::at(law, 0.0)
    }
    /// fader already positioned at `pan`
    pub fn at(law: PanLaw, pan: f32) -> Fader {
        let mut f = Fader {
            law: law,
            left: 1.0,
            right: 1.0,
            val: 0.0,
        };
        f.set(pan);
        f
    }
    /// call this with a value from -1.0 (hard pan left) to +1.0 (hard pan right)
    /// 0.0 means pan center.
    pub fn set(&mut self, v: f32) -> () {
        self.val = if v.is_finite() { f32::clamp(v, -1.0, 1.0) } else { 0.0 };
        match self.law {
            PanLaw::ConstantPower => {
                self.left = f32::sqrt(1.0 - self.val);
                self.right = f32::sqrt(1.0 + self.val);
            }
            PanLaw::Linear => {
                self.left = f32::min(1.0, 1.0 - self.val);
                self.right = f32::min(1.0, 1.0 + self.val);
            }
        }
    }

    pub fn get(&self) -> f32 {
        self.val
    }

    pub fn left(&self) -> f32 {
        self.left
    }

    pub fn right(&self) -> f32 {
        self.right
    }
}

impl fmt::Display for Fader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[ left: {}, right: {} ]", self.left, self.right)
    }
}
