//! f32 values shared between the control side and the audio callback
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug)]
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    pub fn new(v: f32) -> AtomicF32 {
        AtomicF32 {
            bits: AtomicU32::new(v.to_bits()),
        }
    }
    pub fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
    pub fn store(&self, v: f32) -> () {
        self.bits.store(v.to_bits(), Ordering::Release);
    }
}

/// two f32 values read and written as one unit
#[derive(Debug)]
pub struct AtomicF32Pair {
    bits: AtomicU64,
}

impl AtomicF32Pair {
    pub fn new(a: f32, b: f32) -> AtomicF32Pair {
        AtomicF32Pair {
            bits: AtomicU64::new(Self::pack(a, b)),
        }
    }
    fn pack(a: f32, b: f32) -> u64 {
        ((a.to_bits() as u64) << 32) | b.to_bits() as u64
    }
    pub fn load(&self) -> (f32, f32) {
        let v = self.bits.load(Ordering::Acquire);
        (f32::from_bits((v >> 32) as u32), f32::from_bits(v as u32))
    }
    pub fn store(&self, a: f32, b: f32) -> () {
        self.bits.store(Self::pack(a, b), Ordering::Release);
    }
}

#[cfg(test)]
mod test_atomic_float {
    use super::*;

    #[test]
    fn single() {
        let v = AtomicF32::new(0.25);
        assert_eq!(v.load(), 0.25);
        v.store(-3.5);
        assert_eq!(v.load(), -3.5);
    }

    #[test]
    fn pair_keeps_both_halves() {
        let p = AtomicF32Pair::new(1.0, 0.5);
        assert_eq!(p.load(), (1.0, 0.5));
        p.store(-0.0, f32::MAX);
        let (a, b) = p.load();
        assert_eq!(a.to_bits(), (-0.0f32).to_bits());
        assert_eq!(b, f32::MAX);
    }
}
