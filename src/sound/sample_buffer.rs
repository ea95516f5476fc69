//! block of planar f32 audio, the unit of data that flows through the engine
//!
//! A buffer is allocated once with a channel and frame capacity. Inside the
//! audio callback it is only ever reshaped within that capacity, so it never
//! touches the allocator there.
use simple_error::bail;
use std::fmt;

use crate::common::box_error::BoxError;

#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    data: Vec<Vec<f32>>,
    channels: usize,
    frames: usize,
}

impl SampleBuffer {
    /// silent buffer of `channels` x `frames`; the shape is also the capacity
    pub fn new(channels: usize, frames: usize) -> SampleBuffer {
        let channels = channels.max(1);
        SampleBuffer {
            data: vec![vec![0.0; frames]; channels],
            channels: channels,
            frames: frames,
        }
    }

    /// buffer from planar data; every channel must have the same length
    pub fn from_channels(data: Vec<Vec<f32>>) -> Result<SampleBuffer, BoxError> {
        if data.is_empty() {
            bail!("a sample buffer needs at least one channel");
        }
        let frames = data[0].len();
        if data.iter().any(|c| c.len() != frames) {
            bail!("all channels of a sample buffer must have {} frames", frames);
        }
        Ok(SampleBuffer {
            channels: data.len(),
            frames: frames,
            data: data,
        })
    }

    /// every sample of every channel set to `value`
    pub fn filled(channels: usize, frames: usize, value: f32) -> SampleBuffer {
        let mut buf = SampleBuffer::new(channels, frames);
        for chan in buf.data.iter_mut() {
            chan.fill(value);
        }
        buf
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }
    pub fn frame_count(&self) -> usize {
        self.frames
    }
    pub fn channel_capacity(&self) -> usize {
        self.data.len()
    }
    pub fn frame_capacity(&self) -> usize {
        self.data[0].len()
    }

    /// change the active shape without allocating; false if it exceeds capacity
    pub fn reshape(&mut self, channels: usize, frames: usize) -> bool {
        if channels == 0 || channels > self.channel_capacity() || frames > self.frame_capacity() {
            return false;
        }
        self.channels = channels;
        self.frames = frames;
        true
    }

    /// grow the capacity; only for use outside the audio callback
    pub fn ensure_capacity(&mut self, channels: usize, frames: usize) -> () {
        let frames = frames.max(self.frame_capacity());
        for chan in self.data.iter_mut() {
            chan.resize(frames, 0.0);
        }
        while self.data.len() < channels {
            self.data.push(vec![0.0; frames]);
        }
    }

    pub fn same_shape(&self, other: &SampleBuffer) -> bool {
        self.channels == other.channels && self.frames == other.frames
    }

    pub fn channel(&self, idx: usize) -> &[f32] {
        &self.data[idx][..self.frames]
    }
    pub fn channel_mut(&mut self, idx: usize) -> &mut [f32] {
        let frames = self.frames;
        &mut self.data[idx][..frames]
    }

    pub fn zero(&mut self) -> () {
        let frames = self.frames;
        for chan in self.data.iter_mut().take(self.channels) {
            chan[..frames].fill(0.0);
        }
    }

    /// copy `src` into self; shapes must match
    pub fn copy_from(&mut self, src: &SampleBuffer) -> () {
        debug_assert!(self.same_shape(src));
        let frames = self.frames.min(src.frames);
        for ch in 0..self.channels.min(src.channels) {
            self.data[ch][..frames].copy_from_slice(&src.data[ch][..frames]);
        }
    }

    /// add `src` channel `from` into channel `to` scaled by `gain`
    pub fn add_scaled(&mut self, to: usize, src: &SampleBuffer, from: usize, gain: f32) -> () {
        if to >= self.channels || from >= src.channels {
            return;
        }
        let frames = self.frames.min(src.frames);
        let dst = &mut self.data[to][..frames];
        for (d, s) in dst.iter_mut().zip(src.data[from][..frames].iter()) {
            *d += *s * gain;
        }
    }

    pub fn apply_gain(&mut self, gain: f32) -> () {
        let frames = self.frames;
        for chan in self.data.iter_mut().take(self.channels) {
            for s in chan[..frames].iter_mut() {
                *s *= gain;
            }
        }
    }

    /// largest absolute sample value in the active region
    pub fn peak(&self) -> f32 {
        let mut peak: f32 = 0.0;
        for chan in self.data.iter().take(self.channels) {
            for s in chan[..self.frames].iter() {
                let a = s.abs();
                if a > peak {
                    peak = a;
                }
            }
        }
        peak
    }

    /// replace NaN and infinite samples with silence; returns how many were fixed
    pub fn sanitize(&mut self) -> usize {
        let frames = self.frames;
        let mut fixed: usize = 0;
        for chan in self.data.iter_mut().take(self.channels) {
            for s in chan[..frames].iter_mut() {
                if !s.is_finite() {
                    *s = 0.0;
                    fixed += 1;
                }
            }
        }
        fixed
    }
}

impl fmt::Display for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{ channels: {}, frames: {}, peak: {:.3} }}", self.channels, self.frames, self.peak())
    }
}
