//! the callback the engine hands to the audio driver
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::common::atomic_float::AtomicF32;
use crate::common::engine_settings::EngineSettings;
use crate::common::stream_time_stat::StreamTimeStat;

use super::mixer::{MixBus, Mixer};
use super::sample_buffer::SampleBuffer;
use super::SoundCallback;

/// counters the callback publishes for the control side
#[derive(Debug)]
pub struct ProcessStats {
    callbacks: AtomicU64,
    glitches: AtomicU64,
    overruns: AtomicU64,
    duration_mean_us: AtomicF32,
    duration_peak_us: AtomicF32,
}

impl ProcessStats {
    pub fn new() -> ProcessStats {
        ProcessStats {
            callbacks: AtomicU64::new(0),
            glitches: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            duration_mean_us: AtomicF32::new(0.0),
            duration_peak_us: AtomicF32::new(0.0),
        }
    }
    pub fn get_callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }
    /// blocks rendered as silence because the driver broke the block contract
    pub fn get_glitches(&self) -> u64 {
        self.glitches.load(Ordering::Relaxed)
    }
    /// blocks that took longer than the callback period
    pub fn get_overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
    pub fn get_duration_mean(&self) -> f32 {
        self.duration_mean_us.load()
    }
    pub fn get_duration_peak(&self) -> f32 {
        self.duration_peak_us.load()
    }
    pub fn as_json(&self) -> serde_json::Value {
        json!({
            "callbacks": self.get_callbacks(),
            "glitches": self.get_glitches(),
            "overruns": self.get_overruns(),
            "durationMeanUs": self.get_duration_mean(),
            "durationPeakUs": self.get_duration_peak(),
        })
    }
}

/// everything the callback and the control side both reach
pub struct EngineShared {
    pub bus: MixBus,
    pub stats: ProcessStats,
}

impl EngineShared {
    pub fn new(settings: &EngineSettings) -> EngineShared {
        EngineShared {
            bus: MixBus::new(settings),
            stats: ProcessStats::new(),
        }
    }
}

pub struct EngineProcessor {
    shared: Arc<EngineShared>,
    mixer: Mixer,
    channels: usize,
    max_frames: usize,
    period_us: f64,
    timing: StreamTimeStat,
}

impl EngineProcessor {
    /// buffers are sized for `channels` x `max_frames`; anything larger is a glitch
    pub fn new(shared: Arc<EngineShared>, sample_rate: u32, channels: usize, max_frames: usize) -> EngineProcessor {
        EngineProcessor {
            shared: shared,
            mixer: Mixer::build(channels, max_frames),
            channels: channels.max(1),
            max_frames: max_frames,
            period_us: max_frames as f64 * 1_000_000.0 / sample_rate.max(1) as f64,
            timing: StreamTimeStat::build(100).with_peak_decay(1.0),
        }
    }
    fn block_is_valid(&self, input: &SampleBuffer, output: &SampleBuffer) -> bool {
        output.frame_count() == input.frame_count()
            && output.frame_count() <= self.max_frames
            && output.channel_count() <= self.channels
    }
}

impl SoundCallback for EngineProcessor {
    fn process(&mut self, input: &SampleBuffer, output: &mut SampleBuffer) -> () {
        let start = Instant::now();
        let stats = &self.shared.stats;
        stats.callbacks.fetch_add(1, Ordering::Relaxed);
        if !self.block_is_valid(input, output) {
            output.zero();
            stats.glitches.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.mixer.mix(&self.shared.bus, input, output);

        let elapsed = start.elapsed().as_secs_f64() * 1_000_000.0;
        if elapsed > self.period_us {
            stats.overruns.fetch_add(1, Ordering::Relaxed);
        }
        self.timing.add_sample(elapsed);
        stats.duration_mean_us.store(self.timing.get_mean() as f32);
        stats.duration_peak_us.store(self.timing.get_peak() as f32);
    }
}

#[cfg(test)]
mod test_engine_processor {
    use super::*;
    use crate::sound::audio_node::{shared_node, AudioNode, NodeKind};

    struct ConstNode(f32);

    impl AudioNode for ConstNode {
        fn kind(&self) -> NodeKind {
            NodeKind::LocalInput
        }
        fn process(&mut self, _input: &SampleBuffer, output: &mut SampleBuffer) -> () {
            for ch in 0..output.channel_count() {
                output.channel_mut(ch).fill(self.0);
            }
        }
    }

    fn build() -> (Arc<EngineShared>, EngineProcessor) {
        let shared = Arc::new(EngineShared::new(&EngineSettings::default()));
        let proc = EngineProcessor::new(shared.clone(), 48_000, 2, 128);
        (shared, proc)
    }

    #[test]
    fn mixes_valid_blocks() {
        let (shared, mut proc) = build();
        shared.bus.tracks.add_track(1, shared_node(ConstNode(0.25)));
        let input = SampleBuffer::new(2, 128);
        let mut output = SampleBuffer::new(2, 128);
        proc.process(&input, &mut output);
        assert_eq!(output.channel(1)[5], 0.25);
        assert_eq!(shared.stats.get_callbacks(), 1);
        assert_eq!(shared.stats.get_glitches(), 0);
        assert!(shared.stats.get_duration_peak() >= 0.0);
    }

    #[test]
    fn bad_blocks_are_silent_glitches() {
        let (shared, mut proc) = build();
        shared.bus.tracks.add_track(1, shared_node(ConstNode(0.25)));
        let input = SampleBuffer::new(2, 64);
        let mut output = SampleBuffer::filled(2, 128, 1.0);
        proc.process(&input, &mut output);
        assert_eq!(output.peak(), 0.0);
        let input = SampleBuffer::new(2, 256);
        let mut output = SampleBuffer::new(2, 256);
        proc.process(&input, &mut output);
        assert_eq!(shared.stats.get_glitches(), 2);
        assert_eq!(shared.stats.as_json()["callbacks"], 2);
    }

    #[test]
    fn too_many_output_channels_is_a_glitch() {
        let (shared, mut proc) = build();
        shared.bus.tracks.add_track(1, shared_node(ConstNode(0.25)));
        let input = SampleBuffer::new(2, 128);
        let mut output = SampleBuffer::filled(3, 128, 1.0);
        proc.process(&input, &mut output);
        assert_eq!(output.peak(), 0.0);
        assert_eq!(shared.stats.get_glitches(), 1);
    }
}
