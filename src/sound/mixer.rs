//!
//! mixer used to combine the local tracks and the room stream into the output
//!
//! [`MixBus`] is the state shared with the control side. [`Mixer`] is the
//! audio-thread half that owns the scratch buffer each track renders into.
use parking_lot::Mutex;
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::common::atomic_float::AtomicF32;
use crate::common::engine_settings::{EngineSettings, PanLaw};

use super::audio_node::AudioNode;
use super::channel_strip::StripReading;
use super::peak_meter::{PeakMeter, PeakReading};
use super::remote_stream::RemoteStreamNode;
use super::sample_buffer::SampleBuffer;
use super::track_registry::{TrackRegistry, TrackSnapshot, MAX_TRACKS};

/// the single room stream node and its playback state
pub struct RoomChannel {
    node: Mutex<RemoteStreamNode>,
    active: AtomicBool,
    meter: PeakMeter,
    prebuffer_ms: u32,
}

impl RoomChannel {
    pub fn new(settings: &EngineSettings) -> RoomChannel {
        let prebuffer = EngineSettings::frames_for_ms(settings.room_prebuffer_ms, settings.sample_rate);
        RoomChannel {
            node: Mutex::new(RemoteStreamNode::new(prebuffer)),
            active: AtomicBool::new(false),
            meter: PeakMeter::new(settings.peak_hold_ms, settings.peak_release_ms, settings.sample_rate),
            prebuffer_ms: settings.room_prebuffer_ms,
        }
    }
    pub fn set_sample_rate(&self, sample_rate: u32) -> () {
        self.meter.set_sample_rate(sample_rate);
        let frames = EngineSettings::frames_for_ms(self.prebuffer_ms, sample_rate);
        self.node.lock().set_prebuffer_frames(frames);
    }
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
    pub fn set_active(&self, v: bool) -> () {
        self.active.store(v, Ordering::Release);
    }
    /// control-side access to the node; the callback skips the room while held
    pub fn node(&self) -> parking_lot::MutexGuard<'_, RemoteStreamNode> {
        self.node.lock()
    }
    pub fn peak(&self) -> PeakReading {
        self.meter.reading()
    }
    pub fn meter(&self) -> &PeakMeter {
        &self.meter
    }
}

pub struct MixBus {
    pub tracks: TrackRegistry,
    pub room: RoomChannel,
    master_vol: AtomicF32,
    master_meter: PeakMeter,
    pan_law: PanLaw,
}

impl MixBus {
    pub fn new(settings: &EngineSettings) -> MixBus {
        MixBus {
            tracks: TrackRegistry::new(settings),
            room: RoomChannel::new(settings),
            master_vol: AtomicF32::new(1.0),
            master_meter: PeakMeter::new(settings.peak_hold_ms, settings.peak_release_ms, settings.sample_rate),
            pan_law: settings.pan_law,
        }
    }
    pub fn get_master(&self) -> f32 {
        self.master_vol.load()
    }
    pub fn set_master(&self, v: f32) -> () {
        if v.is_finite() && v >= 0.0 {
            self.master_vol.store(v);
        }
    }
    pub fn get_master_peak(&self) -> PeakReading {
        self.master_meter.reading()
    }
    pub fn pan_law(&self) -> PanLaw {
        self.pan_law
    }
    pub fn set_sample_rate(&self, sample_rate: u32) -> () {
        self.tracks.set_sample_rate(sample_rate);
        self.room.set_sample_rate(sample_rate);
        self.master_meter.set_sample_rate(sample_rate);
    }
}

impl fmt::Display for MixBus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ tracks: {}, room_active: {}, master: {} }}",
            self.tracks.track_ids().len(),
            self.room.is_active(),
            self.master_meter.reading()
        )
    }
}

pub struct Mixer {
    track_buf: SampleBuffer,
    readings: Vec<StripReading>,
}

impl Mixer {
    pub fn build(channels: usize, max_frames: usize) -> Mixer {
        Mixer {
            track_buf: SampleBuffer::new(channels, max_frames),
            readings: Vec::with_capacity(MAX_TRACKS),
        }
    }

    /// render one block of the whole mix into `out`
    pub fn mix(&mut self, bus: &MixBus, input: &SampleBuffer, out: &mut SampleBuffer) -> () {
        let snapshot = bus.tracks.snapshot();
        self.mix_snapshot(bus, &snapshot, input, out);
    }

    /// render with an explicit track snapshot
    pub fn mix_snapshot(&mut self, bus: &MixBus, snapshot: &TrackSnapshot, input: &SampleBuffer, out: &mut SampleBuffer) -> () {
        out.zero();
        let frames = out.frame_count();
        let channels = out.channel_count();
        if !self.track_buf.reshape(channels, frames) {
            // larger than the buffers were built for; stay silent
            return;
        }
        // controls are read once per block, a change made during it lands on the next
        self.readings.clear();
        for t in snapshot.tracks().iter().take(self.readings.capacity()) {
            self.readings.push(t.strip.reading());
        }
        let any_solo = self.readings.iter().any(|r| r.soloed);
        for (t, reading) in snapshot.tracks().iter().zip(self.readings.iter()) {
            let rendered = match t.node.try_lock() {
                Some(mut node) => {
                    node.process(input, &mut self.track_buf);
                    self.track_buf.sanitize();
                    true
                }
                None => false,
            };
            if !rendered {
                t.strip.meter().update(0.0, frames);
                continue;
            }
            t.strip.meter().update(self.track_buf.peak() * reading.level, frames);
            if !reading.is_audible(any_solo) {
                continue;
            }
            Self::accumulate(out, &self.track_buf, reading.gains(bus.pan_law), reading.level);
        }
        self.mix_room(bus, input, out);
        let master = bus.get_master();
        if master != 1.0 {
            out.apply_gain(master);
        }
        bus.master_meter.update(out.peak(), frames);
    }

    fn mix_room(&mut self, bus: &MixBus, input: &SampleBuffer, out: &mut SampleBuffer) -> () {
        let frames = out.frame_count();
        if !bus.room.is_active() {
            bus.room.meter.update(0.0, frames);
            return;
        }
        match bus.room.node.try_lock() {
            Some(mut node) => {
                node.process(input, &mut self.track_buf);
                self.track_buf.sanitize();
                bus.room.meter.update(self.track_buf.peak(), frames);
                Self::accumulate(out, &self.track_buf, (1.0, 1.0), 1.0);
            }
            None => bus.room.meter.update(0.0, frames),
        }
    }

    // left/right gains go to the first two channels, any further channel gets the level alone
    fn accumulate(out: &mut SampleBuffer, src: &SampleBuffer, gains: (f32, f32), level: f32) -> () {
        let channels = out.channel_count();
        if channels == 1 {
            out.add_scaled(0, src, 0, level);
            return;
        }
        out.add_scaled(0, src, 0, gains.0);
        out.add_scaled(1, src, 1, gains.1);
        for ch in 2..channels {
            out.add_scaled(ch, src, ch, level);
        }
    }

    pub fn as_json(bus: &MixBus) -> serde_json::Value {
        let master = bus.get_master_peak();
        let room = bus.room.peak();
        json!({
            "masterVol": bus.get_master(),
            "masterPeak": master.instant,
            "masterPeakDecayed": master.decayed,
            "roomActive": bus.room.is_active(),
            "roomPeak": room.instant,
            "roomPeakDecayed": room.decayed,
            "tracks": bus.tracks.as_json(),
        })
    }
}
