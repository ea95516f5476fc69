//! live capture source for one local input track
//!
//! The node runs on the audio thread. Everything the control side may change
//! while it runs lives in an [`InputBinding`] of atomics shared with the
//! track's control handle, so a routing change is picked up at the start of
//! the next block and never halfway through one.
use log::debug;
use rtrb::{Consumer, Producer, RingBuffer};
use serde::Serialize;
use std::fmt;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use wmidi::MidiMessage;

use crate::plugins::plugin_chain::PluginChain;

use super::audio_node::{AudioNode, NodeKind};
use super::sample_buffer::SampleBuffer;

/// which driver inputs feed a local track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InputRouting {
    NoInput,
    Mono(usize),
    /// `first` and `first + 1`
    Stereo(usize),
    /// MIDI device index, audio comes from the plugin chain
    Midi(usize),
}

const TAG_SHIFT: u32 = 32;
/// largest channel or device index a routing can carry
pub const MAX_ROUTING_INDEX: usize = u32::MAX as usize;

impl InputRouting {
    fn pack(self) -> u64 {
        let (tag, v): (u64, usize) = match self {
            InputRouting::NoInput => (0, 0),
            InputRouting::Mono(c) => (1, c),
            InputRouting::Stereo(c) => (2, c),
            InputRouting::Midi(d) => (3, d),
        };
        if v > MAX_ROUTING_INDEX {
            // never alias another channel or device, read back as no input
            return 0;
        }
        (tag << TAG_SHIFT) | v as u64
    }
    fn unpack(bits: u64) -> InputRouting {
        let v = (bits & 0xFFFF_FFFF) as usize;
        match bits >> TAG_SHIFT {
            1 => InputRouting::Mono(v),
            2 => InputRouting::Stereo(v),
            3 => InputRouting::Midi(v),
            _ => InputRouting::NoInput,
        }
    }
    /// fit the routing to a driver with `available` inputs
    ///
    /// Stereo that no longer fits collapses to mono on its first channel, and
    /// a mono channel or MIDI device out of range becomes no input.
    pub fn fit_to(self, available: usize) -> InputRouting {
        let available = available.min(MAX_ROUTING_INDEX.saturating_add(1));
        match self {
            InputRouting::Stereo(first) if first < available && first + 1 < available => self,
            InputRouting::Stereo(first) if first < available => InputRouting::Mono(first),
            InputRouting::Stereo(_) => InputRouting::NoInput,
            InputRouting::Mono(c) if c >= available => InputRouting::NoInput,
            InputRouting::Midi(d) if d > MAX_ROUTING_INDEX => InputRouting::NoInput,
            other => other,
        }
    }
}

impl fmt::Display for InputRouting {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InputRouting::NoInput => write!(f, "no input"),
            InputRouting::Mono(c) => write!(f, "mono {}", c),
            InputRouting::Stereo(c) => write!(f, "stereo {}-{}", c, c + 1),
            InputRouting::Midi(d) => write!(f, "midi device {}", d),
        }
    }
}

/// control state shared between an input node and its control handle
#[derive(Debug)]
pub struct InputBinding {
    routing: AtomicU64,
    room_muted: AtomicBool,
    capture_drops: AtomicU64,
}

impl InputBinding {
    pub fn new(routing: InputRouting) -> InputBinding {
        InputBinding {
            routing: AtomicU64::new(routing.pack()),
            room_muted: AtomicBool::new(false),
            capture_drops: AtomicU64::new(0),
        }
    }
    pub fn routing(&self) -> InputRouting {
        InputRouting::unpack(self.routing.load(Ordering::Acquire))
    }
    /// returns the routing that was replaced
    pub fn set_routing(&self, routing: InputRouting) -> InputRouting {
        InputRouting::unpack(self.routing.swap(routing.pack(), Ordering::AcqRel))
    }
    pub fn set_room_muted(&self, v: bool) -> () {
        self.room_muted.store(v, Ordering::Release);
    }
    pub fn is_room_muted(&self) -> bool {
        self.room_muted.load(Ordering::Acquire)
    }
    /// capture samples lost because the reader fell behind
    pub fn capture_drops(&self) -> u64 {
        self.capture_drops.load(Ordering::Relaxed)
    }
}

/// one raw MIDI message tagged with the device it came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiPacket {
    pub device: usize,
    bytes: [u8; 3],
    len: u8,
}

impl MidiPacket {
    /// None for an empty message or one longer than a channel message
    pub fn new(device: usize, data: &[u8]) -> Option<MidiPacket> {
        if data.is_empty() || data.len() > 3 {
            return None;
        }
        let mut bytes = [0u8; 3];
        bytes[..data.len()].copy_from_slice(data);
        Some(MidiPacket {
            device: device,
            bytes: bytes,
            len: data.len() as u8,
        })
    }
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// reader for the post-chain audio of an input track, interleaved by channel
pub struct CaptureReader {
    consumer: Consumer<f32>,
    channels: usize,
}

impl CaptureReader {
    pub fn channels(&self) -> usize {
        self.channels
    }
    pub fn available_frames(&self) -> usize {
        self.consumer.slots() / self.channels
    }
    /// drain up to `max_frames` frames as planar channels
    pub fn read(&mut self, max_frames: usize) -> Vec<Vec<f32>> {
        let frames = self.available_frames().min(max_frames);
        let mut out = vec![Vec::with_capacity(frames); self.channels];
        for _ in 0..frames {
            for chan in out.iter_mut() {
                chan.push(self.consumer.pop().unwrap_or(0.0));
            }
        }
        out
    }
}

/// a capture ring sized for `frames` frames of `channels` channels
pub fn capture_ring(channels: usize, frames: usize) -> (Producer<f32>, CaptureReader) {
    let channels = channels.max(1);
    let (producer, consumer) = RingBuffer::<f32>::new(channels * frames.max(1));
    (producer, CaptureReader { consumer, channels })
}

pub struct LocalInputNode {
    binding: Arc<InputBinding>,
    chain: PluginChain,
    scratch: SampleBuffer,
    midi: Option<Consumer<MidiPacket>>,
    capture: Option<Producer<f32>>,
}

impl LocalInputNode {
    /// `channels` and `max_frames` size the internal buffers; the node never
    /// grows them while running
    pub fn new(binding: Arc<InputBinding>, chain: PluginChain, channels: usize, max_frames: usize) -> LocalInputNode {
        LocalInputNode {
            binding: binding,
            chain: chain,
            scratch: SampleBuffer::new(channels, max_frames),
            midi: None,
            capture: None,
        }
    }
    pub fn with_midi(mut self, consumer: Consumer<MidiPacket>) -> LocalInputNode {
        self.midi = Some(consumer);
        self
    }
    pub fn with_capture(mut self, producer: Producer<f32>) -> LocalInputNode {
        self.capture = Some(producer);
        self
    }
    pub fn binding(&self) -> &Arc<InputBinding> {
        &self.binding
    }

    fn read_input(routing: InputRouting, input: &SampleBuffer, output: &mut SampleBuffer) -> () {
        let available = input.channel_count();
        let frames = output.frame_count().min(input.frame_count());
        output.zero();
        match routing {
            InputRouting::Mono(c) if c < available => {
                for ch in 0..output.channel_count() {
                    output.channel_mut(ch)[..frames].copy_from_slice(&input.channel(c)[..frames]);
                }
            }
            InputRouting::Stereo(first) if first + 1 < available => {
                if output.channel_count() == 1 {
                    output.add_scaled(0, input, first, 0.5);
                    output.add_scaled(0, input, first + 1, 0.5);
                } else {
                    output.channel_mut(0)[..frames].copy_from_slice(&input.channel(first)[..frames]);
                    output.channel_mut(1)[..frames].copy_from_slice(&input.channel(first + 1)[..frames]);
                }
            }
            // out of range routing and MIDI start from silence
            _ => (),
        }
    }

    fn drain_midi(&mut self, routing: InputRouting) -> () {
        let consumer = match self.midi.as_mut() {
            Some(c) => c,
            None => return,
        };
        while let Ok(packet) = consumer.pop() {
            if let InputRouting::Midi(device) = routing {
                if packet.device == device {
                    if let Ok(msg) = MidiMessage::try_from(packet.bytes()) {
                        self.chain.handle_midi(&msg);
                    }
                }
            }
        }
    }

    fn feed_capture(&mut self, output: &SampleBuffer) -> () {
        let producer = match self.capture.as_mut() {
            Some(p) => p,
            None => return,
        };
        let muted = self.binding.is_room_muted();
        let channels = output.channel_count();
        let wanted = output.frame_count() * channels;
        if producer.slots() < wanted {
            self.binding.capture_drops.fetch_add(wanted as u64, Ordering::Relaxed);
            return;
        }
        for i in 0..output.frame_count() {
            for ch in 0..channels {
                let v = if muted { 0.0 } else { output.channel(ch)[i] };
                let _ = producer.push(v);
            }
        }
    }
}

impl AudioNode for LocalInputNode {
    fn kind(&self) -> NodeKind {
        NodeKind::LocalInput
    }
    fn process(&mut self, input: &SampleBuffer, output: &mut SampleBuffer) -> () {
        let routing = self.binding.routing();
        Self::read_input(routing, input, output);
        self.drain_midi(routing);
        self.chain.process(output, &mut self.scratch);
        self.feed_capture(output);
    }
    fn prepare(&mut self, sample_rate: u32, channels: usize, max_frames: usize) -> () {
        debug!("input node prepared for {} Hz, {} x {}", sample_rate, channels, max_frames);
        self.scratch.ensure_capacity(channels, max_frames);
        self.chain.set_sample_rate(sample_rate);
    }
}
