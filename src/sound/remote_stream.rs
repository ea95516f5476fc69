//! decoded room audio, mixed alongside the local tracks
//!
//! Decoding happens off the audio thread. The decoder side writes interleaved
//! stereo into a lock-free ring through a [`StreamFeeder`]; the callback pulls
//! from the ring with a [`RingStreamDecoder`]. The node holds back output until
//! a prebuffer has accumulated and drops back into that filling state on an
//! underrun, emitting silence rather than waiting.
use dasp_sample::Sample;
use rtrb::{Consumer, Producer, RingBuffer};
use std::fmt;

use super::audio_node::{AudioNode, NodeKind};
use super::sample_buffer::SampleBuffer;

const STREAM_CHANNELS: usize = 2;

/// source of decoded frames read by the callback
pub trait StreamDecoder: Send {
    /// frames ready to be read without waiting
    fn available(&self) -> usize;
    /// write up to `out.frame_count()` frames at the start of `out`, returning how many
    fn read_frames(&mut self, out: &mut SampleBuffer) -> usize;
}

/// decoder end of a stream ring
pub struct RingStreamDecoder {
    consumer: Consumer<f32>,
}

/// writer end of a stream ring, owned by whatever decodes the room stream
pub struct StreamFeeder {
    producer: Producer<f32>,
}

/// a connected feeder and decoder holding up to `frames` stereo frames
pub fn stream_ring(frames: usize) -> (StreamFeeder, RingStreamDecoder) {
    let (producer, consumer) = RingBuffer::<f32>::new(frames.max(1) * STREAM_CHANNELS);
    (StreamFeeder { producer }, RingStreamDecoder { consumer })
}

impl StreamFeeder {
    /// stereo frames that fit right now
    pub fn free_frames(&self) -> usize {
        self.producer.slots() / STREAM_CHANNELS
    }
    /// the node side has gone away, usually because the stream was stopped
    pub fn is_closed(&self) -> bool {
        self.producer.is_abandoned()
    }
    /// push planar stereo; returns the frames accepted
    pub fn push_frames(&mut self, left: &[f32], right: &[f32]) -> usize {
        let frames = left.len().min(right.len()).min(self.free_frames());
        for i in 0..frames {
            let _ = self.producer.push(left[i]);
            let _ = self.producer.push(right[i]);
        }
        frames
    }
    /// push interleaved 16 bit stereo as produced by most decoders
    pub fn push_i16_interleaved(&mut self, data: &[i16]) -> usize {
        let frames = (data.len() / STREAM_CHANNELS).min(self.free_frames());
        for s in data[..frames * STREAM_CHANNELS].iter() {
            let _ = self.producer.push(s.to_sample::<f32>());
        }
        frames
    }
}

impl StreamDecoder for RingStreamDecoder {
    fn available(&self) -> usize {
        self.consumer.slots() / STREAM_CHANNELS
    }
    fn read_frames(&mut self, out: &mut SampleBuffer) -> usize {
        let frames = out.frame_count().min(self.available());
        let channels = out.channel_count();
        for i in 0..frames {
            let left = self.consumer.pop().unwrap_or(0.0);
            let right = self.consumer.pop().unwrap_or(0.0);
            if channels == 1 {
                out.channel_mut(0)[i] = 0.5 * (left + right);
            } else {
                out.channel_mut(0)[i] = left;
                out.channel_mut(1)[i] = right;
                for ch in STREAM_CHANNELS..channels {
                    out.channel_mut(ch)[i] = 0.0;
                }
            }
        }
        frames
    }
}

pub struct RemoteStreamNode {
    decoder: Option<Box<dyn StreamDecoder>>,
    prebuffer_frames: usize,
    filling: bool,
    underruns: u64,
}

impl fmt::Display for RemoteStreamNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ attached: {}, filling: {}, underruns: {} }}",
            self.decoder.is_some(),
            self.filling,
            self.underruns
        )
    }
}

impl RemoteStreamNode {
    pub fn new(prebuffer_frames: usize) -> RemoteStreamNode {
        RemoteStreamNode {
            decoder: None,
            prebuffer_frames: prebuffer_frames,
            filling: true,
            underruns: 0,
        }
    }
    /// install a new decoder and hand back the old one so it is dropped by the caller
    pub fn set_decoder(&mut self, decoder: Option<Box<dyn StreamDecoder>>) -> Option<Box<dyn StreamDecoder>> {
        self.filling = true;
        std::mem::replace(&mut self.decoder, decoder)
    }
    pub fn set_prebuffer_frames(&mut self, frames: usize) -> () {
        self.prebuffer_frames = frames;
    }
    pub fn get_underruns(&self) -> u64 {
        self.underruns
    }
    pub fn is_filling(&self) -> bool {
        self.filling
    }
}

impl AudioNode for RemoteStreamNode {
    fn kind(&self) -> NodeKind {
        NodeKind::RemoteStream
    }
    fn process(&mut self, _input: &SampleBuffer, output: &mut SampleBuffer) -> () {
        let decoder = match self.decoder.as_mut() {
            Some(d) => d,
            None => {
                output.zero();
                return;
            }
        };
        // check if we are filling
        if self.filling {
            if decoder.available() >= self.prebuffer_frames.max(output.frame_count()) {
                self.filling = false;
            } else {
                output.zero();
                return;
            }
        }
        let count = output.frame_count();
        let got = decoder.read_frames(output);
        if got < count {
            // onset of an underrun, pad with silence and fill again
            self.underruns += 1;
            self.filling = true;
            for ch in 0..output.channel_count() {
                output.channel_mut(ch)[got..].fill(0.0);
            }
        }
    }
}
