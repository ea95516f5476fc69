//! the processing unit behind every track and the room stream
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::sample_buffer::SampleBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    LocalInput,
    RemoteStream,
    NoInput,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            NodeKind::LocalInput => "local_input",
            NodeKind::RemoteStream => "remote_stream",
            NodeKind::NoInput => "no_input",
        };
        write!(f, "{}", name)
    }
}

/// Produces one block of audio per callback
///
/// `process` reads the driver's `input` block and writes exactly
/// `output.frame_count()` frames into every channel of `output`. It runs on the
/// audio thread, so it must not allocate, block, or panic on bad data; missing
/// data is written as silence.
pub trait AudioNode: Send {
    fn kind(&self) -> NodeKind;
    fn process(&mut self, input: &SampleBuffer, output: &mut SampleBuffer) -> ();
    /// driver format changed; called from a control thread while audio is stopped,
    /// so this is where buffers may be resized
    fn prepare(&mut self, _sample_rate: u32, _channels: usize, _max_frames: usize) -> () {}
}

/// a node shared between the track map and the callback
///
/// The callback only ever `try_lock`s it and emits silence when it is busy.
pub type SharedNode = Arc<Mutex<Box<dyn AudioNode>>>;

pub fn shared_node<N: AudioNode + 'static>(node: N) -> SharedNode {
    Arc::new(Mutex::new(Box::new(node)))
}

/// source for an input slot with nothing selected
pub struct NoInputNode {}

impl NoInputNode {
    pub fn new() -> NoInputNode {
        NoInputNode {}
    }
}

impl AudioNode for NoInputNode {
    fn kind(&self) -> NodeKind {
        NodeKind::NoInput
    }
    fn process(&mut self, _input: &SampleBuffer, output: &mut SampleBuffer) -> () {
        output.zero();
    }
}
