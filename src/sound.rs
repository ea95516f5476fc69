//! components used to make the jam engine: nodes, the mixer, the relay and the controller

use sample_buffer::SampleBuffer;

/// the entry point an [`driver::AudioDriver`] calls once per block
pub trait SoundCallback: Send {
    fn process(&mut self, input: &SampleBuffer, output: &mut SampleBuffer) -> ();
}

pub mod audio_node;
pub mod channel_strip;
pub mod clock_driver;
pub mod driver;
pub mod engine_processor;
pub mod fader;
pub mod jam_engine;
pub mod local_input;
pub mod mixer;
pub mod notifications;
pub mod param_message;
pub mod peak_meter;
pub mod remote_stream;
pub mod sample_buffer;
pub mod session_relay;
pub mod track_registry;
