//! rtjam_engine - real time audio engine for live jam sessions
//!
//! provides the pieces to mix local input tracks and a remote room stream on a
//! hard real-time audio callback, run effect and instrument plugins on each
//! input, and relay locally encoded audio to a network session.
//!
//! The [`JamEngine`] is the controller a UI owns. It hands an
//! [`sound::engine_processor::EngineProcessor`] to an
//! [`sound::driver::AudioDriver`] and publishes every change to it without
//! ever blocking the callback.
extern crate json;
#[macro_use]
extern crate num_derive;

pub mod common;
pub mod dsp;
pub mod plugins;
pub mod sound;
pub mod utils;

pub use crate::sound::jam_engine::JamEngine;
pub use crate::sound::param_message::{JamParam, ParamMessage};
pub use crate::sound::sample_buffer::SampleBuffer;
