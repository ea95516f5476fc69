//! boundary to whatever hardware or host calls the engine for audio
use crate::common::box_error::BoxError;

use super::SoundCallback;

pub type BoxedCallback = Box<dyn SoundCallback>;

/// An audio device that drives a [`SoundCallback`] at its own fixed rate and block size
///
/// `start` hands the callback over to the driver's thread; `stop` returns
/// it once that thread will no longer call it.
pub trait AudioDriver: Send {
    fn sample_rate(&self) -> u32;
    fn frame_size(&self) -> usize;
    fn input_channels(&self) -> usize;
    fn output_channels(&self) -> usize;
    fn start(&mut self, callback: BoxedCallback) -> Result<(), BoxError>;
    fn stop(&mut self) -> Option<BoxedCallback>;
    fn is_running(&self) -> bool;
    /// reconfigure while stopped
    fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), BoxError>;
}
