//! an [`AudioDriver`] with no hardware behind it
//!
//! A max priority thread calls the callback once per block, either paced to
//! real time (`frame_size / sample_rate`) or as fast as it can. Input comes
//! from an optional generator and output can be copied into a ring for
//! inspection. Used by the demo and by the engine tests.
use log::{debug, info, warn};
use rtrb::{Consumer, Producer, RingBuffer};
use simple_error::bail;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thread_priority::{ThreadBuilder, ThreadPriority};

use crate::common::box_error::BoxError;

use super::driver::{AudioDriver, BoxedCallback};
use super::sample_buffer::SampleBuffer;

/// fills the input block before each callback
pub type InputGenerator = Box<dyn FnMut(&mut SampleBuffer) + Send>;

type ThreadParts = (BoxedCallback, Option<InputGenerator>, Option<Producer<f32>>);

pub struct ClockDriver {
    sample_rate: u32,
    frame_size: usize,
    input_channels: usize,
    output_channels: usize,
    paced: bool,
    generator: Option<InputGenerator>,
    sink: Option<Producer<f32>>,
    running: Arc<AtomicBool>,
    blocks: Arc<AtomicU64>,
    handle: Option<JoinHandle<ThreadParts>>,
}

impl ClockDriver {
    pub fn new(sample_rate: u32, frame_size: usize, input_channels: usize, output_channels: usize) -> ClockDriver {
        ClockDriver {
            sample_rate: sample_rate,
            frame_size: frame_size.max(1),
            input_channels: input_channels.max(1),
            output_channels: output_channels.max(1),
            paced: true,
            generator: None,
            sink: None,
            running: Arc::new(AtomicBool::new(false)),
            blocks: Arc::new(AtomicU64::new(0)),
            handle: None,
        }
    }
    /// call back without waiting between blocks
    pub fn free_running(mut self) -> ClockDriver {
        self.paced = false;
        self
    }
    pub fn with_generator(mut self, generator: InputGenerator) -> ClockDriver {
        self.generator = Some(generator);
        self
    }
    /// interleaved copy of every output block, `blocks` blocks deep
    pub fn with_output_sink(mut self, blocks: usize) -> (ClockDriver, Consumer<f32>) {
        let (producer, consumer) = RingBuffer::<f32>::new(blocks.max(1) * self.frame_size * self.output_channels);
        self.sink = Some(producer);
        (self, consumer)
    }
    pub fn blocks_processed(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }
    /// block until at least `count` blocks ran or `timeout` passed
    pub fn wait_for_blocks(&self, count: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.blocks_processed() < count {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_micros(200));
        }
        true
    }
    fn period(&self) -> Duration {
        Duration::from_secs_f64(self.frame_size as f64 / self.sample_rate as f64)
    }
}

impl AudioDriver for ClockDriver {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    fn frame_size(&self) -> usize {
        self.frame_size
    }
    fn input_channels(&self) -> usize {
        self.input_channels
    }
    fn output_channels(&self) -> usize {
        self.output_channels
    }
    fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    fn start(&mut self, mut callback: BoxedCallback) -> Result<(), BoxError> {
        if self.handle.is_some() {
            bail!("clock driver already running");
        }
        let mut input = SampleBuffer::new(self.input_channels, self.frame_size);
        let mut output = SampleBuffer::new(self.output_channels, self.frame_size);
        let mut generator = self.generator.take();
        let mut sink = self.sink.take();
        let running = self.running.clone();
        let blocks = self.blocks.clone();
        let paced = self.paced;
        let period = self.period();
        running.store(true, Ordering::Release);

        let builder = ThreadBuilder::default()
            .name("Real-Time Thread".to_string())
            .priority(ThreadPriority::Max);

        let handle = builder.spawn(move |result| {
            if let Err(e) = result {
                debug!("running clock driver without raised priority: {:?}", e);
            }
            let mut next = Instant::now();
            while running.load(Ordering::Acquire) {
                match generator.as_mut() {
                    Some(g) => g(&mut input),
                    None => input.zero(),
                }
                callback.process(&input, &mut output);
                if let Some(p) = sink.as_mut() {
                    if p.slots() >= output.frame_count() * output.channel_count() {
                        for i in 0..output.frame_count() {
                            for ch in 0..output.channel_count() {
                                let _ = p.push(output.channel(ch)[i]);
                            }
                        }
                    }
                }
                blocks.fetch_add(1, Ordering::Relaxed);
                if paced {
                    next += period;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                } else {
                    thread::yield_now();
                }
            }
            (callback, generator, sink)
        });
        match handle {
            Ok(h) => {
                self.handle = Some(h);
                info!("clock driver started: {} Hz, {} frames", self.sample_rate, self.frame_size);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    fn stop(&mut self) -> Option<BoxedCallback> {
        let handle = self.handle.take()?;
        self.running.store(false, Ordering::Release);
        match handle.join() {
            Ok((callback, generator, sink)) => {
                self.generator = generator;
                self.sink = sink;
                info!("clock driver stopped after {} blocks", self.blocks_processed());
                Some(callback)
            }
            Err(_) => {
                warn!("clock driver thread panicked");
                None
            }
        }
    }

    fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), BoxError> {
        if self.handle.is_some() {
            bail!("cannot change the sample rate of a running clock driver");
        }
        if sample_rate == 0 {
            bail!("sample rate must be greater than zero");
        }
        self.sample_rate = sample_rate;
        Ok(())
    }
}

impl Drop for ClockDriver {
    fn drop(&mut self) {
        let _callback = self.stop();
    }
}
