use clap::Parser;
use dasp_sample::Sample;
use dasp_signal::Signal;
use log::{info, warn};
use parking_lot::Mutex;
use rtjam_engine::{
    common::{
        box_error::BoxError,
        config::Config,
        engine_settings::EngineSettings,
        room_info::{RoomInfo, ServerDescriptor},
    },
    plugins::host::BuiltinHost,
    sound::{
        clock_driver::ClockDriver,
        local_input::InputRouting,
        notifications::EngineNotification,
        sample_buffer::SampleBuffer,
        session_relay::{AudioFragment, NetworkSession, SessionEventSink},
    },
    JamEngine,
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc, Arc,
    },
    thread,
    time::{Duration, Instant},
};

/// Run the jam engine on a simulated audio device and print level events
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Settings file (missing keys use the defaults)
    #[arg(short, long, default_value = "engine_settings.json")]
    config: String,

    /// Seconds to run
    #[arg(short, long, default_value_t = 5)]
    seconds: u64,

    /// Frequency of the simulated input tone
    #[arg(long, default_value_t = 220.0)]
    tone_hz: f64,

    /// Plugin to put on the input track
    #[arg(short, long, default_value = "Tremolo")]
    plugin: String,

    /// Join a simulated room instead of only listening to its stream
    #[arg(short, long)]
    join: bool,
}

/// a session that accepts everything and reports back through the event sink
struct LoopbackSession {
    sink: Mutex<Option<SessionEventSink>>,
    bytes: AtomicU64,
}

impl NetworkSession for LoopbackSession {
    fn connect(&self, server: &ServerDescriptor) -> Result<(), BoxError> {
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.on_connected(server);
        }
        Ok(())
    }
    fn disconnect(&self) -> Result<(), BoxError> {
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.on_disconnected(&ServerDescriptor::new("localhost", 2049));
        }
        Ok(())
    }
    fn send_audio(&self, fragment: &AudioFragment) -> Result<(), BoxError> {
        self.bytes.fetch_add(fragment.data.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

fn main() -> Result<(), BoxError> {
    env_logger::init();
    let args = Args::parse();

    let config = Config::build(args.config.clone(), EngineSettings::config_defaults())?;
    let settings = EngineSettings::from_config(&config)?;
    info!("settings: {:?}", settings);

    let mut tone = dasp_signal::rate(settings.sample_rate as f64)
        .const_hz(args.tone_hz)
        .sine();
    let driver = ClockDriver::new(settings.sample_rate, settings.frame_size, 2, 2).with_generator(Box::new(
        move |buf: &mut SampleBuffer| {
            for s in buf.channel_mut(0).iter_mut() {
                *s = (tone.next() * 0.3) as f32;
            }
            buf.channel_mut(1).fill(0.0);
        },
    ));

    let session = Arc::new(LoopbackSession {
        sink: Mutex::new(None),
        bytes: AtomicU64::new(0),
    });
    let (notify_tx, notify_rx) = mpsc::channel::<EngineNotification>();
    let mut engine = JamEngine::new(
        settings.clone(),
        Box::new(driver),
        session.clone(),
        Box::new(BuiltinHost::new()),
        notify_tx,
    );
    *session.sink.lock() = Some(engine.session_events());

    let input = engine.add_input_track(InputRouting::Mono(0))?;
    match engine
        .get_plugins_descriptors()
        .into_iter()
        .find(|d| d.name == args.plugin)
    {
        Some(desc) => {
            engine.add_plugin(input, 0, &desc)?;
        }
        None => warn!("no plugin named '{}'", args.plugin),
    }
    engine.set_track_level(input as i64, 0.8);
    engine.set_track_pan(input as i64, -0.3);
    engine.start()?;

    let room = RoomInfo::new(1, "Demo Room", ServerDescriptor::new("localhost", 2049));
    let running = Arc::new(AtomicBool::new(true));
    let mut threads = vec![];

    if args.join {
        engine.enter_in_room(&room)?;
        // stand-in encoder: 16 bit samples, one interval per 8 reads
        let mut capture = engine.take_capture(input).ok_or("capture already taken")?;
        let relay = engine.relay();
        let enc_running = running.clone();
        threads.push(thread::spawn(move || {
            let mut part: u32 = 0;
            while enc_running.load(Ordering::Relaxed) {
                let block = capture.read(1024);
                if block[0].is_empty() {
                    thread::sleep(Duration::from_millis(5));
                    continue;
                }
                let data: Vec<u8> = block[0]
                    .iter()
                    .flat_map(|s| s.to_sample::<i16>().to_le_bytes())
                    .collect();
                relay.on_local_audio_encoded(data, 0, part == 0, part == 7);
                part = (part + 1) % 8;
            }
        }));
    } else {
        let mut feeder = engine.play_room_stream(&room);
        let mut room_sig = dasp_signal::rate(settings.sample_rate as f64).const_hz(110.0).saw();
        let feed_running = running.clone();
        threads.push(thread::spawn(move || {
            let mut left = vec![0.0f32; 480];
            while feed_running.load(Ordering::Relaxed) && !feeder.is_closed() {
                if feeder.free_frames() >= left.len() {
                    for s in left.iter_mut() {
                        *s = (room_sig.next() * 0.1) as f32;
                    }
                    feeder.push_frames(&left, &left);
                }
                thread::sleep(Duration::from_millis(5));
            }
        }));
    }

    let end = Instant::now() + Duration::from_secs(args.seconds);
    while Instant::now() < end {
        thread::sleep(Duration::from_millis(500));
        engine.tick();
        for n in notify_rx.try_iter() {
            println!("{}", n);
        }
        println!("{}", engine.level_event());
    }

    running.store(false, Ordering::Relaxed);
    for t in threads {
        let _res = t.join();
    }
    if args.join {
        engine.leave_room()?;
        engine.tick();
    }
    engine.stop_room_stream();
    engine.stop();
    for n in notify_rx.try_iter() {
        println!("{}", n);
    }
    println!("sent {} bytes to the session", session.bytes.load(Ordering::Relaxed));
    Ok(())
}
