//! hand-off between locally encoded audio and the network session
//!
//! Outbound fragments go through a bounded queue to a worker thread that owns
//! every call into the [`NetworkSession`], so the encoder never waits on the
//! network for longer than the configured send timeout. Inbound session events
//! are queued and picked up by the control thread, see
//! [`crate::sound::jam_engine::JamEngine::tick`].
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(test)]
use mockall::automock;

use crate::common::box_error::BoxError;
use crate::common::engine_settings::EngineSettings;
use crate::common::room_info::ServerDescriptor;

/// one piece of an encoded interval for a single channel
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFragment {
    pub channel_index: u8,
    pub is_first: bool,
    pub is_last: bool,
    pub data: Vec<u8>,
}

impl fmt::Display for AudioFragment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ channel: {}, first: {}, last: {}, bytes: {} }}",
            self.channel_index,
            self.is_first,
            self.is_last,
            self.data.len()
        )
    }
}

/// The protocol side of a live session
///
/// Implementations own the wire format and any retry policy. `send_audio` is
/// only ever called from the relay's worker thread.
#[cfg_attr(test, automock)]
pub trait NetworkSession: Send + Sync {
    fn connect(&self, server: &ServerDescriptor) -> Result<(), BoxError>;
    fn disconnect(&self) -> Result<(), BoxError>;
    fn send_audio(&self, fragment: &AudioFragment) -> Result<(), BoxError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected(ServerDescriptor),
    Disconnected(ServerDescriptor),
    Error(String),
}

/// cloneable entry point for the session layer to report lifecycle events
#[derive(Clone)]
pub struct SessionEventSink {
    tx: Sender<SessionEvent>,
    dropped: Arc<AtomicU64>,
}

impl SessionEventSink {
    fn post(&self, event: SessionEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(ev)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("session event queue full, dropping {:?}", ev);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
    pub fn on_connected(&self, server: &ServerDescriptor) -> bool {
        self.post(SessionEvent::Connected(server.clone()))
    }
    pub fn on_disconnected(&self, server: &ServerDescriptor) -> bool {
        self.post(SessionEvent::Disconnected(server.clone()))
    }
    pub fn on_error(&self, message: &str) -> bool {
        self.post(SessionEvent::Error(message.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Framing {
    /// between intervals, the next fragment should be a first part
    Idle,
    /// inside an interval whose earlier parts were queued
    Open,
    /// a part of this interval was lost, drop until the next first part
    Dropping,
}

struct Outbound {
    tx: Option<Sender<AudioFragment>>,
    framing: HashMap<u8, Framing>,
    worker: Option<thread::JoinHandle<()>>,
    drain_deadline: Arc<Mutex<Option<Instant>>>,
}

#[derive(Debug, Default)]
struct RelayCounters {
    queued: AtomicU64,
    sent: AtomicU64,
    send_errors: AtomicU64,
    dropped: AtomicU64,
}

pub struct SessionRelay {
    session: Arc<dyn NetworkSession>,
    outbound: Mutex<Outbound>,
    counters: Arc<RelayCounters>,
    events_rx: Receiver<SessionEvent>,
    sink: SessionEventSink,
    queue_depth: usize,
    send_timeout: Duration,
    drain_timeout: Duration,
}

impl SessionRelay {
    pub fn new(settings: &EngineSettings, session: Arc<dyn NetworkSession>) -> SessionRelay {
        let (events_tx, events_rx) = bounded(settings.event_queue_depth);
        SessionRelay {
            session: session,
            outbound: Mutex::new(Outbound {
                tx: None,
                framing: HashMap::new(),
                worker: None,
                drain_deadline: Arc::new(Mutex::new(None)),
            }),
            counters: Arc::new(RelayCounters::default()),
            events_rx: events_rx,
            sink: SessionEventSink {
                tx: events_tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            queue_depth: settings.relay_queue_depth,
            send_timeout: settings.relay_send_timeout,
            drain_timeout: settings.relay_drain_timeout,
        }
    }

    pub fn session(&self) -> &Arc<dyn NetworkSession> {
        &self.session
    }

    pub fn event_sink(&self) -> SessionEventSink {
        self.sink.clone()
    }

    pub fn is_running(&self) -> bool {
        self.outbound.lock().tx.is_some()
    }

    /// start the worker; no-op when already running
    pub fn start(&self) -> Result<(), BoxError> {
        let mut out = self.outbound.lock();
        if out.tx.is_some() {
            return Ok(());
        }
        let (tx, rx) = bounded::<AudioFragment>(self.queue_depth);
        let session = self.session.clone();
        let counters = self.counters.clone();
        let deadline = Arc::new(Mutex::new(None));
        let worker_deadline = deadline.clone();
        let handle = thread::Builder::new()
            .name("session-relay".to_string())
            .spawn(move || relay_worker(rx, session, counters, worker_deadline))?;
        out.tx = Some(tx);
        out.framing.clear();
        out.worker = Some(handle);
        out.drain_deadline = deadline;
        info!("session relay started");
        Ok(())
    }

    /// stop accepting fragments and give the worker up to the drain timeout to
    /// flush what is queued; anything left after that is dropped
    pub fn stop(&self) -> () {
        let mut out = self.outbound.lock();
        let worker = match out.worker.take() {
            Some(w) => w,
            None => return,
        };
        let deadline = Instant::now() + self.drain_timeout;
        *out.drain_deadline.lock() = Some(deadline);
        // closing the queue lets the worker run out of fragments
        out.tx = None;
        out.framing.clear();
        drop(out);
        while !worker.is_finished() && Instant::now() < deadline + self.send_timeout {
            thread::sleep(Duration::from_millis(1));
        }
        if worker.is_finished() {
            if worker.join().is_err() {
                error!("session relay worker panicked");
            }
        } else {
            warn!("session relay worker still busy after drain timeout, detaching");
        }
        info!("session relay stopped: {}", self);
    }

    /// queue one encoded fragment for the session
    ///
    /// Returns false when the fragment was dropped: the relay is stopped, the
    /// queue stayed full past the send timeout, or an earlier part of the same
    /// interval was already lost. Fragments of one channel leave in the order
    /// they were accepted.
    pub fn on_local_audio_encoded(&self, data: Vec<u8>, channel_index: u8, is_first: bool, is_last: bool) -> bool {
        let mut out = self.outbound.lock();
        let tx = match out.tx.clone() {
            Some(tx) => tx,
            None => {
                trace!("relay stopped, dropping fragment for channel {}", channel_index);
                return false;
            }
        };
        let state = *out.framing.get(&channel_index).unwrap_or(&Framing::Idle);
        if state == Framing::Dropping && !is_first {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if state == Framing::Open && is_first {
            debug!("channel {} started a new interval before the last one closed", channel_index);
        }
        let fragment = AudioFragment {
            channel_index,
            is_first,
            is_last,
            data,
        };
        // the lock stays held across the send so fragments of a channel keep their order
        match tx.send_timeout(fragment, self.send_timeout) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                let next = if is_last { Framing::Idle } else { Framing::Open };
                out.framing.insert(channel_index, next);
                true
            }
            Err(SendTimeoutError::Timeout(_)) | Err(SendTimeoutError::Disconnected(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("session relay queue full, dropping rest of interval on channel {}", channel_index);
                let next = if is_last { Framing::Idle } else { Framing::Dropping };
                out.framing.insert(channel_index, next);
                false
            }
        }
    }

    pub fn on_connected(&self, server: &ServerDescriptor) -> bool {
        self.sink.on_connected(server)
    }
    pub fn on_disconnected(&self, server: &ServerDescriptor) -> bool {
        self.sink.on_disconnected(server)
    }
    pub fn on_error(&self, message: &str) -> bool {
        self.sink.on_error(message)
    }

    /// everything posted since the last drain, oldest first
    pub fn drain_events(&self) -> Vec<SessionEvent> {
        self.events_rx.try_iter().collect()
    }

    pub fn fragments_sent(&self) -> u64 {
        self.counters.sent.load(Ordering::Relaxed)
    }
    pub fn fragments_dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }
    pub fn events_dropped(&self) -> u64 {
        self.sink.dropped.load(Ordering::Relaxed)
    }

    pub fn as_json(&self) -> serde_json::Value {
        json!({
            "running": self.is_running(),
            "queued": self.counters.queued.load(Ordering::Relaxed),
            "sent": self.fragments_sent(),
            "sendErrors": self.counters.send_errors.load(Ordering::Relaxed),
            "dropped": self.fragments_dropped(),
            "eventsDropped": self.events_dropped(),
        })
    }
}

impl fmt::Display for SessionRelay {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ queued: {}, sent: {}, dropped: {} }}",
            self.counters.queued.load(Ordering::Relaxed),
            self.fragments_sent(),
            self.fragments_dropped()
        )
    }
}

impl Drop for SessionRelay {
    fn drop(&mut self) {
        self.stop();
    }
}

fn relay_worker(
    rx: Receiver<AudioFragment>,
    session: Arc<dyn NetworkSession>,
    counters: Arc<RelayCounters>,
    deadline: Arc<Mutex<Option<Instant>>>,
) -> () {
    for fragment in rx.iter() {
        let expired = match *deadline.lock() {
            Some(d) => Instant::now() >= d,
            None => false,
        };
        if expired {
            let left = 1 + rx.try_iter().count() as u64;
            counters.dropped.fetch_add(left, Ordering::Relaxed);
            warn!("drain timeout reached, dropped {} queued fragments", left);
            break;
        }
        match session.send_audio(&fragment) {
            Ok(()) => {
                counters.sent.fetch_add(1, Ordering::Relaxed);
                trace!("sent {}", fragment);
            }
            Err(e) => {
                // retrying is up to the session layer
                counters.send_errors.fetch_add(1, Ordering::Relaxed);
                warn!("session rejected {}: {}", fragment, e);
            }
        }
    }
    debug!("session relay worker exiting");
}
