//! the JamEngine aggregates all the sound components into a single structure.
//!
//! The engine itself never runs on the audio thread. It builds an
//! [`EngineProcessor`] and hands it to the [`AudioDriver`], which calls it
//! every block. Everything the two sides share lives in [`EngineShared`], and
//! every structural change made here is published so the callback sees either
//! the old or the new state, never a half-made one.
use log::{debug, info, warn};
use rtrb::{Producer, RingBuffer};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::sync::{mpsc, Arc};

use crate::common::{
    box_error::BoxError,
    engine_settings::EngineSettings,
    new_guid,
    room_info::{RoomInfo, ServerDescriptor},
};
use crate::plugins::{
    catalog::{PluginCatalog, PluginDescriptor},
    host::PluginHost,
    plugin_chain::{PluginChain, PluginHandle, PluginSlot},
};
use simple_error::bail;

use super::{
    audio_node::{shared_node, SharedNode},
    driver::AudioDriver,
    engine_processor::{EngineProcessor, EngineShared},
    local_input::{capture_ring, CaptureReader, InputBinding, InputRouting, LocalInputNode, MidiPacket},
    mixer::Mixer,
    notifications::EngineNotification,
    param_message::{JamParam, ParamMessage},
    peak_meter::PeakReading,
    remote_stream::{stream_ring, StreamFeeder},
    session_relay::{NetworkSession, SessionEvent, SessionEventSink, SessionRelay},
};

/// user names the session servers use for their own bots
pub const BOT_NAMES: [&str; 4] = ["Jambot", "ninbot", "ninbot_", "MUTANTLAB"];

/// control handle for one local input track
pub struct InputTrack {
    track_id: i64,
    binding: Arc<InputBinding>,
    chain: PluginChain,
    midi_tx: Producer<MidiPacket>,
    capture: Option<CaptureReader>,
}

impl InputTrack {
    pub fn track_id(&self) -> i64 {
        self.track_id
    }
    pub fn routing(&self) -> InputRouting {
        self.binding.routing()
    }
    pub fn chain(&self) -> &PluginChain {
        &self.chain
    }
    pub fn is_room_muted(&self) -> bool {
        self.binding.is_room_muted()
    }
    pub fn capture_drops(&self) -> u64 {
        self.binding.capture_drops()
    }
}

#[derive(Debug, Default)]
struct SessionState {
    connected_room: Option<RoomInfo>,
    pending_room: Option<RoomInfo>,
    streaming_room_id: Option<i64>,
    // server left for a room change whose disconnect is still to be reported
    leaving_server: Option<ServerDescriptor>,
}

/// The controller for one running engine
///
/// Owned by whatever drives the UI. Session callbacks arriving on other threads
/// go through [`JamEngine::session_events`] and take effect on the next
/// [`JamEngine::tick`].
///
/// # Example
/// ```
/// use std::sync::{mpsc, Arc};
/// use rtjam_engine::common::engine_settings::EngineSettings;
/// use rtjam_engine::common::room_info::ServerDescriptor;
/// use rtjam_engine::common::box_error::BoxError;
/// use rtjam_engine::plugins::host::BuiltinHost;
/// use rtjam_engine::sound::clock_driver::ClockDriver;
/// use rtjam_engine::sound::local_input::InputRouting;
/// use rtjam_engine::sound::session_relay::{AudioFragment, NetworkSession};
/// use rtjam_engine::JamEngine;
///
/// struct Offline {}
/// impl NetworkSession for Offline {
///     fn connect(&self, _s: &ServerDescriptor) -> Result<(), BoxError> { Ok(()) }
///     fn disconnect(&self) -> Result<(), BoxError> { Ok(()) }
///     fn send_audio(&self, _f: &AudioFragment) -> Result<(), BoxError> { Ok(()) }
/// }
///
/// let settings = EngineSettings::default();
/// let (notify_tx, _notify_rx) = mpsc::channel();
/// let driver = ClockDriver::new(settings.sample_rate, settings.frame_size, 2, 2);
/// let mut engine = JamEngine::new(
///     settings,
///     Box::new(driver),
///     Arc::new(Offline {}),
///     Box::new(BuiltinHost::new()),
///     notify_tx,
/// );
/// let input = engine.add_input_track(InputRouting::Mono(0)).unwrap();
/// engine.start().unwrap();
/// engine.set_track_level(input as i64, 0.5);
/// engine.stop();
/// ```
pub struct JamEngine {
    settings: EngineSettings,
    shared: Arc<EngineShared>,
    driver: Box<dyn AudioDriver>,
    relay: Arc<SessionRelay>,
    host: Box<dyn PluginHost>,
    catalog: PluginCatalog,
    inputs: Vec<Option<InputTrack>>,
    session: SessionState,
    started: bool,
    notify_tx: mpsc::Sender<EngineNotification>,
    guid: String,
}

impl JamEngine {
    pub fn new(
        settings: EngineSettings,
        driver: Box<dyn AudioDriver>,
        session: Arc<dyn NetworkSession>,
        host: Box<dyn PluginHost>,
        notify_tx: mpsc::Sender<EngineNotification>,
    ) -> JamEngine {
        let mut settings = settings;
        // the driver owns the real format
        settings.sample_rate = driver.sample_rate();
        settings.frame_size = driver.frame_size();
        let mut catalog = PluginCatalog::new();
        catalog.add_descriptors(host.descriptors());
        JamEngine {
            shared: Arc::new(EngineShared::new(&settings)),
            relay: Arc::new(SessionRelay::new(&settings, session)),
            settings: settings,
            driver: driver,
            host: host,
            catalog: catalog,
            inputs: vec![],
            session: SessionState::default(),
            started: false,
            notify_tx: notify_tx,
            guid: new_guid(),
        }
    }

    fn notify(&self, n: EngineNotification) -> () {
        debug!("notify: {}", n);
        // nobody listening is fine
        let _res = self.notify_tx.send(n);
    }

    // lifecycle

    /// register the callback with the driver; a no-op when already started
    pub fn start(&mut self) -> Result<(), BoxError> {
        if self.started {
            debug!("engine already started");
            return Ok(());
        }
        self.update_input_tracks_range(self.driver.input_channels());
        let processor = self.create_processor();
        self.driver.start(Box::new(processor))?;
        self.started = true;
        info!(
            "engine started: {} Hz, {} frames, {} in / {} out",
            self.driver.sample_rate(),
            self.driver.frame_size(),
            self.driver.input_channels(),
            self.driver.output_channels()
        );
        Ok(())
    }
    /// unregister the callback; a no-op when already stopped
    pub fn stop(&mut self) -> () {
        if !self.started {
            return;
        }
        let _callback = self.driver.stop();
        self.started = false;
        info!("engine stopped");
    }
    pub fn is_started(&self) -> bool {
        self.started
    }
    /// the process entry point for the current driver format
    pub fn create_processor(&self) -> EngineProcessor {
        EngineProcessor::new(
            self.shared.clone(),
            self.driver.sample_rate(),
            self.driver.output_channels(),
            self.driver.frame_size(),
        )
    }
    pub fn shared(&self) -> &Arc<EngineShared> {
        &self.shared
    }
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
    pub fn audio_driver_sample_rate(&self) -> u32 {
        self.driver.sample_rate()
    }

    /// the driver switched rate: restart the audio side with every buffer
    /// and meter prepared for the new format
    pub fn on_sample_rate_changed(&mut self, sample_rate: u32) -> Result<(), BoxError> {
        let was_started = self.started;
        self.stop();
        if let Err(e) = self.driver.set_sample_rate(sample_rate) {
            warn!("driver refused sample rate {}: {}", sample_rate, e);
            self.notify(EngineNotification::EngineStopped { reason: e.to_string() });
            return Err(e);
        }
        self.settings.sample_rate = sample_rate;
        self.prepare_nodes();
        self.notify(EngineNotification::SampleRateChanged(sample_rate));
        if was_started {
            if let Err(e) = self.start() {
                warn!("engine could not restart at {} Hz: {}", sample_rate, e);
                self.notify(EngineNotification::EngineStopped { reason: e.to_string() });
                return Err(e);
            }
        }
        Ok(())
    }

    /// the driver went away on its own
    pub fn on_driver_stopped(&mut self) -> () {
        let _callback = self.driver.stop();
        if self.started {
            self.started = false;
            warn!("audio driver stopped");
            self.notify(EngineNotification::EngineStopped {
                reason: String::from("audio driver stopped"),
            });
        }
    }

    fn prepare_nodes(&self) -> () {
        let rate = self.driver.sample_rate();
        let channels = self.driver.output_channels();
        let frames = self.driver.frame_size();
        self.shared.bus.set_sample_rate(rate);
        let nodes: Vec<SharedNode> = self
            .shared
            .bus
            .tracks
            .snapshot()
            .tracks()
            .iter()
            .map(|t| t.node.clone())
            .collect();
        for node in nodes {
            node.lock().prepare(rate, channels, frames);
        }
    }

    // tracks

    /// false when `id` is already in use
    pub fn add_track(&mut self, id: i64, node: SharedNode) -> bool {
        node.lock().prepare(
            self.driver.sample_rate(),
            self.driver.output_channels(),
            self.driver.frame_size(),
        );
        if !self.shared.bus.tracks.add_track(id, node) {
            return false;
        }
        if let Some(strip) = self.shared.bus.tracks.get_strip(id) {
            strip.meter().set_sample_rate(self.driver.sample_rate());
        }
        true
    }
    /// returns once the callback can no longer reach the track
    pub fn remove_track(&mut self, id: i64) -> bool {
        let removed = self.shared.bus.tracks.remove_track(id);
        if removed.is_none() {
            debug!("remove of unknown track {}", id);
            return false;
        }
        for slot in self.inputs.iter_mut() {
            if slot.as_ref().map(|t| t.track_id) == Some(id) {
                *slot = None;
            }
        }
        true
    }
    pub fn get_track_node(&self, id: i64) -> Option<SharedNode> {
        self.shared.bus.tracks.get_track_node(id)
    }
    pub fn track_ids(&self) -> Vec<i64> {
        self.shared.bus.tracks.track_ids()
    }
    pub fn set_track_mute(&self, id: i64, v: bool) -> () {
        self.shared.bus.tracks.set_track_mute(id, v);
    }
    pub fn set_track_solo(&self, id: i64, v: bool) -> () {
        self.shared.bus.tracks.set_track_solo(id, v);
    }
    pub fn set_track_level(&self, id: i64, v: f32) -> () {
        self.shared.bus.tracks.set_track_level(id, v);
    }
    pub fn set_track_pan(&self, id: i64, v: f32) -> () {
        self.shared.bus.tracks.set_track_pan(id, v);
    }
    pub fn track_is_muted(&self, id: i64) -> bool {
        self.shared.bus.tracks.track_is_muted(id)
    }
    pub fn track_is_soloed(&self, id: i64) -> bool {
        self.shared.bus.tracks.track_is_soloed(id)
    }
    pub fn track_level(&self, id: i64) -> f32 {
        self.shared.bus.tracks.track_level(id)
    }
    pub fn track_pan(&self, id: i64) -> f32 {
        self.shared.bus.tracks.track_pan(id)
    }
    pub fn set_master_volume(&self, v: f32) -> () {
        self.shared.bus.set_master(v);
    }
    pub fn get_track_peak(&self, id: i64) -> PeakReading {
        self.shared.bus.tracks.get_track_peak(id)
    }
    pub fn get_room_stream_peak(&self) -> PeakReading {
        self.shared.bus.room.peak()
    }
    pub fn get_master_peak(&self) -> PeakReading {
        self.shared.bus.get_master_peak()
    }

    // input tracks

    /// create a local input with its own plugin chain and register it as a
    /// track whose id is the input index
    pub fn add_input_track(&mut self, routing: InputRouting) -> Result<usize, BoxError> {
        let index = match self.inputs.iter().position(|s| s.is_none()) {
            Some(i) => i,
            None => self.inputs.len(),
        };
        let track_id = index as i64;
        if self.shared.bus.tracks.contains(track_id) {
            bail!("track id {} is already used by another track", track_id);
        }
        let rate = self.driver.sample_rate();
        let channels = self.driver.output_channels();
        let frames = self.driver.frame_size();
        let binding = Arc::new(InputBinding::new(routing.fit_to(self.driver.input_channels())));
        let chain = PluginChain::new();
        let (midi_tx, midi_rx) = RingBuffer::<MidiPacket>::new(self.settings.midi_queue_depth.max(1));
        let capture_frames = EngineSettings::frames_for_ms(self.settings.capture_buffer_ms, rate).max(frames);
        let (capture_tx, capture) = capture_ring(channels, capture_frames);
        let node = LocalInputNode::new(binding.clone(), chain.clone(), channels, frames)
            .with_midi(midi_rx)
            .with_capture(capture_tx);
        if !self.add_track(track_id, shared_node(node)) {
            bail!("could not register input track {}", track_id);
        }
        let track = InputTrack {
            track_id,
            binding,
            chain,
            midi_tx,
            capture: Some(capture),
        };
        if index == self.inputs.len() {
            self.inputs.push(Some(track));
        } else {
            self.inputs[index] = Some(track);
        }
        info!("added input track {} ({})", index, routing);
        Ok(index)
    }
    pub fn get_input_track(&self, input_index: usize) -> Option<&InputTrack> {
        self.inputs.get(input_index).and_then(|s| s.as_ref())
    }
    pub fn input_track_count(&self) -> usize {
        self.inputs.iter().filter(|s| s.is_some()).count()
    }

    // the routing is fitted to the driver, and observers hear about what was applied
    fn set_input_routing(&mut self, input_index: usize, routing: InputRouting) -> bool {
        let available = self.driver.input_channels();
        let applied = match self.get_input_track(input_index) {
            Some(t) => {
                let applied = routing.fit_to(available);
                t.binding.set_routing(applied);
                applied
            }
            None => {
                debug!("no input track {}", input_index);
                return false;
            }
        };
        if applied != routing {
            warn!("input {}: {} does not fit {} inputs, using {}", input_index, routing, available, applied);
        }
        self.notify(EngineNotification::InputSelectionChanged {
            input_index: input_index,
            routing: applied,
        });
        true
    }
    pub fn set_input_track_to_mono(&mut self, input_index: usize, channel: usize) -> bool {
        self.set_input_routing(input_index, InputRouting::Mono(channel))
    }
    pub fn set_input_track_to_stereo(&mut self, input_index: usize, first_channel: usize) -> bool {
        self.set_input_routing(input_index, InputRouting::Stereo(first_channel))
    }
    pub fn set_input_track_to_midi(&mut self, input_index: usize, device: usize) -> bool {
        self.set_input_routing(input_index, InputRouting::Midi(device))
    }
    pub fn set_input_track_to_no_input(&mut self, input_index: usize) -> bool {
        self.set_input_routing(input_index, InputRouting::NoInput)
    }

    /// refit every input to a driver with `available` inputs; returns how many changed
    pub fn update_input_tracks_range(&mut self, available: usize) -> usize {
        let mut changed: Vec<(usize, InputRouting)> = vec![];
        for (idx, slot) in self.inputs.iter().enumerate() {
            if let Some(t) = slot {
                let current = t.binding.routing();
                let fitted = current.fit_to(available);
                if fitted != current {
                    t.binding.set_routing(fitted);
                    changed.push((idx, fitted));
                }
            }
        }
        for (idx, routing) in changed.iter() {
            info!("input {} now {}", idx, routing);
            self.notify(EngineNotification::InputSelectionChanged {
                input_index: *idx,
                routing: *routing,
            });
        }
        changed.len()
    }

    /// queue raw MIDI for every input routed to `device`; returns how many took it
    pub fn on_midi_message(&mut self, device: usize, data: &[u8]) -> usize {
        let packet = match MidiPacket::new(device, data) {
            Some(p) => p,
            None => {
                debug!("ignoring midi message of {} bytes", data.len());
                return 0;
            }
        };
        let mut delivered = 0;
        for t in self.inputs.iter_mut().flatten() {
            if t.binding.routing() == InputRouting::Midi(device) {
                match t.midi_tx.push(packet) {
                    Ok(()) => delivered += 1,
                    Err(_) => warn!("midi queue full on track {}", t.track_id),
                }
            }
        }
        delivered
    }

    /// silence what an input sends to the room; local monitoring continues
    pub fn set_input_room_mute(&self, input_index: usize, v: bool) -> bool {
        match self.get_input_track(input_index) {
            Some(t) => {
                t.binding.set_room_muted(v);
                true
            }
            None => false,
        }
    }

    /// the reader of an input's post-chain audio, for the encoder; given out once
    pub fn take_capture(&mut self, input_index: usize) -> Option<CaptureReader> {
        self.inputs.get_mut(input_index)?.as_mut()?.capture.take()
    }

    // plugins

    /// instantiate `descriptor` and place it at `position` in an input's chain
    pub fn add_plugin(
        &mut self,
        input_index: usize,
        position: usize,
        descriptor: &PluginDescriptor,
    ) -> Result<PluginHandle, BoxError> {
        let chain = match self.get_input_track(input_index) {
            Some(t) => t.chain.clone(),
            None => bail!("no input track {}", input_index),
        };
        let plugin = self.host.instantiate(descriptor, self.driver.sample_rate())?;
        let handle = PluginSlot::new(descriptor.clone(), plugin);
        if !chain.insert(position, handle.clone()) {
            bail!("could not insert plugin {}", descriptor.name);
        }
        info!("input {}: added plugin {}", input_index, descriptor);
        Ok(handle)
    }
    /// returns once the callback can no longer reach the plugin
    pub fn remove_plugin(&mut self, input_index: usize, handle: &PluginHandle) -> bool {
        match self.get_input_track(input_index) {
            Some(t) => t.chain.remove(handle),
            None => false,
        }
    }
    pub fn remove_plugin_at(&mut self, input_index: usize, position: usize) -> bool {
        let taken = match self.get_input_track(input_index) {
            Some(t) => t.chain.remove_at(position),
            None => None,
        };
        match taken {
            Some(h) => {
                debug!("input {}: removed plugin {}", input_index, h.descriptor());
                // the instance is dropped here on the control thread
                let _plugin = PluginSlot::into_plugin(h);
                true
            }
            None => false,
        }
    }
    pub fn move_plugin(&mut self, input_index: usize, from_idx: usize, to_idx: usize) -> bool {
        match self.get_input_track(input_index) {
            Some(t) => t.chain.move_plugin(from_idx, to_idx),
            None => false,
        }
    }
    pub fn change_plugin_value(&self, input_index: usize, position: usize, setting: &serde_json::Value) -> bool {
        match self.get_input_track(input_index) {
            Some(t) => t.chain.change_value(position, setting),
            None => false,
        }
    }
    pub fn get_plugins_descriptors(&self) -> Vec<PluginDescriptor> {
        self.catalog.descriptors().to_vec()
    }
    pub fn on_plugin_found(&mut self, name: &str, group: &str, path: &str) -> bool {
        self.catalog.on_plugin_found(name, group, path)
    }
    /// replace the scanned list; the host's own plugins stay listed
    pub fn initialize_plugins_list(&mut self, paths: &[String]) -> usize {
        let found = self.catalog.initialize_plugins_list(paths);
        self.catalog.add_descriptors(self.host.descriptors());
        found
    }
    pub fn plugins_json(&self) -> serde_json::Value {
        let chains: Vec<serde_json::Value> = self
            .inputs
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|t| t.chain.as_json(i)))
            .collect();
        json!(chains)
    }

    // room stream

    /// start listening to a room without joining it; the caller decodes into the feeder
    pub fn play_room_stream(&mut self, room: &RoomInfo) -> StreamFeeder {
        self.stop_room_stream();
        let rate = self.driver.sample_rate();
        let (feeder, decoder) = stream_ring(EngineSettings::frames_for_ms(self.settings.room_buffer_ms, rate));
        {
            let mut node = self.shared.bus.room.node();
            let _old = node.set_decoder(Some(Box::new(decoder)));
        }
        self.shared.bus.room.set_active(true);
        self.session.streaming_room_id = Some(room.id);
        info!("playing room stream for {}", room);
        feeder
    }
    pub fn stop_room_stream(&mut self) -> () {
        self.shared.bus.room.set_active(false);
        let _old = self.shared.bus.room.node().set_decoder(None);
        if let Some(id) = self.session.streaming_room_id.take() {
            info!("stopped room stream for room {}", id);
        }
    }
    pub fn is_playing_room_stream(&self) -> bool {
        self.shared.bus.room.is_active()
    }
    pub fn current_streaming_room_id(&self) -> Option<i64> {
        self.session.streaming_room_id
    }

    // session

    /// ask the session to join `room`; the result arrives as a session event
    pub fn enter_in_room(&mut self, room: &RoomInfo) -> Result<(), BoxError> {
        self.stop_room_stream();
        if self.session.connected_room.is_some() || self.session.pending_room.is_some() {
            self.leave_for_room_change();
        }
        self.session.pending_room = Some(room.clone());
        info!("entering room {}", room);
        if let Err(e) = self.relay.session().connect(&room.server) {
            warn!("connect to {} failed: {}", room.server, e);
            self.session.pending_room = None;
            self.notify(EngineNotification::ExitedRoom { error: true });
            return Err(e);
        }
        Ok(())
    }
    // tear the current session down before connecting somewhere else
    fn leave_for_room_change(&mut self) -> () {
        let was_in_room = self.session.connected_room.take();
        let was_pending = self.session.pending_room.take();
        let server = match was_in_room.as_ref().or(was_pending.as_ref()) {
            Some(r) => r.server.clone(),
            None => return,
        };
        info!("leaving {} to change rooms", server);
        self.relay.stop();
        if let Err(e) = self.relay.session().disconnect() {
            warn!("disconnect from {} failed: {}", server, e);
        }
        self.session.leaving_server = Some(server);
        if was_in_room.is_some() {
            self.notify(EngineNotification::ExitedRoom { error: false });
        }
    }
    pub fn leave_room(&mut self) -> Result<(), BoxError> {
        if self.session.connected_room.is_none() && self.session.pending_room.is_none() {
            return Ok(());
        }
        info!("leaving room");
        self.relay.session().disconnect()
    }
    pub fn is_playing_in_ninjam_room(&self) -> bool {
        self.session.connected_room.is_some()
    }
    pub fn connected_room(&self) -> Option<&RoomInfo> {
        self.session.connected_room.as_ref()
    }
    /// where the session layer reports connect, disconnect and errors from any thread
    pub fn session_events(&self) -> SessionEventSink {
        self.relay.event_sink()
    }
    /// shared with the encoder thread
    pub fn relay(&self) -> Arc<SessionRelay> {
        self.relay.clone()
    }
    pub fn on_local_audio_encoded(&self, data: Vec<u8>, channel_index: u8, is_first: bool, is_last: bool) -> bool {
        self.relay.on_local_audio_encoded(data, channel_index, is_first, is_last)
    }

    /// apply queued session events; call regularly from the control thread
    pub fn tick(&mut self) -> usize {
        let events = self.relay.drain_events();
        let count = events.len();
        for ev in events {
            self.apply_session_event(ev);
        }
        count
    }

    fn apply_session_event(&mut self, ev: SessionEvent) -> () {
        match ev {
            SessionEvent::Connected(server) => self.session_connected(server),
            SessionEvent::Disconnected(server) => {
                if self.session.leaving_server.as_ref() == Some(&server) {
                    // already torn down by the room change
                    debug!("{} closed after a room change", server);
                    self.session.leaving_server = None;
                    return;
                }
                info!("disconnected from {}", server);
                self.session_closed(false);
            }
            SessionEvent::Error(msg) => {
                warn!("session error: {}", msg);
                self.session_closed(true);
            }
        }
    }

    fn session_connected(&mut self, server: ServerDescriptor) -> () {
        self.session.leaving_server = None;
        let room = match self.session.pending_room.take() {
            Some(r) if r.server == server => r,
            _ => RoomInfo::new(-1, &server.to_string(), server),
        };
        if let Err(e) = self.relay.start() {
            warn!("could not start the session relay: {}", e);
            let _res = self.relay.session().disconnect();
            self.session.connected_room = None;
            self.notify(EngineNotification::ExitedRoom { error: true });
            return;
        }
        info!("entered room {}", room);
        self.session.connected_room = Some(room.clone());
        self.notify(EngineNotification::EnteredRoom(room));
    }

    fn session_closed(&mut self, error: bool) -> () {
        self.relay.stop();
        let was_in_room = self.session.connected_room.take().is_some();
        let was_pending = self.session.pending_room.take().is_some();
        if was_in_room || was_pending || error {
            self.notify(EngineNotification::ExitedRoom { error });
        }
    }

    pub fn bot_names(&self) -> Vec<String> {
        BOT_NAMES.iter().map(|s| s.to_string()).collect()
    }
    pub fn is_bot(name: &str) -> bool {
        BOT_NAMES.iter().any(|b| name.eq_ignore_ascii_case(b))
    }
    pub fn guid(&self) -> &str {
        &self.guid
    }

    // status

    pub fn level_event(&self) -> serde_json::Value {
        let inputs: Vec<serde_json::Value> = self
            .inputs
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                s.as_ref().map(|t| {
                    json!({
                        "inputIndex": i,
                        "trackId": t.track_id,
                        "routing": t.routing().to_string(),
                        "roomMute": t.is_room_muted(),
                        "captureDrops": t.capture_drops(),
                    })
                })
            })
            .collect();
        json!({
            "speaker": "UnitChatRobot",
            "levelEvent": {
                "guid": self.guid,
                "started": self.started,
                "sampleRate": self.driver.sample_rate(),
                "connected": self.is_playing_in_ninjam_room(),
                "room": self.session.connected_room.as_ref().map(|r| r.name.clone()),
                "streamingRoomId": self.session.streaming_room_id,
                "mix": Mixer::as_json(&self.shared.bus),
                "inputs": inputs,
                "stats": self.shared.stats.as_json(),
                "relay": self.relay.as_json(),
            }
        })
    }

    /// apply one command from the control surface
    pub fn process_param_command(&mut self, msg: &ParamMessage) -> () {
        let param = match msg.jam_param() {
            Some(p) => p,
            None => {
                warn!("unknown command: {}", msg);
                return;
            }
        };
        let input = msg.ivalue_1.max(0) as usize;
        match param {
            JamParam::SetTrackLevel => self.set_track_level(msg.ivalue_1, msg.fvalue as f32),
            JamParam::SetTrackPan => self.set_track_pan(msg.ivalue_1, msg.fvalue as f32),
            JamParam::SetTrackMute => self.set_track_mute(msg.ivalue_1, msg.ivalue_2 == 1),
            JamParam::SetTrackSolo => self.set_track_solo(msg.ivalue_1, msg.ivalue_2 == 1),
            JamParam::MasterVol => self.set_master_volume(msg.fvalue as f32),
            JamParam::SetInputMono => {
                self.set_input_track_to_mono(input, msg.ivalue_2.max(0) as usize);
            }
            JamParam::SetInputStereo => {
                self.set_input_track_to_stereo(input, msg.ivalue_2.max(0) as usize);
            }
            JamParam::SetInputMidi => {
                self.set_input_track_to_midi(input, msg.ivalue_2.max(0) as usize);
            }
            JamParam::SetInputNone => {
                self.set_input_track_to_no_input(input);
            }
            JamParam::MuteToRoom => {
                self.set_input_room_mute(input, msg.ivalue_2 == 1);
            }
            JamParam::InsertPlugin => {
                match self.catalog.find_by_name(&msg.svalue).cloned() {
                    Some(desc) => {
                        if let Err(e) = self.add_plugin(input, msg.ivalue_2.max(0) as usize, &desc) {
                            warn!("insert plugin failed: {}", e);
                        }
                    }
                    None => warn!("no plugin named '{}'", msg.svalue),
                }
                self.send_plugin_info();
            }
            JamParam::DeletePlugin => {
                self.remove_plugin_at(input, msg.ivalue_2.max(0) as usize);
                self.send_plugin_info();
            }
            JamParam::MovePlugin => {
                let to_idx = msg.fvalue.round().max(0.0) as usize;
                self.move_plugin(input, msg.ivalue_2.max(0) as usize, to_idx);
                self.send_plugin_info();
            }
            JamParam::SetPluginConfig => match serde_json::Value::from_str(&msg.svalue) {
                Ok(setting) => {
                    self.change_plugin_value(input, msg.ivalue_2.max(0) as usize, &setting);
                }
                Err(e) => warn!("bad plugin setting '{}': {}", msg.svalue, e),
            },
            JamParam::GetConfigJson => self.send_plugin_info(),
            JamParam::GetPluginTypes => {
                self.notify(EngineNotification::Status(json!({
                    "pluginTypes": self.catalog.as_json()
                })));
            }
            JamParam::RoomChange => {
                let server = ServerDescriptor::new(&msg.svalue, msg.ivalue_1.clamp(0, u16::MAX as i64) as u16);
                let room = RoomInfo::new(msg.ivalue_2, &msg.svalue, server);
                if let Err(e) = self.enter_in_room(&room) {
                    warn!("room change failed: {}", e);
                }
            }
            JamParam::Disconnect => {
                if let Err(e) = self.leave_room() {
                    warn!("disconnect failed: {}", e);
                }
            }
            JamParam::StopRoomStream => self.stop_room_stream(),
            JamParam::StopAudio => self.stop(),
            JamParam::StartAudio => {
                if let Err(e) = self.start() {
                    warn!("start failed: {}", e);
                }
            }
            JamParam::GetLevels => self.notify(EngineNotification::Status(self.level_event())),
        }
    }

    fn send_plugin_info(&self) -> () {
        self.notify(EngineNotification::Status(json!({
            "pluginInfo": self.plugins_json()
        })));
    }
}

impl fmt::Display for JamEngine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ started: {}, inputs: {}, bus: {}, relay: {} }}",
            self.started,
            self.input_track_count(),
            self.shared.bus,
            self.relay
        )
    }
}

impl Drop for JamEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod test_jam_engine {
    use super::*;
    use crate::plugins::host::BuiltinHost;
    use crate::sound::audio_node::{AudioNode, NoInputNode, NodeKind};
    use crate::sound::clock_driver::ClockDriver;
    use crate::sound::driver::BoxedCallback;
    use crate::sound::local_input::MAX_ROUTING_INDEX;
    use crate::sound::sample_buffer::SampleBuffer;
    use crate::sound::session_relay::{AudioFragment, MockNetworkSession};
    use mockall::predicate::*;
    use mockall::Sequence;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    type CallbackCell = Arc<Mutex<Option<BoxedCallback>>>;

    /// keeps the callback so a test can run blocks one at a time
    struct ManualDriver {
        sample_rate: u32,
        inputs: usize,
        callback: CallbackCell,
        fail_start: Arc<AtomicBool>,
    }

    impl ManualDriver {
        fn new(inputs: usize) -> (ManualDriver, CallbackCell, Arc<AtomicBool>) {
            let cell: CallbackCell = Arc::new(Mutex::new(None));
            let fail = Arc::new(AtomicBool::new(false));
            let driver = ManualDriver {
                sample_rate: 48_000,
                inputs: inputs,
                callback: cell.clone(),
                fail_start: fail.clone(),
            };
            (driver, cell, fail)
        }
    }

    impl AudioDriver for ManualDriver {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }
        fn frame_size(&self) -> usize {
            64
        }
        fn input_channels(&self) -> usize {
            self.inputs
        }
        fn output_channels(&self) -> usize {
            2
        }
        fn start(&mut self, callback: BoxedCallback) -> Result<(), BoxError> {
            if self.fail_start.load(Ordering::Relaxed) {
                bail!("device gone");
            }
            *self.callback.lock() = Some(callback);
            Ok(())
        }
        fn stop(&mut self) -> Option<BoxedCallback> {
            self.callback.lock().take()
        }
        fn is_running(&self) -> bool {
            self.callback.lock().is_some()
        }
        fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), BoxError> {
            self.sample_rate = sample_rate;
            Ok(())
        }
    }

    // run one block through whatever callback the driver holds
    fn pump(cell: &CallbackCell, input: &SampleBuffer) -> SampleBuffer {
        let mut out = SampleBuffer::new(2, input.frame_count());
        if let Some(cb) = cell.lock().as_mut() {
            cb.process(input, &mut out);
        }
        out
    }

    struct ConstNode(f32);

    impl AudioNode for ConstNode {
        fn kind(&self) -> NodeKind {
            NodeKind::LocalInput
        }
        fn process(&mut self, _input: &SampleBuffer, output: &mut SampleBuffer) -> () {
            for ch in 0..output.channel_count() {
                output.channel_mut(ch).fill(self.0);
            }
        }
    }

    fn quiet_session() -> MockNetworkSession {
        let mut session = MockNetworkSession::new();
        session.expect_connect().returning(|_| Ok(()));
        session.expect_disconnect().returning(|| Ok(()));
        session.expect_send_audio().returning(|_| Ok(()));
        session
    }

    fn build_with(
        session: MockNetworkSession,
        inputs: usize,
    ) -> (JamEngine, CallbackCell, Arc<AtomicBool>, mpsc::Receiver<EngineNotification>) {
        let (tx, rx) = mpsc::channel();
        let (driver, cell, fail) = ManualDriver::new(inputs);
        let engine = JamEngine::new(
            EngineSettings::default(),
            Box::new(driver),
            Arc::new(session),
            Box::new(BuiltinHost::new()),
            tx,
        );
        (engine, cell, fail, rx)
    }

    fn build_one() -> (JamEngine, CallbackCell, Arc<AtomicBool>, mpsc::Receiver<EngineNotification>) {
        build_with(quiet_session(), 2)
    }

    fn assert_all(out: &SampleBuffer, v: f32) {
        for ch in 0..out.channel_count() {
            for s in out.channel(ch) {
                assert!((s - v).abs() < 1e-6, "expected {} got {}", v, s);
            }
        }
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let (mut engine, cell, _fail, _rx) = build_one();
        assert!(!engine.is_started());
        engine.stop();
        engine.start().unwrap();
        engine.start().unwrap();
        assert!(engine.is_started());
        assert!(cell.lock().is_some());
        engine.stop();
        engine.stop();
        assert!(!engine.is_started());
        assert!(cell.lock().is_none());
    }

    #[test]
    fn track_scenario_through_the_callback() {
        let (mut engine, cell, _fail, _rx) = build_one();
        engine.start().unwrap();
        let input = SampleBuffer::new(2, 64);
        assert!(engine.add_track(1, shared_node(NoInputNode::new())));
        assert!(!engine.add_track(1, shared_node(NoInputNode::new())));
        engine.set_track_level(1, 1.0);
        engine.set_track_pan(1, 0.0);
        assert_all(&pump(&cell, &input), 0.0);
        engine.set_track_mute(1, true);
        assert_all(&pump(&cell, &input), 0.0);

        assert!(engine.remove_track(1));
        assert!(engine.add_track(1, shared_node(ConstNode(1.0))));
        engine.set_track_level(1, 0.5);
        assert_all(&pump(&cell, &input), 0.5);

        engine.add_track(2, shared_node(ConstNode(0.25)));
        engine.set_track_solo(2, true);
        assert_all(&pump(&cell, &input), 0.25);
        engine.set_track_mute(1, true);
        assert_all(&pump(&cell, &input), 0.25);
        assert!(engine.get_track_peak(2).instant > 0.0);
        assert!(!engine.remove_track(99));
    }

    #[test]
    fn get_track_node_returns_the_added_node() {
        let (mut engine, _cell, _fail, _rx) = build_one();
        let mut nodes = vec![];
        for id in 0..16 {
            let node = shared_node(NoInputNode::new());
            assert!(engine.add_track(id, node.clone()));
            nodes.push(node);
        }
        for id in (0..16).step_by(3) {
            assert!(engine.remove_track(id));
            assert!(engine.get_track_node(id).is_none());
        }
        for id in 0..16 {
            match engine.get_track_node(id) {
                Some(n) => assert!(Arc::ptr_eq(&n, &nodes[id as usize])),
                None => assert_eq!(id % 3, 0),
            }
        }
    }

    #[test]
    fn input_track_routing_and_notifications() {
        let (mut engine, cell, _fail, rx) = build_one();
        let idx = engine.add_input_track(InputRouting::Mono(0)).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(engine.get_input_track(0).unwrap().track_id(), 0);
        engine.start().unwrap();

        let input = SampleBuffer::from_channels(vec![vec![0.5; 64], vec![-0.25; 64]]).unwrap();
        let out = pump(&cell, &input);
        assert!((out.channel(0)[0] - 0.5).abs() < 1e-6);

        assert!(engine.set_input_track_to_mono(0, 1));
        let out = pump(&cell, &input);
        assert!((out.channel(1)[3] + 0.25).abs() < 1e-6);
        match rx.try_recv().unwrap() {
            EngineNotification::InputSelectionChanged { input_index, routing } => {
                assert_eq!(input_index, 0);
                assert_eq!(routing, InputRouting::Mono(1));
            }
            other => panic!("unexpected {:?}", other),
        }

        // a stereo pair past the device is fitted down
        assert!(engine.set_input_track_to_stereo(0, 1));
        assert_eq!(engine.get_input_track(0).unwrap().routing(), InputRouting::Mono(1));
        assert!(engine.set_input_track_to_no_input(0));
        assert_all(&pump(&cell, &input), 0.0);
        assert!(!engine.set_input_track_to_mono(5, 0));
    }

    #[test]
    fn midi_device_past_the_routing_range_is_no_input() {
        let (mut engine, _cell, _fail, rx) = build_one();
        engine.add_input_track(InputRouting::NoInput).unwrap();
        let wide = MAX_ROUTING_INDEX.wrapping_add(2);
        assert!(engine.set_input_track_to_midi(0, wide));
        assert_eq!(engine.get_input_track(0).unwrap().routing(), InputRouting::NoInput);
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineNotification::InputSelectionChanged {
                input_index: 0,
                routing: InputRouting::NoInput
            }
        );
        // a message from the truncated device reaches nobody
        assert_eq!(engine.on_midi_message(1, &[0x90, 60, 100]), 0);
    }

    #[test]
    fn update_input_range_collapses_routing() {
        let (mut engine, _cell, _fail, rx) = build_one();
        engine.add_input_track(InputRouting::Stereo(0)).unwrap();
        engine.add_input_track(InputRouting::Mono(1)).unwrap();
        assert_eq!(engine.update_input_tracks_range(1), 2);
        assert_eq!(engine.get_input_track(0).unwrap().routing(), InputRouting::Mono(0));
        assert_eq!(engine.get_input_track(1).unwrap().routing(), InputRouting::NoInput);
        assert_eq!(rx.try_iter().count(), 2);
        assert_eq!(engine.update_input_tracks_range(1), 0);
    }

    #[test]
    fn removed_input_slot_is_reused() {
        let (mut engine, _cell, _fail, _rx) = build_one();
        engine.add_input_track(InputRouting::Mono(0)).unwrap();
        engine.add_input_track(InputRouting::Mono(1)).unwrap();
        assert!(engine.remove_track(0));
        assert!(engine.get_input_track(0).is_none());
        assert_eq!(engine.add_input_track(InputRouting::NoInput).unwrap(), 0);
        assert_eq!(engine.input_track_count(), 2);
        // a plain track squatting on the next id blocks the input
        engine.add_track(2, shared_node(NoInputNode::new()));
        assert!(engine.add_input_track(InputRouting::NoInput).is_err());
    }

    #[test]
    fn midi_drives_an_instrument_plugin() {
        let (mut engine, cell, _fail, _rx) = build_one();
        let idx = engine.add_input_track(InputRouting::Midi(3)).unwrap();
        let synth = engine
            .get_plugins_descriptors()
            .into_iter()
            .find(|d| d.name == "Sine Synth")
            .unwrap();
        engine.add_plugin(idx, 0, &synth).unwrap();
        engine.start().unwrap();
        let input = SampleBuffer::new(2, 64);
        assert_all(&pump(&cell, &input), 0.0);

        assert_eq!(engine.on_midi_message(2, &[0x90, 69, 100]), 0);
        assert_eq!(engine.on_midi_message(3, &[0x90, 69, 100]), 1);
        let mut peak = 0.0f32;
        for _ in 0..20 {
            peak = peak.max(pump(&cell, &input).peak());
        }
        assert!(peak > 0.0);
    }

    #[test]
    fn plugins_add_move_remove() {
        let (mut engine, _cell, _fail, _rx) = build_one();
        let idx = engine.add_input_track(InputRouting::Mono(0)).unwrap();
        let gain = engine.catalog.find_by_name("Gain").cloned().unwrap();
        let trem = engine.catalog.find_by_name("Tremolo").cloned().unwrap();
        let g = engine.add_plugin(idx, 0, &gain).unwrap();
        engine.add_plugin(idx, 9, &trem).unwrap();
        assert!(engine.move_plugin(idx, 1, 0));
        let chain = engine.get_input_track(idx).unwrap().chain().clone();
        assert_eq!(chain.get(0).unwrap().descriptor().name, "Tremolo");
        assert!(engine.remove_plugin(idx, &g));
        assert!(!engine.remove_plugin(idx, &g));
        assert!(engine.remove_plugin_at(idx, 0));
        assert!(chain.is_empty());
        assert!(engine.add_plugin(7, 0, &gain).is_err());

        // scanned plugins are listed but the builtin host can't load them
        assert!(engine.on_plugin_found("Reverb", "VST", "/plugins/Reverb.so"));
        let vst = PluginDescriptor::new("Reverb", "VST", "/plugins/Reverb.so");
        assert!(engine.add_plugin(idx, 0, &vst).is_err());
        assert_eq!(engine.initialize_plugins_list(&["/a/Delay.so".to_string()]), 1);
        assert_eq!(engine.get_plugins_descriptors().len(), 4);
    }

    #[test]
    fn plugin_edits_while_running_keep_block_shape() {
        let settings = EngineSettings::default();
        let (tx, _rx) = mpsc::channel();
        let driver = ClockDriver::new(settings.sample_rate, 64, 2, 2).free_running();
        let mut engine = JamEngine::new(
            settings,
            Box::new(driver),
            Arc::new(quiet_session()),
            Box::new(BuiltinHost::new()),
            tx,
        );
        let idx = engine.add_input_track(InputRouting::Stereo(0)).unwrap();
        let mut capture = engine.take_capture(idx).unwrap();
        assert!(engine.take_capture(idx).is_none());
        engine.start().unwrap();
        let gain = engine.catalog.find_by_name("Gain").cloned().unwrap();
        for i in 0..200 {
            let h = engine.add_plugin(idx, i % 3, &gain).unwrap();
            if i % 2 == 0 {
                assert!(engine.remove_plugin(idx, &h));
            }
            let blocks = capture.read(64);
            assert_eq!(blocks.len(), 2);
            assert_eq!(blocks[0].len(), blocks[1].len());
        }
        engine.stop();
        assert_eq!(engine.shared().stats.get_glitches(), 0);
        assert!(engine.shared().stats.get_callbacks() > 0);
    }

    #[test]
    fn remove_track_while_callback_runs() {
        let settings = EngineSettings::default();
        let (tx, _rx) = mpsc::channel();
        let driver = ClockDriver::new(settings.sample_rate, 32, 2, 2).free_running();
        let mut engine = JamEngine::new(
            settings,
            Box::new(driver),
            Arc::new(quiet_session()),
            Box::new(BuiltinHost::new()),
            tx,
        );
        engine.start().unwrap();
        for i in 0..500 {
            let id = (i % 7) as i64;
            if !engine.add_track(id, shared_node(ConstNode(0.1))) {
                let node = engine.get_track_node(id).unwrap();
                assert!(engine.remove_track(id));
                // the callback has let go of it
                assert_eq!(Arc::strong_count(&node), 1);
            }
        }
        engine.stop();
        assert_eq!(engine.shared().stats.get_glitches(), 0);
    }

    #[test]
    fn room_stream_plays_and_stops() {
        let (mut engine, cell, _fail, _rx) = build_one();
        engine.start().unwrap();
        let room = RoomInfo::new(12, "Funk", ServerDescriptor::new("jam.example.net", 2049));
        let mut feeder = engine.play_room_stream(&room);
        assert!(engine.is_playing_room_stream());
        assert_eq!(engine.current_streaming_room_id(), Some(12));
        feeder.push_frames(&[0.3; 8192], &[0.3; 8192]);
        let input = SampleBuffer::new(2, 64);
        let mut heard = false;
        for _ in 0..100 {
            if pump(&cell, &input).peak() > 0.29 {
                heard = true;
                break;
            }
        }
        assert!(heard);
        assert!(engine.get_room_stream_peak().instant > 0.0);
        engine.stop_room_stream();
        assert!(!engine.is_playing_room_stream());
        assert_eq!(engine.current_streaming_room_id(), None);
        assert!(feeder.is_closed());
        assert_all(&pump(&cell, &input), 0.0);
    }

    #[test]
    fn entering_a_room_follows_session_events() {
        let mut session = MockNetworkSession::new();
        let server = ServerDescriptor::new("jam.example.net", 2049);
        session
            .expect_connect()
            .with(eq(server.clone()))
            .times(1)
            .returning(|_| Ok(()));
        session.expect_disconnect().times(1).returning(|| Ok(()));
        session.expect_send_audio().returning(|_| Ok(()));
        let (mut engine, _cell, _fail, rx) = build_with(session, 2);
        let room = RoomInfo::new(3, "Blues", server.clone());
        engine.play_room_stream(&room);
        engine.enter_in_room(&room).unwrap();
        // joining stops the listen-only stream
        assert!(!engine.is_playing_room_stream());
        assert!(!engine.is_playing_in_ninjam_room());

        assert!(engine.session_events().on_connected(&server));
        assert_eq!(engine.tick(), 1);
        assert!(engine.is_playing_in_ninjam_room());
        assert!(engine.relay().is_running());
        assert_eq!(rx.try_recv().unwrap(), EngineNotification::EnteredRoom(room.clone()));

        engine.leave_room().unwrap();
        engine.session_events().on_disconnected(&server);
        engine.tick();
        assert!(!engine.is_playing_in_ninjam_room());
        assert!(!engine.relay().is_running());
        assert_eq!(rx.try_recv().unwrap(), EngineNotification::ExitedRoom { error: false });
        // nothing to leave now
        engine.leave_room().unwrap();
    }

    #[test]
    fn changing_rooms_leaves_the_old_one_first() {
        let mut session = MockNetworkSession::new();
        let mut seq = Sequence::new();
        let first = ServerDescriptor::new("jam.example.net", 2049);
        let second = ServerDescriptor::new("jam.example.org", 2050);
        session
            .expect_connect()
            .with(eq(first.clone()))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        session
            .expect_disconnect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        session
            .expect_connect()
            .with(eq(second.clone()))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        session.expect_send_audio().returning(|_| Ok(()));
        let (mut engine, _cell, _fail, rx) = build_with(session, 2);
        let blues = RoomInfo::new(3, "Blues", first.clone());
        let funk = RoomInfo::new(4, "Funk", second.clone());

        engine.enter_in_room(&blues).unwrap();
        engine.session_events().on_connected(&first);
        engine.tick();
        assert_eq!(rx.try_recv().unwrap(), EngineNotification::EnteredRoom(blues.clone()));

        engine.enter_in_room(&funk).unwrap();
        assert!(!engine.is_playing_in_ninjam_room());
        assert!(!engine.relay().is_running());
        assert_eq!(rx.try_recv().unwrap(), EngineNotification::ExitedRoom { error: false });

        // the old server reports its close after the new connect was asked for
        engine.session_events().on_disconnected(&first);
        engine.session_events().on_connected(&second);
        assert_eq!(engine.tick(), 2);
        assert_eq!(rx.try_recv().unwrap(), EngineNotification::EnteredRoom(funk.clone()));
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.connected_room(), Some(&funk));
        assert!(engine.relay().is_running());
    }

    #[test]
    fn session_error_exits_with_error() {
        let (mut engine, _cell, _fail, rx) = build_one();
        let server = ServerDescriptor::new("jam.example.net", 2049);
        engine.enter_in_room(&RoomInfo::new(1, "Rock", server.clone())).unwrap();
        engine.session_events().on_connected(&server);
        engine.tick();
        let _entered = rx.try_recv().unwrap();
        engine.session_events().on_error("connection reset");
        engine.tick();
        assert_eq!(rx.try_recv().unwrap(), EngineNotification::ExitedRoom { error: true });
        assert!(!engine.is_playing_in_ninjam_room());
    }

    #[test]
    fn failed_connect_reports_exit() {
        let mut session = MockNetworkSession::new();
        session.expect_connect().returning(|_| Err("refused".into()));
        let (mut engine, _cell, _fail, rx) = build_with(session, 2);
        let room = RoomInfo::new(1, "Rock", ServerDescriptor::new("nowhere", 1));
        assert!(engine.enter_in_room(&room).is_err());
        assert_eq!(rx.try_recv().unwrap(), EngineNotification::ExitedRoom { error: true });
    }

    #[test]
    fn encoded_fragments_reach_the_session_in_order() {
        let mut session = MockNetworkSession::new();
        let mut seq = Sequence::new();
        let server = ServerDescriptor::new("jam.example.net", 2049);
        session.expect_connect().returning(|_| Ok(()));
        for (first, last) in [(true, false), (false, false), (false, true)] {
            session
                .expect_send_audio()
                .withf(move |f: &AudioFragment| f.channel_index == 0 && f.is_first == first && f.is_last == last)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }
        let (mut engine, _cell, _fail, _rx) = build_with(session, 2);
        // dropped while not in a room
        assert!(!engine.on_local_audio_encoded(vec![9], 0, true, true));
        engine.enter_in_room(&RoomInfo::new(1, "Rock", server.clone())).unwrap();
        engine.session_events().on_connected(&server);
        engine.tick();
        assert!(engine.on_local_audio_encoded(vec![1], 0, true, false));
        assert!(engine.on_local_audio_encoded(vec![2], 0, false, false));
        assert!(engine.on_local_audio_encoded(vec![3], 0, false, true));
        let relay = engine.relay();
        for _ in 0..500 {
            if relay.fragments_sent() == 3 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(relay.fragments_sent(), 3);
    }

    #[test]
    fn sample_rate_change_restarts_the_engine() {
        let (mut engine, cell, fail, rx) = build_one();
        engine.add_input_track(InputRouting::Mono(0)).unwrap();
        engine.start().unwrap();
        engine.on_sample_rate_changed(44_100).unwrap();
        assert!(engine.is_started());
        assert_eq!(engine.audio_driver_sample_rate(), 44_100);
        assert_eq!(rx.try_recv().unwrap(), EngineNotification::SampleRateChanged(44_100));
        let out = pump(&cell, &SampleBuffer::new(2, 64));
        assert_eq!(out.frame_count(), 64);

        fail.store(true, Ordering::Relaxed);
        assert!(engine.on_sample_rate_changed(96_000).is_err());
        assert!(!engine.is_started());
        let events: Vec<EngineNotification> = rx.try_iter().collect();
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineNotification::EngineStopped { .. })));
    }

    #[test]
    fn driver_stop_notifies_once() {
        let (mut engine, _cell, _fail, rx) = build_one();
        engine.start().unwrap();
        engine.on_driver_stopped();
        engine.on_driver_stopped();
        assert!(!engine.is_started());
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn param_commands() {
        let (mut engine, _cell, _fail, rx) = build_one();
        engine.add_input_track(InputRouting::Mono(0)).unwrap();
        engine.process_param_command(&ParamMessage::from_param(JamParam::SetTrackLevel, 0, 0, 0.25, ""));
        assert_eq!(engine.track_level(0), 0.25);
        engine.process_param_command(&ParamMessage::from_param(JamParam::SetTrackMute, 0, 1, 0.0, ""));
        assert!(engine.track_is_muted(0));
        engine.process_param_command(&ParamMessage::from_param(JamParam::MuteToRoom, 0, 1, 0.0, ""));
        assert!(engine.get_input_track(0).unwrap().is_room_muted());
        engine.process_param_command(&ParamMessage::from_param(JamParam::InsertPlugin, 0, 0, 0.0, "Gain"));
        assert_eq!(engine.get_input_track(0).unwrap().chain().len(), 1);
        engine.process_param_command(&ParamMessage::from_param(
            JamParam::SetPluginConfig,
            0,
            0,
            0.0,
            "{\"name\": \"gain\", \"value\": 2.0}",
        ));
        engine.process_param_command(&ParamMessage::from_param(JamParam::DeletePlugin, 0, 0, 0.0, ""));
        assert!(engine.get_input_track(0).unwrap().chain().is_empty());
        engine.process_param_command(&ParamMessage::from_param(JamParam::StartAudio, 0, 0, 0.0, ""));
        assert!(engine.is_started());
        engine.process_param_command(&ParamMessage::from_param(JamParam::StopAudio, 0, 0, 0.0, ""));
        assert!(!engine.is_started());
        engine.process_param_command(&ParamMessage::new(999, 0, 0, 0.0, ""));
        engine.process_param_command(&ParamMessage::from_param(JamParam::GetLevels, 0, 0, 0.0, ""));
        let statuses = rx
            .try_iter()
            .filter(|n| matches!(n, EngineNotification::Status(_)))
            .count();
        assert_eq!(statuses, 3);
    }

    #[test]
    fn level_event_json() {
        let (mut engine, _cell, _fail, _rx) = build_one();
        engine.add_input_track(InputRouting::Stereo(0)).unwrap();
        let ev = engine.level_event();
        assert_eq!(ev["speaker"], "UnitChatRobot");
        assert_eq!(ev["levelEvent"]["inputs"][0]["routing"], "stereo 0-1");
        assert_eq!(ev["levelEvent"]["connected"], false);
        assert_eq!(ev["levelEvent"]["guid"].as_str().unwrap().len(), 32);
        assert!(JamEngine::is_bot("ninbot"));
        assert!(!JamEngine::is_bot("guitar_dave"));
        assert_eq!(engine.bot_names().len(), BOT_NAMES.len());
        assert!(engine.to_string().contains("inputs: 1"));
    }
}
