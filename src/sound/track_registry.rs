//! the set of tracks the mixer sees
//!
//! The callback takes one [`TrackSnapshot`] per block with a wait-free load,
//! so a block sees every track that was added before it started and none that
//! were added while it runs. Adds and removes are serialised by a writer lock
//! on the control side and published copy-on-write. A remove returns only
//! after the callback has dropped every snapshot that still held the track.
use arc_swap::{ArcSwap, Guard};
use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

use crate::common::engine_settings::EngineSettings;
use crate::common::rt_swap;

use super::audio_node::SharedNode;
use super::channel_strip::ChannelStrip;
use super::peak_meter::PeakReading;

/// most tracks a mix can hold; the mixer sizes its per-block state for this many
pub const MAX_TRACKS: usize = 64;

#[derive(Clone)]
pub struct TrackEntry {
    pub id: i64,
    pub node: SharedNode,
    pub strip: Arc<ChannelStrip>,
}

#[derive(Clone, Default)]
pub struct TrackSnapshot {
    tracks: Vec<TrackEntry>,
}

impl TrackSnapshot {
    pub fn tracks(&self) -> &[TrackEntry] {
        &self.tracks
    }
    pub fn len(&self) -> usize {
        self.tracks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
    pub fn find(&self, id: i64) -> Option<&TrackEntry> {
        self.tracks.iter().find(|t| t.id == id)
    }
}

pub struct TrackRegistry {
    current: ArcSwap<TrackSnapshot>,
    writer: Mutex<()>,
    settings: EngineSettings,
}

impl TrackRegistry {
    pub fn new(settings: &EngineSettings) -> TrackRegistry {
        TrackRegistry {
            current: ArcSwap::from_pointee(TrackSnapshot::default()),
            writer: Mutex::new(()),
            settings: settings.clone(),
        }
    }

    /// the callback's view for one block
    pub fn snapshot(&self) -> Guard<Arc<TrackSnapshot>> {
        self.current.load()
    }

    /// false when `id` is already taken or the mix is full
    pub fn add_track(&self, id: i64, node: SharedNode) -> bool {
        let _w = self.writer.lock();
        let mut next = TrackSnapshot::clone(&self.current.load());
        if next.find(id).is_some() {
            warn!("track {} already exists", id);
            return false;
        }
        if next.len() >= MAX_TRACKS {
            warn!("no room for track {}, the mix already has {} tracks", id, MAX_TRACKS);
            return false;
        }
        next.tracks.push(TrackEntry {
            id: id,
            node: node,
            strip: Arc::new(ChannelStrip::new(&self.settings)),
        });
        let _old = rt_swap::publish(&self.current, next);
        debug!("added track {}", id);
        true
    }

    /// hand back the removed node once the callback can no longer reach it
    pub fn remove_track(&self, id: i64) -> Option<SharedNode> {
        let _w = self.writer.lock();
        let mut next = TrackSnapshot::clone(&self.current.load());
        let pos = next.tracks.iter().position(|t| t.id == id)?;
        let entry = next.tracks.remove(pos);
        let _old = rt_swap::publish(&self.current, next);
        debug!("removed track {}", id);
        Some(entry.node)
    }

    /// change the driver rate seen by every meter
    pub fn set_sample_rate(&self, sample_rate: u32) -> () {
        for t in self.current.load().tracks.iter() {
            t.strip.meter().set_sample_rate(sample_rate);
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.current.load().find(id).is_some()
    }
    pub fn track_ids(&self) -> Vec<i64> {
        self.current.load().tracks.iter().map(|t| t.id).collect()
    }
    pub fn get_track_node(&self, id: i64) -> Option<SharedNode> {
        self.current.load().find(id).map(|t| t.node.clone())
    }
    pub fn get_strip(&self, id: i64) -> Option<Arc<ChannelStrip>> {
        self.current.load().find(id).map(|t| t.strip.clone())
    }

    // setters are no-ops for an unknown id
    fn with_strip(&self, id: i64, f: impl FnOnce(&ChannelStrip)) -> () {
        match self.current.load().find(id) {
            Some(t) => f(&t.strip),
            None => debug!("no track {}", id),
        }
    }
    pub fn set_track_mute(&self, id: i64, v: bool) -> () {
        self.with_strip(id, |s| s.set_mute(v));
    }
    pub fn set_track_solo(&self, id: i64, v: bool) -> () {
        self.with_strip(id, |s| s.set_solo(v));
    }
    pub fn set_track_level(&self, id: i64, v: f32) -> () {
        self.with_strip(id, |s| {
            if !s.set_level(v) {
                warn!("ignoring level {} for track {}", v, id);
            }
        });
    }
    pub fn set_track_pan(&self, id: i64, v: f32) -> () {
        self.with_strip(id, |s| s.set_pan(v));
    }

    // getters fall back to defaults for an unknown id
    pub fn track_is_muted(&self, id: i64) -> bool {
        self.current.load().find(id).map(|t| t.strip.is_muted()).unwrap_or(false)
    }
    pub fn track_is_soloed(&self, id: i64) -> bool {
        self.current.load().find(id).map(|t| t.strip.is_soloed()).unwrap_or(false)
    }
    pub fn track_level(&self, id: i64) -> f32 {
        self.current.load().find(id).map(|t| t.strip.get_level()).unwrap_or(0.0)
    }
    pub fn track_pan(&self, id: i64) -> f32 {
        self.current.load().find(id).map(|t| t.strip.get_pan()).unwrap_or(0.0)
    }
    pub fn get_track_peak(&self, id: i64) -> PeakReading {
        self.current.load().find(id).map(|t| t.strip.peak()).unwrap_or_default()
    }

    pub fn as_json(&self) -> serde_json::Value {
        let snap = self.current.load();
        let tracks: Vec<serde_json::Value> = snap
            .tracks
            .iter()
            .map(|t| {
                let mut v = t.strip.as_json();
                v["trackId"] = json!(t.id);
                v
            })
            .collect();
        json!(tracks)
    }
}

#[cfg(test)]
mod test_track_registry {
    use super::*;
    use crate::sound::audio_node::{shared_node, NoInputNode};
    use crate::sound::sample_buffer::SampleBuffer;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn registry() -> TrackRegistry {
        TrackRegistry::new(&EngineSettings::default())
    }

    #[test]
    fn add_rejects_duplicates() {
        let reg = registry();
        assert!(reg.add_track(1, shared_node(NoInputNode::new())));
        assert!(!reg.add_track(1, shared_node(NoInputNode::new())));
        assert_eq!(reg.track_ids(), vec![1]);
    }

    #[test]
    fn add_stops_at_capacity() {
        let reg = registry();
        for id in 0..MAX_TRACKS as i64 {
            assert!(reg.add_track(id, shared_node(NoInputNode::new())));
        }
        assert!(!reg.add_track(1000, shared_node(NoInputNode::new())));
        reg.remove_track(0);
        assert!(reg.add_track(1000, shared_node(NoInputNode::new())));
    }

    #[test]
    fn get_returns_exact_node_and_nothing_after_removal() {
        let reg = registry();
        let mut added: Vec<(i64, SharedNode)> = vec![];
        for id in 0..10 {
            let n = shared_node(NoInputNode::new());
            assert!(reg.add_track(id, n.clone()));
            added.push((id, n));
        }
        for (id, n) in added.iter() {
            assert!(Arc::ptr_eq(&reg.get_track_node(*id).unwrap(), n));
        }
        for id in (0..10).step_by(2) {
            let removed = reg.remove_track(id).unwrap();
            assert!(Arc::ptr_eq(&removed, &added[id as usize].1));
            assert!(reg.get_track_node(id).is_none());
        }
        assert!(reg.remove_track(0).is_none());
        for id in (1..10).step_by(2) {
            assert!(Arc::ptr_eq(&reg.get_track_node(id).unwrap(), &added[id as usize].1));
        }
    }

    #[test]
    fn unknown_id_defaults() {
        let reg = registry();
        reg.set_track_mute(42, true);
        reg.set_track_level(42, 0.3);
        assert!(!reg.track_is_muted(42));
        assert!(!reg.track_is_soloed(42));
        assert_eq!(reg.track_level(42), 0.0);
        assert_eq!(reg.get_track_peak(42), PeakReading::default());
    }

    #[test]
    fn scalar_controls() {
        let reg = registry();
        reg.add_track(7, shared_node(NoInputNode::new()));
        reg.set_track_mute(7, true);
        reg.set_track_solo(7, true);
        reg.set_track_level(7, 0.25);
        reg.set_track_level(7, -1.0);
        reg.set_track_pan(7, -0.5);
        assert!(reg.track_is_muted(7));
        assert!(reg.track_is_soloed(7));
        assert_eq!(reg.track_level(7), 0.25);
        assert_eq!(reg.track_pan(7), -0.5);
        assert_eq!(reg.as_json()[0]["trackId"], 7);
    }

    #[test]
    fn snapshot_is_stable_within_a_block() {
        let reg = registry();
        reg.add_track(1, shared_node(NoInputNode::new()));
        let snap = reg.snapshot();
        assert_eq!(snap.len(), 1);
        drop(snap);
        reg.add_track(2, shared_node(NoInputNode::new()));
        assert_eq!(reg.snapshot().len(), 2);
    }

    #[test]
    fn removal_under_concurrent_callbacks() {
        let reg = Arc::new(registry());
        let done = Arc::new(AtomicBool::new(false));
        let audio_reg = reg.clone();
        let audio_done = done.clone();
        let audio = thread::spawn(move || {
            let input = SampleBuffer::new(2, 32);
            let mut out = SampleBuffer::new(2, 32);
            let mut blocks: u64 = 0;
            while !audio_done.load(Ordering::Acquire) {
                let snap = audio_reg.snapshot();
                for t in snap.tracks() {
                    if let Some(mut node) = t.node.try_lock() {
                        node.process(&input, &mut out);
                    }
                }
                blocks += 1;
            }
            blocks
        });
        for i in 0..500 {
            let node = shared_node(NoInputNode::new());
            assert!(reg.add_track(i, node.clone()));
            let removed = reg.remove_track(i).unwrap();
            drop(removed);
            // the callback gave up the node before remove returned
            assert_eq!(Arc::strong_count(&node), 1);
        }
        done.store(true, Ordering::Release);
        assert!(audio.join().unwrap() > 0);
    }
}
