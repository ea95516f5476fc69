//! ordered effect chain for one input track
//!
//! The audio callback reads the current list of slots without blocking. Edits
//! build a new list and publish it; an edit returns only once the callback has
//! let go of the list it replaced, so a removed plugin is never mid-`process`
//! when the caller gets it back.
use arc_swap::ArcSwap;
use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use wmidi::MidiMessage;

use crate::common::rt_swap;
use crate::sound::sample_buffer::SampleBuffer;

use super::catalog::PluginDescriptor;
use super::host::BoxedPlugin;
use super::plugin::Plugin;

/// a plugin instance and the descriptor it was created from
pub struct PluginSlot {
    descriptor: PluginDescriptor,
    plugin: Mutex<BoxedPlugin>,
    attached: AtomicBool,
}

pub type PluginHandle = Arc<PluginSlot>;

impl PluginSlot {
    pub fn new(descriptor: PluginDescriptor, plugin: BoxedPlugin) -> PluginHandle {
        Arc::new(PluginSlot {
            descriptor: descriptor,
            plugin: Mutex::new(plugin),
            attached: AtomicBool::new(false),
        })
    }
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }
    /// true while the slot sits in a chain
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }
    /// run `f` against the plugin from a control thread
    pub fn with_plugin<R>(&self, f: impl FnOnce(&mut dyn Plugin) -> R) -> R {
        let mut plugin = self.plugin.lock();
        f(plugin.as_mut())
    }
    /// take the plugin back once nothing else references the slot
    pub fn into_plugin(handle: PluginHandle) -> Option<BoxedPlugin> {
        Arc::try_unwrap(handle).ok().map(|slot| slot.plugin.into_inner())
    }
}

struct ChainState {
    slots: ArcSwap<Vec<PluginHandle>>,
    writer: Mutex<()>,
}

#[derive(Clone)]
pub struct PluginChain {
    state: Arc<ChainState>,
}

impl PluginChain {
    pub fn new() -> PluginChain {
        PluginChain {
            state: Arc::new(ChainState {
                slots: ArcSwap::from_pointee(vec![]),
                writer: Mutex::new(()),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.state.slots.load().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn plugins(&self) -> Vec<PluginHandle> {
        self.state.slots.load().iter().cloned().collect()
    }
    pub fn get(&self, idx: usize) -> Option<PluginHandle> {
        self.state.slots.load().get(idx).cloned()
    }

    // build the next list from the current one and publish it; caller holds the writer lock
    fn edit(&self, f: impl FnOnce(&mut Vec<PluginHandle>) -> bool) -> bool {
        let mut next: Vec<PluginHandle> = self.state.slots.load().iter().cloned().collect();
        if !f(&mut next) {
            return false;
        }
        let _old = rt_swap::publish(&self.state.slots, next);
        true
    }

    /// place `handle` at `idx`, or at the end when `idx` is past it
    ///
    /// Refused when the slot already sits in a chain.
    pub fn insert(&self, idx: usize, handle: PluginHandle) -> bool {
        let _w = self.state.writer.lock();
        if handle.attached.swap(true, Ordering::AcqRel) {
            warn!("plugin {} is already in a chain", handle.descriptor.name);
            return false;
        }
        let name = handle.descriptor.name.clone();
        self.edit(|slots| {
            if idx >= slots.len() {
                slots.push(handle);
            } else {
                slots.insert(idx, handle);
            }
            true
        });
        debug!("inserted plugin {} at {}", name, idx);
        true
    }

    pub fn push(&self, handle: PluginHandle) -> bool {
        self.insert(usize::MAX, handle)
    }

    /// remove a specific slot; false when it is not in this chain
    pub fn remove(&self, handle: &PluginHandle) -> bool {
        let _w = self.state.writer.lock();
        let removed = self.edit(|slots| match slots.iter().position(|s| Arc::ptr_eq(s, handle)) {
            Some(pos) => {
                slots.remove(pos);
                true
            }
            None => false,
        });
        if removed {
            handle.attached.store(false, Ordering::Release);
        }
        removed
    }

    pub fn remove_at(&self, idx: usize) -> Option<PluginHandle> {
        let _w = self.state.writer.lock();
        let mut taken: Option<PluginHandle> = None;
        self.edit(|slots| {
            if idx < slots.len() {
                taken = Some(slots.remove(idx));
                true
            } else {
                false
            }
        });
        if let Some(h) = &taken {
            h.attached.store(false, Ordering::Release);
        }
        taken
    }

    pub fn move_plugin(&self, from_idx: usize, to_idx: usize) -> bool {
        let _w = self.state.writer.lock();
        self.edit(|slots| {
            if from_idx >= slots.len() || from_idx == to_idx {
                return false;
            }
            let slot = slots.remove(from_idx);
            let to = to_idx.min(slots.len());
            slots.insert(to, slot);
            true
        })
    }

    /// empty the chain, handing every slot back
    pub fn clear(&self) -> Vec<PluginHandle> {
        let _w = self.state.writer.lock();
        let old = rt_swap::publish(&self.state.slots, vec![]);
        for h in old.iter() {
            h.attached.store(false, Ordering::Release);
        }
        old
    }

    /// apply a settings change from the control side
    pub fn change_value(&self, idx: usize, setting: &serde_json::Value) -> bool {
        match self.get(idx) {
            Some(slot) => {
                slot.with_plugin(|p| p.change_setting(setting));
                true
            }
            None => false,
        }
    }

    pub fn set_sample_rate(&self, sample_rate: u32) -> () {
        for slot in self.plugins() {
            slot.with_plugin(|p| p.set_sample_rate(sample_rate));
        }
    }

    /// run `buf` through every plugin in order, leaving the result in `buf`
    ///
    /// Called from the audio callback. `scratch` must have at least the capacity
    /// of `buf`. A plugin that is busy on a control thread is passed through for
    /// this block.
    pub fn process(&self, buf: &mut SampleBuffer, scratch: &mut SampleBuffer) -> () {
        let slots = self.state.slots.load();
        if slots.is_empty() {
            return;
        }
        if !scratch.reshape(buf.channel_count(), buf.frame_count()) {
            return;
        }
        let mut swapped = false;
        for slot in slots.iter() {
            if let Some(mut plugin) = slot.plugin.try_lock() {
                plugin.process(buf, scratch);
                scratch.sanitize();
                std::mem::swap(buf, scratch);
                swapped = !swapped;
            }
        }
        // hand the caller back its own storage
        if swapped {
            std::mem::swap(buf, scratch);
            buf.copy_from(scratch);
        }
    }

    /// hand a MIDI message to every plugin; called from the audio callback
    pub fn handle_midi(&self, msg: &MidiMessage) -> () {
        let slots = self.state.slots.load();
        for slot in slots.iter() {
            if let Some(mut plugin) = slot.plugin.try_lock() {
                plugin.handle_midi(msg);
            }
        }
    }

    pub fn as_json(&self, channel: usize) -> serde_json::Value {
        let mut rval: Vec<serde_json::Value> = vec![];
        let mut i = 0;
        for slot in self.plugins() {
            let mut effect = slot.with_plugin(|p| p.as_json(i));
            effect["descriptor"] = json!(slot.descriptor());
            rval.push(effect);
            i += 1;
        }
        json!({
            "channel": channel,
            "name": format!("channel_{}", channel),
            "effects": rval,
        })
    }
}
