//! turns a [`PluginDescriptor`] into a live plugin instance
use simple_error::bail;

use crate::common::box_error::BoxError;

use super::catalog::PluginDescriptor;
use super::gain::Gain;
use super::plugin::Plugin;
use super::sine_synth::SineSynth;
use super::tremolo::Tremolo;

pub type BoxedPlugin = Box<dyn Plugin>;

pub const BUILTIN_GROUP: &str = "Builtin";

pub trait PluginHost: Send {
    /// create a fresh instance; each call returns a new, unshared plugin
    fn instantiate(&self, descriptor: &PluginDescriptor, sample_rate: u32) -> Result<BoxedPlugin, BoxError>;
    /// descriptors this host can always instantiate without a scan
    fn descriptors(&self) -> Vec<PluginDescriptor>;
}

/// host for the plugins compiled into the engine
pub struct BuiltinHost {}

impl BuiltinHost {
    pub fn new() -> BuiltinHost {
        BuiltinHost {}
    }
    fn make_plugin(name: &str, sample_rate: u32) -> Option<BoxedPlugin> {
        match name {
            "Gain" => Some(Box::new(Gain::new())),
            "Tremolo" => Some(Box::new(Tremolo::new(sample_rate))),
            "Sine Synth" => Some(Box::new(SineSynth::new(sample_rate))),
            _ => None,
        }
    }
}

impl PluginHost for BuiltinHost {
    fn instantiate(&self, descriptor: &PluginDescriptor, sample_rate: u32) -> Result<BoxedPlugin, BoxError> {
        if descriptor.group != BUILTIN_GROUP {
            bail!("no host for plugin group '{}' ({})", descriptor.group, descriptor.name);
        }
        match Self::make_plugin(&descriptor.name, sample_rate) {
            Some(p) => Ok(p),
            None => bail!("can't create plugin {}", descriptor.name),
        }
    }
    fn descriptors(&self) -> Vec<PluginDescriptor> {
        ["Gain", "Tremolo", "Sine Synth"]
            .iter()
            .map(|n| PluginDescriptor::new(n, BUILTIN_GROUP, &format!("builtin:{}", n)))
            .collect()
    }
}
