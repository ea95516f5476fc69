//! Effect and instrument plugins that run inside an input track's chain
//!
//! [`plugin::Plugin`] is the processing contract, [`plugin_chain::PluginChain`]
//! holds the ordered instances for one track, and [`host::PluginHost`] creates
//! instances from the descriptors kept in a [`catalog::PluginCatalog`].
pub mod catalog;
pub mod controls;
pub mod gain;
pub mod host;
pub mod plugin;
pub mod plugin_chain;
pub mod sine_synth;
pub mod tremolo;
