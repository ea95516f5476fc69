//! Modules related to DSP algorithms used by the built-in plugins

pub mod low_freq_osc;
