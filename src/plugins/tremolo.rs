use serde_json::json;

use crate::dsp::low_freq_osc::{LowFreqOsc, WaveShape};
use crate::sound::sample_buffer::SampleBuffer;

use super::controls::{PluginSetting, SettingUnit};
use super::plugin::Plugin;

pub struct Tremolo {
    pub bypass: bool,
    settings: Vec<PluginSetting>,
    osc: LowFreqOsc<f32>,
    depth: f32,
    rate: f32,
    sample_rate: f32,
}

impl Tremolo {
    pub fn new(sample_rate: u32) -> Tremolo {
        let mut trem = Tremolo {
            bypass: false,
            settings: Vec::new(),
            depth: 0.0,
            rate: 1.0,
            osc: LowFreqOsc::new(),
            sample_rate: sample_rate as f32,
        };
        trem.settings.push(PluginSetting::new(
            SettingUnit::Linear,
            "depth",
            vec![],
            0.4,
            0.0,
            1.0,
            0.05,
        ));
        trem.settings.push(PluginSetting::new(
            SettingUnit::Hertz,
            "rate",
            vec![],
            1.2,
            0.01,
            8.0,
            0.1,
        ));
        trem.load_from_settings();
        trem
    }
}

impl Plugin for Tremolo {
    fn name(&self) -> &str {
        "Tremolo"
    }
    fn do_change_a_value(&mut self, name: &str, val: &serde_json::Value) {
        // Find the setting using the name, then update it's value
        if let Some(f) = val.as_f64() {
            for setting in &mut self.settings {
                if setting.get_name() == name {
                    setting.set_value(f as f32);
                }
            }
        }
    }
    fn load_from_settings(&mut self) -> () {
        for setting in &mut self.settings {
            if setting.dirty {
                match setting.get_name() {
                    "depth" => {
                        self.depth = setting.get_value();
                    }
                    "rate" => {
                        self.rate = setting.get_value();
                    }
                    _ => (),
                }
                setting.dirty = false;
            }
        }
        self.osc.init(WaveShape::Sine, self.rate, self.depth, self.sample_rate);
    }
    fn set_sample_rate(&mut self, sample_rate: u32) -> () {
        self.sample_rate = sample_rate as f32;
        self.osc.set_frequency(self.rate, self.sample_rate);
    }

    fn do_algorithm(&mut self, input: &SampleBuffer, output: &mut SampleBuffer) -> () {
        // one modulation value per frame, shared by every channel
        let channels = input.channel_count();
        for i in 0..input.frame_count() {
            let m = 1.0 - self.depth * 0.5 + 0.5 * self.osc.get_sample();
            for ch in 0..channels {
                output.channel_mut(ch)[i] = input.channel(ch)[i] * m;
            }
        }
    }
    fn bypass(&self) -> bool {
        self.bypass
    }
    fn set_my_bypass(&mut self, val: bool) -> () {
        self.bypass = val;
    }
    fn as_json(&self, idx: usize) -> serde_json::Value {
        // pass in the bypass setting
        let mut settings: Vec<serde_json::Value> = vec![self.make_bypass()];
        // now the actual settings
        let mut i = 1;
        for item in &self.settings {
            settings.push(item.as_json(i));
            i += 1;
        }
        json!({
            "index": idx,
            "name": self.name(),
            "settings": settings,
        })
    }
}
