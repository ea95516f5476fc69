use serde_json::json;

use crate::sound::sample_buffer::SampleBuffer;

use super::controls::{PluginSetting, SettingUnit};
use super::plugin::Plugin;

/// plain level trim
pub struct Gain {
    pub bypass: bool,
    settings: Vec<PluginSetting>,
    gain: f32,
}

impl Gain {
    pub fn new() -> Gain {
        let mut g = Gain {
            bypass: false,
            settings: Vec::new(),
            gain: 1.0,
        };
        g.settings.push(PluginSetting::new(
            SettingUnit::Linear,
            "gain",
            vec![],
            1.0,
            0.0,
            4.0,
            0.05,
        ));
        g.load_from_settings();
        g
    }
}

impl Plugin for Gain {
    fn name(&self) -> &str {
        "Gain"
    }
    fn do_change_a_value(&mut self, name: &str, val: &serde_json::Value) {
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
                if setting.get_name() == "gain" {
                    self.gain = setting.get_value();
                }
                setting.dirty = false;
            }
        }
    }
    fn do_algorithm(&mut self, input: &SampleBuffer, output: &mut SampleBuffer) -> () {
        for ch in 0..input.channel_count() {
            let src = input.channel(ch);
            for (o, i) in output.channel_mut(ch).iter_mut().zip(src.iter()) {
                *o = *i * self.gain;
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
        let mut settings: Vec<serde_json::Value> = vec![self.make_bypass()];
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

#[cfg(test)]
mod test_gain {
    use super::*;

    #[test]
    fn scales_and_bypasses() {
        let mut g = Gain::new();
        g.change_setting(&json!({"name": "gain", "value": 0.5}));
        let input = SampleBuffer::filled(2, 4, 1.0);
        let mut output = SampleBuffer::new(2, 4);
        g.process(&input, &mut output);
        assert_eq!(output.channel(1), &[0.5; 4]);
        g.change_setting(&json!({"name": "bypass", "value": true}));
        g.process(&input, &mut output);
        assert_eq!(output.channel(0), &[1.0; 4]);
        assert_eq!(g.as_json(3)["settings"][1]["value"], 0.5);
    }
}
