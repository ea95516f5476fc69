use serde_json::json;
use wmidi::MidiMessage;

use crate::sound::sample_buffer::SampleBuffer;

use super::controls::SettingUnit;

/// A live effect or instrument processor owned by one [`super::plugin_chain::PluginChain`] slot
///
/// `process` is called from the audio callback with `input` and `output`
/// already shaped alike. Implementations must not allocate or block there.
pub trait Plugin: Send {
    fn name(&self) -> &str;

    fn process(&mut self, input: &SampleBuffer, output: &mut SampleBuffer) -> () {
        if self.bypass() {
            output.copy_from(input);
        } else {
            self.do_algorithm(input, output);
        }
    }

    fn bypass(&self) -> bool {
        false
    }

    fn set_my_bypass(&mut self, val: bool) -> ();

    fn make_bypass(&self) -> serde_json::Value {
        json!({
            "index": 0,
            "labels": [],
            "max": 1,
            "min": 0,
            "name": "bypass",
            "step": 1,
            "units": num::ToPrimitive::to_usize(&SettingUnit::Footswitch),
            "value": self.bypass(),
        })
    }

    fn do_algorithm(&mut self, input: &SampleBuffer, output: &mut SampleBuffer) -> ();

    fn as_json(&self, index: usize) -> serde_json::Value;

    fn change_setting(&mut self, setting: &serde_json::Value) -> () {
        match setting["name"].as_str() {
            Some(v) => match v {
                "bypass" => match setting["value"].as_bool() {
                    Some(b) => {
                        self.set_my_bypass(b);
                    }
                    None => (),
                },
                _ => {
                    self.do_change_a_value(v, &setting["value"]);
                    self.load_from_settings();
                }
            },
            None => (),
        }
    }

    fn do_change_a_value(&mut self, name: &str, value: &serde_json::Value) -> ();
    fn load_from_settings(&mut self) -> ();

    /// the driver rate changed; rate-dependent state should be recomputed
    fn set_sample_rate(&mut self, _sample_rate: u32) -> () {}

    /// MIDI routed to the owning input track
    fn handle_midi(&mut self, _msg: &MidiMessage) -> () {}
}
