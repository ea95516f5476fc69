//! monophonic MIDI driven sine voice, the built-in instrument for MIDI routed tracks
use serde_json::json;
use wmidi::{MidiMessage, Note};

use crate::dsp::low_freq_osc::{LowFreqOsc, WaveShape};
use crate::sound::sample_buffer::SampleBuffer;
use crate::utils::get_coef;

use super::controls::{PluginSetting, SettingUnit};
use super::plugin::Plugin;

pub struct SineSynth {
    pub bypass: bool,
    settings: Vec<PluginSetting>,
    osc: LowFreqOsc<f32>,
    sample_rate: f32,
    volume: f32,
    release_ms: f32,
    note: Option<Note>,
    target: f32,
    env: f32,
    env_coef: f32,
}

impl SineSynth {
    pub fn new(sample_rate: u32) -> SineSynth {
        let mut synth = SineSynth {
            bypass: false,
            settings: Vec::new(),
            osc: LowFreqOsc::new(),
            sample_rate: sample_rate as f32,
            volume: 0.5,
            release_ms: 20.0,
            note: None,
            target: 0.0,
            env: 0.0,
            env_coef: 0.0,
        };
        synth.settings.push(PluginSetting::new(
            SettingUnit::Linear,
            "volume",
            vec![],
            0.5,
            0.0,
            1.0,
            0.05,
        ));
        synth.settings.push(PluginSetting::new(
            SettingUnit::Msec,
            "release",
            vec![],
            20.0,
            1.0,
            1000.0,
            1.0,
        ));
        synth.load_from_settings();
        synth
    }
    pub fn current_note(&self) -> Option<Note> {
        self.note
    }
    fn update_coef(&mut self) -> () {
        self.env_coef = get_coef(self.release_ms as f64 / 1000.0, self.sample_rate as f64) as f32;
    }
}

impl Plugin for SineSynth {
    fn name(&self) -> &str {
        "Sine Synth"
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
                match setting.get_name() {
                    "volume" => self.volume = setting.get_value(),
                    "release" => self.release_ms = setting.get_value(),
                    _ => (),
                }
                setting.dirty = false;
            }
        }
        self.update_coef();
    }
    fn set_sample_rate(&mut self, sample_rate: u32) -> () {
        self.sample_rate = sample_rate as f32;
        if let Some(note) = self.note {
            self.osc.set_frequency(note.to_freq_f32(), self.sample_rate);
        }
        self.update_coef();
    }
    fn handle_midi(&mut self, msg: &MidiMessage) -> () {
        match msg {
            MidiMessage::NoteOn(_, note, vel) if u8::from(*vel) > 0 => {
                if self.note.is_none() {
                    self.osc.reset();
                }
                self.osc.init(WaveShape::Sine, note.to_freq_f32(), 1.0, self.sample_rate);
                self.note = Some(*note);
                self.target = u8::from(*vel) as f32 / 127.0;
            }
            // a zero velocity note on is a note off
            MidiMessage::NoteOn(_, note, _) | MidiMessage::NoteOff(_, note, _) => {
                if self.note == Some(*note) {
                    self.target = 0.0;
                }
            }
            _ => (),
        }
    }

    fn do_algorithm(&mut self, input: &SampleBuffer, output: &mut SampleBuffer) -> () {
        let channels = input.channel_count();
        for i in 0..input.frame_count() {
            self.env = self.target + self.env_coef * (self.env - self.target);
            let tone = if self.env > 1e-5 {
                self.osc.get_sample() * self.env * self.volume
            } else {
                0.0
            };
            for ch in 0..channels {
                output.channel_mut(ch)[i] = input.channel(ch)[i] + tone;
            }
        }
        if self.target == 0.0 && self.env <= 1e-5 {
            self.note = None;
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
mod test_sine_synth {
    use super::*;
    use wmidi::{Channel, U7};

    #[test]
    fn silent_until_note_on() {
        let mut synth = SineSynth::new(48_000);
        let input = SampleBuffer::new(2, 128);
        let mut output = SampleBuffer::new(2, 128);
        synth.process(&input, &mut output);
        assert_eq!(output.peak(), 0.0);

        synth.handle_midi(&MidiMessage::NoteOn(Channel::Ch1, Note::A4, U7::from_u8_lossy(127)));
        assert_eq!(synth.current_note(), Some(Note::A4));
        synth.process(&input, &mut output);
        assert!(output.peak() > 0.0);
        assert!(output.peak() <= 0.5);
        assert_eq!(output.channel(0), output.channel(1));
    }

    #[test]
    fn note_off_releases() {
        let mut synth = SineSynth::new(48_000);
        let input = SampleBuffer::new(1, 128);
        let mut output = SampleBuffer::new(1, 128);
        synth.handle_midi(&MidiMessage::NoteOn(Channel::Ch1, Note::C4, U7::from_u8_lossy(100)));
        synth.process(&input, &mut output);
        synth.handle_midi(&MidiMessage::NoteOff(Channel::Ch1, Note::C4, U7::from_u8_lossy(0)));
        for _ in 0..200 {
            synth.process(&input, &mut output);
        }
        assert!(output.peak() < 1e-4);
        assert_eq!(synth.current_note(), None);
    }
}
