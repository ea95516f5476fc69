use crate::utils::to_db;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, ToPrimitive, FromPrimitive)]
pub enum SettingUnit {
    Msec = 0,
    DB,
    Linear,
    Selector,
    Footswitch,
    Hertz,
}

/// one adjustable value on a plugin
#[derive(Debug, Clone)]
pub struct PluginSetting {
    name: String,
    labels: Vec<String>,
    value: f32,
    min: f32,
    max: f32,
    step: f32,
    units: SettingUnit,
    pub dirty: bool,
}

impl PluginSetting {
    pub fn new(units: SettingUnit, name: &str, labels: Vec<String>, value: f32, min: f32, max: f32, step: f32) -> PluginSetting {
        PluginSetting {
            name: String::from(name),
            labels: labels,
            value: value,
            min: min,
            max: max,
            step: step,
            units: units,
            dirty: true,
        }
    }
    pub fn get_name(&self) -> &str {
        &self.name
    }
    pub fn get_value(&self) -> f32 {
        self.value
    }
    /// clamps into the setting's range and marks it dirty
    pub fn set_value(&mut self, v: f32) -> () {
        if !v.is_finite() {
            return;
        }
        self.value = v.clamp(self.min, self.max);
        self.dirty = true;
    }
    pub fn as_json(&self, idx: usize) -> Value {
        json!({
          "index": idx,
          "labels": self.labels,
          "name": self.name,
          "value": self.value,
          "min": self.min,
          "max": self.max,
          "step": self.step,
          "units": num::ToPrimitive::to_usize(&self.units),
          "display": self.display_value(),
        })
    }
    fn display_value(&self) -> Value {
        match self.units {
            SettingUnit::Msec => Value::from(self.value as f64 / 1000.0),
            SettingUnit::DB => Value::from(to_db(self.value as f64)),
            _ => Value::from(self.value as f64),
        }
    }
}

#[cfg(test)]
mod test_plugin_settings {
    use super::*;

    fn build_a_gain() -> PluginSetting {
        PluginSetting::new(SettingUnit::Linear, "gain", vec![], 1.0, 0.0, 4.0, 0.1)
    }

    #[test]
    fn can_build() {
        let setting = build_a_gain();
        assert_eq!(setting.get_value(), 1.0);
        assert!(setting.dirty);
    }

    #[test]
    fn clamps_into_range() {
        let mut setting = build_a_gain();
        setting.dirty = false;
        setting.set_value(10.0);
        assert_eq!(setting.get_value(), 4.0);
        assert!(setting.dirty);
        setting.set_value(f32::NAN);
        assert_eq!(setting.get_value(), 4.0);
    }

    #[test]
    fn can_json_out() {
        let setting = build_a_gain();
        let j_val = setting.as_json(1);
        assert_eq!(j_val["name"], "gain");
        assert_eq!(j_val["index"], 1);
        assert_eq!(j_val["units"], 2);
    }
}
