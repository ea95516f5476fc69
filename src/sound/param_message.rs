//! Structure used to pass control surface commands to the engine
//!
//! The wire form is the JSON object `{param, iValue1, iValue2, fValue, sValue}`.
//! Numbers may arrive as strings, so every field accepts both.
use log::debug;
use num_traits::FromPrimitive;
use serde_json::json;
use simple_error::bail;
use std::fmt;

use crate::common::box_error::BoxError;

/// the commands a UI can send
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum JamParam {
    // iValue1 = track id, fValue = value
    SetTrackLevel = 1,
    SetTrackPan,
    // iValue2 = 1 for on
    SetTrackMute,
    SetTrackSolo,
    MasterVol,
    // iValue1 = input index, iValue2 = driver channel or MIDI device
    SetInputMono = 10,
    SetInputStereo,
    SetInputMidi,
    SetInputNone,
    MuteToRoom,
    // iValue1 = input index, iValue2 = chain position, sValue = plugin name
    InsertPlugin = 20,
    DeletePlugin,
    // fValue = destination position
    MovePlugin,
    // sValue = setting JSON
    SetPluginConfig,
    GetConfigJson,
    GetPluginTypes,
    // sValue = host, iValue1 = port, iValue2 = room id
    RoomChange = 30,
    Disconnect,
    StopRoomStream,
    StopAudio = 40,
    StartAudio,
    GetLevels,
}

pub struct ParamMessage {
    pub param: i64,
    pub ivalue_1: i64,
    pub ivalue_2: i64,
    pub fvalue: f64,
    pub svalue: String,
}

impl ParamMessage {
    pub fn new(param: i64, ival1: i64, ival2: i64, fval: f64, sval: &str) -> ParamMessage {
        ParamMessage {
            param: param,
            ivalue_1: ival1,
            ivalue_2: ival2,
            fvalue: fval,
            svalue: String::from(sval),
        }
    }
    pub fn from_param(param: JamParam, ival1: i64, ival2: i64, fval: f64, sval: &str) -> ParamMessage {
        Self::new(param as i64, ival1, ival2, fval, sval)
    }
    /// `None` for a param number the engine does not know
    pub fn jam_param(&self) -> Option<JamParam> {
        JamParam::from_i64(self.param)
    }
    pub fn as_json(&self) -> serde_json::Value {
        json!({
          "param": self.param,
          "iValue1": self.ivalue_1,
          "iValue2": self.ivalue_2,
          "fValue": self.fvalue,
          "sValue": self.svalue,
        })
    }
    pub fn from_string(data: &str) -> Result<ParamMessage, BoxError> {
        let raw: serde_json::Value = serde_json::from_str(data)?;
        debug!("param message: {}", raw);
        Self::from_json(&raw)
    }
    pub fn from_json(raw: &serde_json::Value) -> Result<ParamMessage, BoxError> {
        let param = match Self::int_field(raw, "param")? {
            Some(p) => p,
            None => bail!("no param in message"),
        };
        let mut msg = ParamMessage::new(param, 0, 0, 0.0, "");
        if let Some(v) = Self::int_field(raw, "iValue1")? {
            msg.ivalue_1 = v;
        }
        if let Some(v) = Self::int_field(raw, "iValue2")? {
            msg.ivalue_2 = v;
        }
        let fval = &raw["fValue"];
        if let Some(v) = fval.as_f64() {
            msg.fvalue = v;
        } else if let Some(s) = fval.as_str() {
            msg.fvalue = str::parse(s)?;
        }
        if let Some(s) = raw["sValue"].as_str() {
            msg.svalue = String::from(s);
        }
        Ok(msg)
    }
    fn int_field(raw: &serde_json::Value, name: &str) -> Result<Option<i64>, BoxError> {
        let field = &raw[name];
        if let Some(v) = field.as_i64() {
            return Ok(Some(v));
        }
        match field.as_str() {
            Some(s) => Ok(Some(str::parse(s)?)),
            None => Ok(None),
        }
    }
}

impl fmt::Display for ParamMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ param: {}, ival_1: {}, ival_2: {}, fval: {} sval: {} }}",
            self.param, self.ivalue_1, self.ivalue_2, self.fvalue, self.svalue
        )
    }
}

#[cfg(test)]
mod test_param_message {
    use super::*;

    #[test]
    fn can_json() {
        let msg = ParamMessage::new(0, 1, 2, 3.0, "bob");
        assert!(msg.ivalue_1 == 1);
        assert_eq!(msg.as_json()["sValue"], "bob");
    }
    #[test]
    fn from_json_string_1() {
        let data = r#"
        {
            "param": 21,
            "iValue1": 1,
            "iValue2": 100,
            "fValue": 2.0,
            "sValue": "John Doe"
        }"#;
        let msg = ParamMessage::from_string(data).unwrap();
        assert_eq!(msg.ivalue_2, 100);
        assert_eq!(msg.jam_param(), Some(JamParam::DeletePlugin));
    }
    #[test]
    fn from_json_string_2() {
        let data = r#"
      {
          "param": "1",
          "iValue1": "1",
          "iValue2": "100",
          "fValue": "0.5",
          "sValue": "John Doe"
      }"#;
        let raw: serde_json::Value = serde_json::from_str(data).unwrap();
        let msg = ParamMessage::from_json(&raw).unwrap();
        assert_eq!(msg.ivalue_2, 100);
        assert_eq!(msg.fvalue, 0.5);
        assert_eq!(msg.jam_param(), Some(JamParam::SetTrackLevel));
    }
    #[test]
    fn integer_float_value() {
        let data = "{\"param\": 5, \"fValue\": 2}";
        let msg = ParamMessage::from_string(data).unwrap();
        assert_eq!(msg.fvalue, 2.0);
    }
    #[test]
    fn unknown_and_missing_params() {
        let msg = ParamMessage::from_string("{\"param\":1006,\"iValue1\":150}").unwrap();
        assert_eq!(msg.param, 1006);
        assert_eq!(msg.jam_param(), None);
        assert!(ParamMessage::from_string("{\"iValue1\":150}").is_err());
        assert!(ParamMessage::from_string("{\"param\":\"abc\"}").is_err());
    }
}
