//! descriptions of the rooms and servers a jam session can join
use serde::{Deserialize, Serialize};
use std::fmt;

/// network address of a session server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub host: String,
    pub port: u16,
}

impl ServerDescriptor {
    pub fn new(host: &str, port: u16) -> ServerDescriptor {
        ServerDescriptor {
            host: String::from(host),
            port: port,
        }
    }
}

impl fmt::Display for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// a room as listed by the directory service
///
/// `stream_url` is the listen-only feed the room stream decoder plays when the
/// user previews a room without joining it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: i64,
    pub name: String,
    pub server: ServerDescriptor,
    pub stream_url: Option<String>,
}

impl RoomInfo {
    pub fn new(id: i64, name: &str, server: ServerDescriptor) -> RoomInfo {
        RoomInfo {
            id: id,
            name: String::from(name),
            server: server,
            stream_url: None,
        }
    }
    pub fn with_stream(mut self, url: &str) -> RoomInfo {
        self.stream_url = Some(String::from(url));
        self
    }
}

impl fmt::Display for RoomInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{ id: {}, name: {}, server: {} }}", self.id, self.name, self.server)
    }
}

#[cfg(test)]
mod test_room_info {
    use super::*;

    #[test]
    fn display_and_json() {
        let room = RoomInfo::new(7, "funk", ServerDescriptor::new("jam.example.com", 2049))
            .with_stream("http://jam.example.com/7.mp3");
        assert_eq!(format!("{}", room.server), "jam.example.com:2049");
        let j = serde_json::to_value(&room).unwrap();
        assert_eq!(j["server"]["port"], 2049);
        assert_eq!(j["stream_url"], "http://jam.example.com/7.mp3");
    }
}
