//! Wire codec for the control-plane frames: big-endian integers, length-prefixed
//! strings, one-byte type tags. See SPEC_FULL.md §4.1 for the exact layouts.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{RadioError, Result};

const TAG_HELLO: u8 = 0x00;
const TAG_SET_STATION: u8 = 0x01;
const TAG_GET_STATION_SONGS: u8 = 0x02;

const TAG_WELCOME: u8 = 0x00;
const TAG_ANNOUNCE: u8 = 0x01;
const TAG_INVALID: u8 = 0x02;
const TAG_SONGS_LIST: u8 = 0x03;
const TAG_NEW_STATION: u8 = 0x04;
const TAG_STATION_SHUTDOWN: u8 = 0x05;

/// A command sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Hello { udp_port: u16 },
    SetStation { station_index: u16 },
    GetStationSongs { station_index: u16 },
}

/// A reply sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Welcome { num_stations: u16 },
    Announce { song_name: String },
    Invalid { message: String },
    SongsList { songs: Vec<String> },
    NewStation { station_index: u16, num_stations: u16 },
    StationShutdown { station_index: u16, num_stations: u16 },
}

fn check_len(s: &str, max: usize, field: &str) -> Result<()> {
    if s.len() > max {
        return Err(RadioError::Encode(format!(
            "{field} length {} exceeds max {max}",
            s.len()
        )));
    }
    Ok(())
}

impl Reply {
    /// Encode this reply into its exact wire representation.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        match self {
            Reply::Welcome { num_stations } => {
                buf.put_u8(TAG_WELCOME);
                buf.put_u16(*num_stations);
            }
            Reply::Announce { song_name } => {
                check_len(song_name, u8::MAX as usize, "song name")?;
                buf.put_u8(TAG_ANNOUNCE);
                buf.put_u8(song_name.len() as u8);
                buf.put_slice(song_name.as_bytes());
            }
            Reply::Invalid { message } => {
                check_len(message, u8::MAX as usize, "invalid message")?;
                buf.put_u8(TAG_INVALID);
                buf.put_u8(message.len() as u8);
                buf.put_slice(message.as_bytes());
            }
            Reply::SongsList { songs } => {
                let body = songs.join(",");
                check_len(&body, u16::MAX as usize, "songs list")?;
                buf.put_u8(TAG_SONGS_LIST);
                buf.put_u16(body.len() as u16);
                buf.put_slice(body.as_bytes());
            }
            Reply::NewStation {
                station_index,
                num_stations,
            } => {
                buf.put_u8(TAG_NEW_STATION);
                buf.put_u16(*station_index);
                buf.put_u16(*num_stations);
            }
            Reply::StationShutdown {
                station_index,
                num_stations,
            } => {
                buf.put_u8(TAG_STATION_SHUTDOWN);
                buf.put_u16(*station_index);
                buf.put_u16(*num_stations);
            }
        }
        Ok(buf.freeze())
    }

    /// Decode a reply from a buffer holding exactly one frame's worth of bytes
    /// (or more — trailing bytes are ignored by the caller's framing).
    pub fn decode(buf: &[u8]) -> Result<Reply> {
        let mut cur = buf;
        if cur.is_empty() {
            return Err(RadioError::Decode("empty buffer".into()));
        }
        let tag = cur.get_u8();
        match tag {
            TAG_WELCOME => {
                require(cur.len() >= 2, "truncated WELCOME")?;
                Ok(Reply::Welcome {
                    num_stations: cur.get_u16(),
                })
            }
            TAG_ANNOUNCE => {
                require(!cur.is_empty(), "truncated ANNOUNCE")?;
                let len = cur.get_u8() as usize;
                require(cur.len() >= len, "truncated ANNOUNCE name")?;
                let name = String::from_utf8_lossy(&cur[..len]).into_owned();
                Ok(Reply::Announce { song_name: name })
            }
            TAG_INVALID => {
                require(!cur.is_empty(), "truncated INVALID")?;
                let len = cur.get_u8() as usize;
                require(cur.len() >= len, "truncated INVALID message")?;
                let message = String::from_utf8_lossy(&cur[..len]).into_owned();
                Ok(Reply::Invalid { message })
            }
            TAG_SONGS_LIST => {
                require(cur.len() >= 2, "truncated SONGS_LIST")?;
                let len = cur.get_u16() as usize;
                require(cur.len() >= len, "truncated SONGS_LIST body")?;
                let body = String::from_utf8_lossy(&cur[..len]).into_owned();
                let songs = if body.is_empty() {
                    Vec::new()
                } else {
                    body.split(',').map(str::to_owned).collect()
                };
                Ok(Reply::SongsList { songs })
            }
            TAG_NEW_STATION => {
                require(cur.len() >= 4, "truncated NEW_STATION")?;
                let station_index = cur.get_u16();
                let num_stations = cur.get_u16();
                Ok(Reply::NewStation {
                    station_index,
                    num_stations,
                })
            }
            TAG_STATION_SHUTDOWN => {
                require(cur.len() >= 4, "truncated STATION_SHUTDOWN")?;
                let station_index = cur.get_u16();
                let num_stations = cur.get_u16();
                Ok(Reply::StationShutdown {
                    station_index,
                    num_stations,
                })
            }
            other => Err(RadioError::Decode(format!("unknown reply tag {other}"))),
        }
    }
}

impl Command {
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        match self {
            Command::Hello { udp_port } => {
                buf.put_u8(TAG_HELLO);
                buf.put_u16(*udp_port);
            }
            Command::SetStation { station_index } => {
                buf.put_u8(TAG_SET_STATION);
                buf.put_u16(*station_index);
            }
            Command::GetStationSongs { station_index } => {
                buf.put_u8(TAG_GET_STATION_SONGS);
                buf.put_u16(*station_index);
            }
        }
        Ok(buf.freeze())
    }

    /// Decode a command frame. `extended` gates whether `GET_STATION_SONGS` is recognized;
    /// in base mode it is reported the same as any other unrecognized tag.
    pub fn decode(buf: &[u8], extended: bool) -> Result<Command> {
        let mut cur = buf;
        if cur.is_empty() {
            return Err(RadioError::Decode("empty buffer".into()));
        }
        let tag = cur.get_u8();
        match tag {
            TAG_HELLO => {
                require(cur.len() >= 2, "truncated HELLO")?;
                Ok(Command::Hello {
                    udp_port: cur.get_u16(),
                })
            }
            TAG_SET_STATION => {
                require(cur.len() >= 2, "truncated SET_STATION")?;
                Ok(Command::SetStation {
                    station_index: cur.get_u16(),
                })
            }
            TAG_GET_STATION_SONGS if extended => {
                require(cur.len() >= 2, "truncated GET_STATION_SONGS")?;
                Ok(Command::GetStationSongs {
                    station_index: cur.get_u16(),
                })
            }
            other => Err(RadioError::Decode(format!(
                "command {other} not recognized"
            ))),
        }
    }

    /// The numeric tag for this command, used in error messages
    /// ("command N not recognized").
    pub fn tag(buf: &[u8]) -> Option<u8> {
        buf.first().copied()
    }
}

fn require(cond: bool, msg: &str) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(RadioError::Decode(msg.to_string()))
    }
}
