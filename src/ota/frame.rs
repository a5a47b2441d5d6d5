//! OTA wire frames.
//!
//! The transport delivers postcard-encoded [`OtaMessage`]s; they are
//! decoded here into [`OtaCommand`]s before they reach the command
//! channel, so a malformed frame never touches a session.

use core::fmt;

use heapless::Vec;
use serde::{Deserialize, Serialize};

use super::{MAX_CHUNK_CAPACITY, OtaCommand, UpdateChunk};

/// Upper bound on an encoded frame.
pub const MAX_FRAME_LEN: usize = MAX_CHUNK_CAPACITY + 16;

/// Opens a download; `image_size` is the declared total, if known.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct OtaBeginPacket {
    pub image_size: Option<u32>,
}

/// One chunk of image data.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct OtaDataPacket {
    pub data: Vec<u8, MAX_CHUNK_CAPACITY>,
    pub last: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub enum OtaMessage {
    Begin(OtaBeginPacket),
    Data(OtaDataPacket),
}

impl From<OtaMessage> for OtaCommand {
    fn from(msg: OtaMessage) -> Self {
        match msg {
            OtaMessage::Begin(p) => OtaCommand::Start {
                image_size: p.image_size,
            },
            OtaMessage::Data(p) => OtaCommand::Chunk(UpdateChunk {
                data: p.data,
                last: p.last,
            }),
        }
    }
}

impl From<OtaCommand> for OtaMessage {
    fn from(cmd: OtaCommand) -> Self {
        match cmd {
            OtaCommand::Start { image_size } => OtaMessage::Begin(OtaBeginPacket { image_size }),
            OtaCommand::Chunk(c) => OtaMessage::Data(OtaDataPacket {
                data: c.data,
                last: c.last,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    Serialize,
    Deserialize,
    /// Bytes left over after a complete message.
    TrailingBytes,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialize => write!(f, "frame does not fit the output buffer"),
            Self::Deserialize => write!(f, "malformed OTA frame"),
            Self::TrailingBytes => write!(f, "trailing bytes after OTA frame"),
        }
    }
}

impl core::error::Error for FrameError {}

/// Encode `msg` into `buf`, returning the used prefix.
pub fn encode<'a>(msg: &OtaMessage, buf: &'a mut [u8]) -> Result<&'a mut [u8], FrameError> {
    postcard::to_slice(msg, buf).map_err(|_| FrameError::Serialize)
}

/// Decode exactly one frame into the command it carries.
pub fn decode(frame: &[u8]) -> Result<OtaCommand, FrameError> {
    let (msg, rest) = postcard::take_from_bytes::<OtaMessage>(frame).map_err(|_| FrameError::Deserialize)?;
    if !rest.is_empty() {
        return Err(FrameError::TrailingBytes);
    }
    Ok(msg.into())
}
