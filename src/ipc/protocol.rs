//! Wire protocol types for the bridge
//!
//! All integers and floats are big-endian. There is no version field, so any
//! layout change is a breaking change for both peers.
//!
//! Wire format:
//! ```text
//! Command (agent -> game):
//!   [1 byte: key count (u8)]
//!   [key count * 2 bytes: key codes (i16)]
//!   [4 bytes: mouse dx (f32)]
//!   [4 bytes: mouse dy (f32)]
//!   [1 byte: mouse buttons (bit0 left, bit1 right, bit2 middle)]
//!   [4 bytes: scroll delta (f32)]
//!   [2 bytes: text length (u16)]
//!   [text length bytes: text (UTF-8)]
//!
//! Observation (game -> agent):
//!   [8 bytes: reward (f64)]
//!   [4 bytes: frame length (i32)]
//!   [frame length bytes: raw pixel data]
//! ```

use std::string::FromUtf8Error;

use thiserror::Error;

use crate::input::keys::KeyCode;

/// Size of a command with no keys and no text
pub const COMMAND_MIN_LEN: usize = 16;

/// Size of the observation header (reward + frame length)
pub const OBSERVATION_HEADER_LEN: usize = 12;

/// Bytes following the key count that do not depend on the text length:
/// mouse dx, mouse dy, buttons, scroll delta and text length.
const COMMAND_TAIL_LEN: usize = 4 + 4 + 1 + 4 + 2;

/// Errors produced while encoding or decoding wire messages
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("message truncated: needed {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    #[error("too many keys: {count} (max {max})")]
    TooManyKeys { count: usize, max: usize },

    #[error("text too long: {len} bytes (max {max})")]
    TextTooLong { len: usize, max: usize },

    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("negative frame length: {0}")]
    NegativeFrameLength(i32),

    #[error("invalid text UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
}

bitflags::bitflags! {
    /// Mouse button bitmask as carried on the wire
    ///
    /// Only the low three bits have a meaning. Unknown bits survive a
    /// decode/encode round trip but are ignored by the injector.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MouseButtons: u8 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const MIDDLE = 1 << 2;
    }
}

/// Upper bounds applied to length fields before any allocation happens
///
/// The wire format alone allows a peer to request up to 255 keys, 64 KiB of
/// text and 2 GiB of frame data per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolLimits {
    pub max_keys: usize,
    pub max_text_bytes: usize,
    pub max_frame_bytes: usize,
}

impl Default for ProtocolLimits {
    fn default() -> Self {
        Self {
            max_keys: 64,
            max_text_bytes: 1024,
            max_frame_bytes: 64 * 1024 * 1024,
        }
    }
}

impl ProtocolLimits {
    /// Limits equal to the width of each length field
    pub fn field_width() -> Self {
        Self {
            max_keys: u8::MAX as usize,
            max_text_bytes: u16::MAX as usize,
            max_frame_bytes: i32::MAX as usize,
        }
    }

    pub fn check_key_count(&self, count: usize) -> Result<(), ProtocolError> {
        if count > self.max_keys {
            return Err(ProtocolError::TooManyKeys {
                count,
                max: self.max_keys,
            });
        }
        Ok(())
    }

    pub fn check_text_len(&self, len: usize) -> Result<(), ProtocolError> {
        if len > self.max_text_bytes {
            return Err(ProtocolError::TextTooLong {
                len,
                max: self.max_text_bytes,
            });
        }
        Ok(())
    }

    pub fn check_frame_len(&self, len: usize) -> Result<(), ProtocolError> {
        if len > self.max_frame_bytes {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_frame_bytes,
            });
        }
        Ok(())
    }
}

/// Input for a single tick, sent by the agent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    /// Keys held during this tick, in the order the agent sent them
    pub keys: Vec<KeyCode>,
    pub mouse_dx: f32,
    pub mouse_dy: f32,
    pub mouse_buttons: MouseButtons,
    pub scroll_delta: f32,
    /// Text typed during this tick
    pub text: String,
}

/// Reward and raw frame for a single tick, sent to the agent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub reward: f64,
    pub frame: Vec<u8>,
}

impl Observation {
    pub fn new(reward: f64, frame: Vec<u8>) -> Self {
        Self { reward, frame }
    }
}

/// Number of bytes that follow the key count byte, excluding the text
pub const fn command_fixed_len(key_count: usize) -> usize {
    key_count * 2 + COMMAND_TAIL_LEN
}

/// Read the text length out of a command head
///
/// `head` is the key count byte followed by the fixed part, i.e. exactly
/// `1 + command_fixed_len(head[0])` bytes.
pub fn command_text_len(head: &[u8]) -> Result<usize, ProtocolError> {
    let needed = match head.first() {
        Some(&count) => 1 + command_fixed_len(count as usize),
        None => COMMAND_MIN_LEN,
    };
    if head.len() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            available: head.len(),
        });
    }
    Ok(u16::from_be_bytes([head[needed - 2], head[needed - 1]]) as usize)
}

/// Serialize a command to wire format
pub fn encode_command(command: &Command) -> Result<Vec<u8>, ProtocolError> {
    let field_width = ProtocolLimits::field_width();
    field_width.check_key_count(command.keys.len())?;
    field_width.check_text_len(command.text.len())?;

    let text = command.text.as_bytes();
    let mut buf = Vec::with_capacity(1 + command_fixed_len(command.keys.len()) + text.len());

    buf.push(command.keys.len() as u8);
    for key in &command.keys {
        buf.extend_from_slice(&key.to_be_bytes());
    }
    buf.extend_from_slice(&command.mouse_dx.to_be_bytes());
    buf.extend_from_slice(&command.mouse_dy.to_be_bytes());
    buf.push(command.mouse_buttons.bits());
    buf.extend_from_slice(&command.scroll_delta.to_be_bytes());
    buf.extend_from_slice(&(text.len() as u16).to_be_bytes());
    buf.extend_from_slice(text);

    Ok(buf)
}

/// Parse a complete command message
pub fn decode_command(data: &[u8], limits: &ProtocolLimits) -> Result<Command, ProtocolError> {
    let mut reader = Reader::new(data);

    let key_count = reader.u8()? as usize;
    limits.check_key_count(key_count)?;

    let mut keys = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        keys.push(reader.i16()?);
    }

    let mouse_dx = reader.f32()?;
    let mouse_dy = reader.f32()?;
    let mouse_buttons = MouseButtons::from_bits_retain(reader.u8()?);
    let scroll_delta = reader.f32()?;

    let text_len = reader.u16()? as usize;
    limits.check_text_len(text_len)?;
    let text = String::from_utf8(reader.take(text_len)?.to_vec())?;

    reader.finish()?;

    Ok(Command {
        keys,
        mouse_dx,
        mouse_dy,
        mouse_buttons,
        scroll_delta,
        text,
    })
}

/// Serialize an observation to wire format
pub fn encode_observation(observation: &Observation) -> Result<Vec<u8>, ProtocolError> {
    ProtocolLimits::field_width().check_frame_len(observation.frame.len())?;

    let mut buf = Vec::with_capacity(OBSERVATION_HEADER_LEN + observation.frame.len());
    buf.extend_from_slice(&observation.reward.to_be_bytes());
    buf.extend_from_slice(&(observation.frame.len() as i32).to_be_bytes());
    buf.extend_from_slice(&observation.frame);

    Ok(buf)
}

/// Parse an observation header, returning the reward and the frame length
pub fn decode_observation_header(
    header: &[u8; OBSERVATION_HEADER_LEN],
    limits: &ProtocolLimits,
) -> Result<(f64, usize), ProtocolError> {
    let mut reader = Reader::new(header);
    let reward = reader.f64()?;
    let frame_len = reader.i32()?;
    if frame_len < 0 {
        return Err(ProtocolError::NegativeFrameLength(frame_len));
    }
    let frame_len = frame_len as usize;
    limits.check_frame_len(frame_len)?;
    Ok((reward, frame_len))
}

/// Parse a complete observation message
pub fn decode_observation(
    data: &[u8],
    limits: &ProtocolLimits,
) -> Result<Observation, ProtocolError> {
    let mut reader = Reader::new(data);
    let header: [u8; OBSERVATION_HEADER_LEN] = reader.array()?;
    let (reward, frame_len) = decode_observation_header(&header, limits)?;
    let frame = reader.take(frame_len)?.to_vec();
    reader.finish()?;
    Ok(Observation { reward, frame })
}

/// Big-endian cursor over a received buffer
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let needed = self.pos.saturating_add(len);
        if needed > self.data.len() {
            return Err(ProtocolError::Truncated {
                needed,
                available: self.data.len(),
            });
        }
        let bytes = &self.data[self.pos..needed];
        self.pos = needed;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.array::<1>()?[0])
    }

    fn i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(i16::from_be_bytes(self.array()?))
    }

    fn u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32, ProtocolError> {
        Ok(f32::from_be_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64, ProtocolError> {
        Ok(f64::from_be_bytes(self.array()?))
    }

    fn finish(&self) -> Result<(), ProtocolError> {
        match self.data.len() - self.pos {
            0 => Ok(()),
            extra => Err(ProtocolError::TrailingBytes(extra)),
        }
    }
}
