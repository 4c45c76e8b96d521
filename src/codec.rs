// ABOUTME: Wire framing for the video sink: the one-shot codec header and the repeating
// ABOUTME: packet frame, encoded/decoded with `bytes`

use crate::packet::Packet;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;
use thiserror::Error;

/// Size in bytes of the codec header sent once per connection.
pub const CODEC_HEADER_SIZE: usize = 12;
/// Size in bytes of the header preceding every packet frame.
pub const FRAME_HEADER_SIZE: usize = 12;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("buffer holds {have} bytes, need {need}")]
    Incomplete { have: usize, need: usize },

    #[error("payload length {0} exceeds u32 range")]
    PayloadTooLarge(usize),
}

/// The 12-byte header sent once per connection, immediately after `accept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecHeader {
    pub codec_id: u32,
    pub width: u32,
    pub height: u32,
}

impl CodecHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(CODEC_HEADER_SIZE);
        buf.put_u32(self.codec_id);
        buf.put_u32(self.width);
        buf.put_u32(self.height);
    }

    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, FramingError> {
        if buf.remaining() < CODEC_HEADER_SIZE {
            return Err(FramingError::Incomplete {
                have: buf.remaining(),
                need: CODEC_HEADER_SIZE,
            });
        }
        Ok(CodecHeader {
            codec_id: buf.get_u32(),
            width: buf.get_u32(),
            height: buf.get_u32(),
        })
    }
}

/// The 12-byte header preceding every packet payload: `pts_flags` (8 bytes, big-endian) then
/// payload length (4 bytes, big-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub pts_flags: u64,
    pub length: u32,
}

impl FrameHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(FRAME_HEADER_SIZE);
        buf.put_u64(self.pts_flags);
        buf.put_u32(self.length);
    }

    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, FramingError> {
        if buf.remaining() < FRAME_HEADER_SIZE {
            return Err(FramingError::Incomplete {
                have: buf.remaining(),
                need: FRAME_HEADER_SIZE,
            });
        }
        Ok(FrameHeader {
            pts_flags: buf.get_u64(),
            length: buf.get_u32(),
        })
    }
}

/// Encode a packet's frame header followed by its payload into one contiguous buffer, ready
/// for a single `write_all`.
pub fn encode_packet_frame(packet: &Packet) -> Result<Bytes, FramingError> {
    let length: u32 = packet
        .payload
        .len()
        .try_into()
        .map_err(|_| FramingError::PayloadTooLarge(packet.payload.len()))?;

    let header = FrameHeader {
        pts_flags: packet.pts_flags(),
        length,
    };

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + packet.payload.len());
    header.encode(&mut buf);
    buf.extend_from_slice(&packet.payload);
    Ok(buf.freeze())
}

/// Encode the codec header for a connection.
pub fn encode_codec_header(codec_id: u32, width: u32, height: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(CODEC_HEADER_SIZE);
    CodecHeader {
        codec_id,
        width,
        height,
    }
    .encode(&mut buf);
    buf.freeze()
}
