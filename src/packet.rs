// ABOUTME: Wire-agnostic packet model shared by the video sink: codec identity and the
// ABOUTME: PTS/keyframe/config flags that the framing layer in `codec` turns into bytes

use bytes::Bytes;
use num_enum::TryFromPrimitive;

/// Upper 2 bits of the 64-bit `pts_flags` field are reserved for flags; the rest carry the PTS.
pub const PTS_BITS: u32 = 62;
pub const PTS_MASK: u64 = (1u64 << PTS_BITS) - 1;

/// Set when the packet carries no timestamp (a config / parameter-set packet).
pub const FLAG_CONFIG: u64 = 1 << 63;
/// Set on packets flagged as keyframes. Never set together with `FLAG_CONFIG`.
pub const FLAG_KEY_FRAME: u64 = 1 << 62;

/// The two codecs this sink understands. Encoded on the wire as the ASCII tag of their name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    H265,
}

impl Codec {
    /// The big-endian 32-bit tag sent as the first word of the codec header.
    pub fn wire_tag(self) -> u32 {
        match self {
            Codec::H264 => 0x6832_3634, // "h264"
            Codec::H265 => 0x6832_3635, // "h265"
        }
    }
}

/// The codec identifiers the upstream demuxer may report via `open`. Only `H264` and `Hevc`
/// are supported by this sink; every other value is a valid upstream codec that this consumer
/// simply does not implement, and `open` must reject it.
///
/// The concrete numeric values mirror a codec library's own codec-id enumeration: stable,
/// externally defined constants this crate does not own. They exist here only so `open` can
/// accept a raw `u32` from the demuxer and validate it with `TryFrom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum UpstreamCodecId {
    H264 = 27,
    Hevc = 173,
}

impl From<UpstreamCodecId> for Codec {
    fn from(id: UpstreamCodecId) -> Self {
        match id {
            UpstreamCodecId::H264 => Codec::H264,
            UpstreamCodecId::Hevc => Codec::H265,
        }
    }
}

/// An owned, independently-refcounted encoded packet.
///
/// `payload` uses `bytes::Bytes`, whose `clone` is a refcount bump over a shared buffer rather
/// than a copy. That is deliberately the same operation a codec library's own packet-ref
/// primitive performs: cheap, and safe here because encoded bitstream payloads are immutable
/// once produced.
#[derive(Debug, Clone)]
pub struct Packet {
    pub payload: Bytes,
    /// `None` means "no presentation timestamp" — the config/parameter-set sentinel.
    pub pts: Option<u64>,
    pub keyframe: bool,
}

impl Packet {
    pub fn config(payload: impl Into<Bytes>) -> Self {
        Packet {
            payload: payload.into(),
            pts: None,
            keyframe: false,
        }
    }

    pub fn frame(payload: impl Into<Bytes>, pts: u64, keyframe: bool) -> Self {
        Packet {
            payload: payload.into(),
            pts: Some(pts),
            keyframe,
        }
    }

    pub fn is_config(&self) -> bool {
        self.pts.is_none()
    }

    /// The 64-bit `pts_flags` word this packet occupies on the wire.
    ///
    /// PTS values that would collide with the two reserved flag bits are masked down to 62
    /// bits rather than rejected (see `DESIGN.md`, "PTS/flag-bit collision"): the field is an
    /// opaque, monotonically-useful timestamp to the client, not an identifier that must
    /// round-trip exactly, and masking keeps `push` infallible for any `u64` timestamp the
    /// upstream pipeline hands us.
    pub fn pts_flags(&self) -> u64 {
        match self.pts {
            None => FLAG_CONFIG,
            Some(pts) => {
                let mut flags = pts & PTS_MASK;
                if self.keyframe {
                    flags |= FLAG_KEY_FRAME;
                }
                flags
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_wire_tags_match_ascii() {
        assert_eq!(Codec::H264.wire_tag(), u32::from_be_bytes(*b"h264"));
        assert_eq!(Codec::H265.wire_tag(), u32::from_be_bytes(*b"h265"));
    }

    #[test]
    fn upstream_codec_id_rejects_unknown_values() {
        assert!(UpstreamCodecId::try_from(99u32).is_err());
        assert_eq!(UpstreamCodecId::try_from(27u32).unwrap(), UpstreamCodecId::H264);
    }

    #[test]
    fn config_packet_flags_are_exactly_the_config_bit() {
        let pkt = Packet::config(&b"\x00\x00\x00\x01\x67"[..]);
        assert_eq!(pkt.pts_flags(), FLAG_CONFIG);
        assert!(pkt.is_config());
    }

    #[test]
    fn keyframe_flags_carry_pts_and_key_bit() {
        let pkt = Packet::frame(&b"abc"[..], 1000, true);
        assert_eq!(pkt.pts_flags(), FLAG_KEY_FRAME | 1000);
        assert!(!pkt.is_config());
    }

    #[test]
    fn non_key_frame_carries_only_pts() {
        let pkt = Packet::frame(&b"abc"[..], 2000, false);
        assert_eq!(pkt.pts_flags(), 2000);
    }

    #[test]
    fn pts_colliding_with_flag_bits_is_masked_not_rejected() {
        let huge = u64::MAX; // all bits set, including both flag bits
        let pkt = Packet::frame(&b"x"[..], huge, false);
        assert_eq!(pkt.pts_flags(), PTS_MASK);
        assert_eq!(pkt.pts_flags() & FLAG_CONFIG, 0);
    }
}
