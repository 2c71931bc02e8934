// ABOUTME: Frames and deframes MMS packets: 2-byte ASCII marker, 2-byte little-endian length, payload
// ABOUTME: Never re-encodes a received packet; the raw wire image is what gets retransmitted downstream

use bytes::{Buf, Bytes};
use std::io::Cursor;
use thiserror::Error;

/// The marker byte pair that opens every MMS packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// `$H` - info packet, carries the pre-header + ASF metadata.
    Info,
    /// `$D` - media data.
    Data,
    /// `?D` - media data, alternate marker used by some origins.
    DataAlt,
    /// `$E` - end of stream.
    End,
    /// `$C` - changing media.
    ChangingMedia,
    /// `$M` - metadata.
    Metadata,
    /// `$P` - pair data.
    Pair,
}

impl Marker {
    fn from_bytes(bytes: [u8; 2]) -> Option<Marker> {
        match &bytes {
            b"$H" => Some(Marker::Info),
            b"$D" => Some(Marker::Data),
            b"?D" => Some(Marker::DataAlt),
            b"$E" => Some(Marker::End),
            b"$C" => Some(Marker::ChangingMedia),
            b"$M" => Some(Marker::Metadata),
            b"$P" => Some(Marker::Pair),
            _ => None,
        }
    }

    fn to_bytes(self) -> [u8; 2] {
        match self {
            Marker::Info => *b"$H",
            Marker::Data => *b"$D",
            Marker::DataAlt => *b"?D",
            Marker::End => *b"$E",
            Marker::ChangingMedia => *b"$C",
            Marker::Metadata => *b"$M",
            Marker::Pair => *b"$P",
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("incomplete packet: need more data")]
    Incomplete,

    #[error("unrecognized marker {0:?}")]
    UnknownMarker([u8; 2]),
}

/// One framed MMS packet.
///
/// `raw` holds the exact wire bytes (marker + length + payload) as received;
/// it is what the downstream server retransmits, never `payload` re-encoded.
#[derive(Debug, Clone)]
pub struct Packet {
    pub marker: Marker,
    pub payload: Bytes,
    pub raw: Bytes,
}

impl Packet {
    pub fn new(marker: Marker, payload: Bytes) -> Packet {
        let mut raw = Vec::with_capacity(4 + payload.len());
        raw.extend_from_slice(&marker.to_bytes());
        raw.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        raw.extend_from_slice(&payload);
        Packet {
            marker,
            payload,
            raw: Bytes::from(raw),
        }
    }

    pub fn is_info(&self) -> bool {
        self.marker == Marker::Info
    }

    pub fn is_last(&self) -> bool {
        self.marker == Marker::End
    }

    pub fn raw_bytes(&self) -> &Bytes {
        &self.raw
    }
}

/// Checks whether `buf` holds a complete packet without allocating.
///
/// Mirrors the check/parse split used elsewhere in this crate's frame handling:
/// callers probe with `check`, and only call `decode_one` once enough bytes exist.
pub fn check(buf: &mut Cursor<&[u8]>) -> Result<(), CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::Incomplete);
    }
    let mut marker_bytes = [0u8; 2];
    buf.copy_to_slice(&mut marker_bytes);
    let len = buf.get_u16_le() as usize;
    if buf.remaining() < len {
        return Err(CodecError::Incomplete);
    }
    Ok(())
}

/// Decodes a single packet from the front of `buf`, advancing the cursor past it.
///
/// Returns `Err(CodecError::Incomplete)` if the buffer doesn't yet hold a full
/// packet; the caller should read more bytes and retry.
pub fn decode_one(buf: &mut Cursor<&[u8]>) -> Result<Packet, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::Incomplete);
    }
    let mut marker_bytes = [0u8; 2];
    buf.copy_to_slice(&mut marker_bytes);
    let len = buf.get_u16_le() as usize;
    if buf.remaining() < len {
        return Err(CodecError::Incomplete);
    }
    let marker = Marker::from_bytes(marker_bytes).ok_or(CodecError::UnknownMarker(marker_bytes))?;
    let mut payload = vec![0u8; len];
    buf.copy_to_slice(&mut payload);
    Ok(Packet::new(marker, Bytes::from(payload)))
}

/// The first `$H` packet of a session: an 8-byte MMS pre-header followed by an ASF header block.
pub struct InfoPacket {
    pub packet: Packet,
    pub metadata: crate::asf::AsfMetadata,
}

const PRE_HEADER_LEN: usize = 8;

impl InfoPacket {
    pub fn from_packet(packet: Packet) -> InfoPacket {
        let asf_bytes = if packet.payload.len() > PRE_HEADER_LEN {
            &packet.payload[PRE_HEADER_LEN..]
        } else {
            &packet.payload[..0]
        };
        let metadata = crate::asf::parse(asf_bytes);
        InfoPacket { packet, metadata }
    }

    pub fn raw_bytes(&self) -> &Bytes {
        &self.packet.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_raw_bytes_and_marker() {
        let packet = Packet::new(Marker::Data, Bytes::from_static(b"hello"));
        let raw = packet.raw_bytes().clone();

        let mut cursor = Cursor::new(&raw[..]);
        let decoded = decode_one(&mut cursor).expect("decode");

        assert_eq!(decoded.marker, Marker::Data);
        assert_eq!(decoded.raw, packet.raw);
        assert_eq!(decoded.payload, Bytes::from_static(b"hello"));
    }

    #[test]
    fn incomplete_buffer_reports_incomplete() {
        let raw = [b'$', b'D', 0x05, 0x00, 1, 2]; // says 5 bytes payload, only has 2
        let mut cursor = Cursor::new(&raw[..]);
        assert!(matches!(decode_one(&mut cursor), Err(CodecError::Incomplete)));
    }

    #[test]
    fn unknown_marker_is_rejected() {
        let raw = [b'X', b'X', 0x00, 0x00];
        let mut cursor = Cursor::new(&raw[..]);
        assert!(matches!(decode_one(&mut cursor), Err(CodecError::UnknownMarker(_))));
    }

    #[test]
    fn end_marker_is_recognized_as_last() {
        let packet = Packet::new(Marker::End, Bytes::new());
        assert!(packet.is_last());
        assert!(!packet.is_info());
    }

    #[test]
    fn info_packet_skips_pre_header_before_asf_parsing() {
        let mut payload = vec![0u8; PRE_HEADER_LEN];
        payload.extend_from_slice(&[0xAAu8; 16]); // garbage GUID, no crash expected
        payload.extend_from_slice(&24u64.to_le_bytes());
        let packet = Packet::new(Marker::Info, Bytes::from(payload));
        let info = InfoPacket::from_packet(packet);
        assert!(info.metadata.media_info.is_empty());
    }
}
