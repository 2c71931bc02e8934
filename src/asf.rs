// ABOUTME: Parses ASF (Advanced Systems Format) header objects out of an MMS info packet payload
// ABOUTME: Produces a media-info map (title/author/...) and an extended-info map of typed descriptors

use bytes::Buf;
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;

const HEADER_GUID: [u8; 16] = [
    0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11, 0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C,
];
const CONTENT_DESCRIPTION_GUID: [u8; 16] = [
    0x33, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11, 0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C,
];
const EXTENDED_CONTENT_DESCRIPTION_GUID: [u8; 16] = [
    0x40, 0xA4, 0xD0, 0xD2, 0x07, 0xE3, 0xD2, 0x11, 0x97, 0xF0, 0x00, 0xA0, 0xC9, 0x5E, 0xA8, 0x50,
];

/// A value pulled out of an extended content description descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtValue {
    Str(String),
    Bytes(Vec<u8>),
    Bool(bool),
    U32(u32),
    U64(u64),
    U16(u16),
}

impl ExtValue {
    fn render(&self) -> String {
        match self {
            ExtValue::Str(s) => s.clone(),
            ExtValue::Bytes(b) => format!("{b:?}"),
            ExtValue::Bool(b) => b.to_string(),
            ExtValue::U32(v) => v.to_string(),
            ExtValue::U64(v) => v.to_string(),
            ExtValue::U16(v) => v.to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct AsfMetadata {
    pub media_info: HashMap<String, String>,
    pub ext_info: HashMap<String, ExtValue>,
}

/// Reached the end of the buffer while an object header or body was still expected.
///
/// The caller treats this as "parsing stops here" rather than a fatal error: whatever
/// was recovered before the short read is kept.
#[derive(Debug, Error)]
#[error("unexpected end of ASF stream")]
pub struct UnexpectedEof;

/// Parses as many top-level ASF objects as the buffer holds, merging their contents.
///
/// A short read anywhere stops parsing and returns whatever was recovered so far;
/// this mirrors an MMS info packet whose ASF header may be truncated.
pub fn parse(data: &[u8]) -> AsfMetadata {
    let mut cursor = Cursor::new(data);
    let mut metadata = AsfMetadata::default();
    while cursor.remaining() > 0 {
        if read_object(&mut cursor, &mut metadata).is_err() {
            break;
        }
    }
    metadata
}

fn read_object(cursor: &mut Cursor<&[u8]>, metadata: &mut AsfMetadata) -> Result<(), UnexpectedEof> {
    if cursor.remaining() < 24 {
        return Err(UnexpectedEof);
    }
    let mut guid = [0u8; 16];
    cursor.copy_to_slice(&mut guid);
    let size = cursor.get_u64_le();
    let body_len = size.saturating_sub(24) as usize;

    if cursor.remaining() < body_len {
        return Err(UnexpectedEof);
    }
    let body_start = cursor.position() as usize;
    let body_end = body_start + body_len;
    let body = &cursor.get_ref()[body_start..body_end];
    let mut body_cursor = Cursor::new(body);

    match guid {
        HEADER_GUID => read_header_object(&mut body_cursor, metadata)?,
        CONTENT_DESCRIPTION_GUID => read_content_description(&mut body_cursor, metadata)?,
        EXTENDED_CONTENT_DESCRIPTION_GUID => read_extended_content_description(&mut body_cursor, metadata)?,
        _ => {}
    }

    cursor.set_position(body_end as u64);
    Ok(())
}

fn read_header_object(cursor: &mut Cursor<&[u8]>, metadata: &mut AsfMetadata) -> Result<(), UnexpectedEof> {
    if cursor.remaining() < 6 {
        return Err(UnexpectedEof);
    }
    let object_count = cursor.get_u32_le();
    cursor.advance(2); // reserved1, reserved2

    for _ in 0..object_count {
        read_object(cursor, metadata)?;
    }
    Ok(())
}

fn read_utf16le_string(cursor: &mut Cursor<&[u8]>, byte_len: usize) -> Result<String, UnexpectedEof> {
    if cursor.remaining() < byte_len {
        return Err(UnexpectedEof);
    }
    let mut units = Vec::with_capacity(byte_len / 2);
    let mut remaining = byte_len;
    while remaining >= 2 {
        units.push(cursor.get_u16_le());
        remaining -= 2;
    }
    if remaining == 1 {
        cursor.advance(1);
    }
    while units.last() == Some(&0) {
        units.pop();
    }
    Ok(String::from_utf16_lossy(&units))
}

fn read_content_description(cursor: &mut Cursor<&[u8]>, metadata: &mut AsfMetadata) -> Result<(), UnexpectedEof> {
    if cursor.remaining() < 10 {
        return Err(UnexpectedEof);
    }
    let lengths = [
        cursor.get_u16_le(),
        cursor.get_u16_le(),
        cursor.get_u16_le(),
        cursor.get_u16_le(),
        cursor.get_u16_le(),
    ];
    let keys = ["title", "author", "copyright", "description", "rating"];

    for (key, len) in keys.iter().zip(lengths) {
        if len == 0 {
            continue;
        }
        let value = read_utf16le_string(cursor, len as usize)?;
        metadata.media_info.insert(key.to_string(), value);
    }
    Ok(())
}

fn read_extended_content_description(
    cursor: &mut Cursor<&[u8]>,
    metadata: &mut AsfMetadata,
) -> Result<(), UnexpectedEof> {
    if cursor.remaining() < 2 {
        return Err(UnexpectedEof);
    }
    let descriptor_count = cursor.get_u16_le();

    for _ in 0..descriptor_count {
        if cursor.remaining() < 2 {
            return Err(UnexpectedEof);
        }
        let name_len = cursor.get_u16_le();
        let name = read_utf16le_string(cursor, name_len as usize)?;

        if cursor.remaining() < 4 {
            return Err(UnexpectedEof);
        }
        let desc_type = cursor.get_u16_le();
        let value_len = cursor.get_u16_le() as usize;
        if cursor.remaining() < value_len {
            return Err(UnexpectedEof);
        }

        let value = match desc_type {
            0 => ExtValue::Str(read_utf16le_string(cursor, value_len)?),
            2 if value_len >= 4 => ExtValue::Bool(cursor.get_u32_le() != 0),
            3 if value_len >= 4 => ExtValue::U32(cursor.get_u32_le()),
            4 if value_len >= 8 => ExtValue::U64(cursor.get_u64_le()),
            5 if value_len >= 2 => ExtValue::U16(cursor.get_u16_le()),
            _ => {
                let mut buf = vec![0u8; value_len];
                cursor.copy_to_slice(&mut buf);
                ExtValue::Bytes(buf)
            }
        };

        if name == "WM/ParentalRating" {
            metadata.media_info.insert("rating".to_string(), value.render());
        }
        metadata.ext_info.insert(name, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le_bytes(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    fn object(guid: [u8; 16], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&guid);
        out.extend_from_slice(&((body.len() + 24) as u64).to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn content_description_yields_five_entries_in_order() {
        let title = utf16le_bytes("T");
        let author = utf16le_bytes("A");
        let copyright = utf16le_bytes("C");
        let description = utf16le_bytes("D");
        let rating = utf16le_bytes("R");

        let mut body = Vec::new();
        for s in [&title, &author, &copyright, &description, &rating] {
            body.extend_from_slice(&(s.len() as u16).to_le_bytes());
        }
        for s in [&title, &author, &copyright, &description, &rating] {
            body.extend_from_slice(s);
        }

        let mut header_body = Vec::new();
        header_body.extend_from_slice(&1u32.to_le_bytes());
        header_body.extend_from_slice(&[0u8, 0u8]);
        header_body.extend_from_slice(&object(CONTENT_DESCRIPTION_GUID, &body));

        let data = object(HEADER_GUID, &header_body);
        let metadata = parse(&data);

        assert_eq!(metadata.media_info.get("title").map(String::as_str), Some("T"));
        assert_eq!(metadata.media_info.get("author").map(String::as_str), Some("A"));
        assert_eq!(metadata.media_info.get("copyright").map(String::as_str), Some("C"));
        assert_eq!(metadata.media_info.get("description").map(String::as_str), Some("D"));
        assert_eq!(metadata.media_info.get("rating").map(String::as_str), Some("R"));
        assert_eq!(metadata.media_info.len(), 5);
    }

    #[test]
    fn zero_length_content_description_fields_are_omitted() {
        let body = [0u8; 10]; // five zero lengths
        let mut header_body = Vec::new();
        header_body.extend_from_slice(&1u32.to_le_bytes());
        header_body.extend_from_slice(&[0u8, 0u8]);
        header_body.extend_from_slice(&object(CONTENT_DESCRIPTION_GUID, &body));

        let data = object(HEADER_GUID, &header_body);
        let metadata = parse(&data);
        assert!(metadata.media_info.is_empty());
    }

    #[test]
    fn extended_content_description_exposes_parental_rating() {
        let name = utf16le_bytes("WM/ParentalRating");
        let mut descriptor = Vec::new();
        descriptor.extend_from_slice(&(name.len() as u16).to_le_bytes());
        descriptor.extend_from_slice(&name);
        descriptor.extend_from_slice(&3u16.to_le_bytes()); // type 3 = u32
        descriptor.extend_from_slice(&4u16.to_le_bytes()); // value_len
        descriptor.extend_from_slice(&7u32.to_le_bytes());

        let mut ext_body = Vec::new();
        ext_body.extend_from_slice(&1u16.to_le_bytes());
        ext_body.extend_from_slice(&descriptor);

        let mut header_body = Vec::new();
        header_body.extend_from_slice(&1u32.to_le_bytes());
        header_body.extend_from_slice(&[0u8, 0u8]);
        header_body.extend_from_slice(&object(EXTENDED_CONTENT_DESCRIPTION_GUID, &ext_body));

        let data = object(HEADER_GUID, &header_body);
        let metadata = parse(&data);

        assert_eq!(metadata.media_info.get("rating").map(String::as_str), Some("7"));
        assert_eq!(
            metadata.ext_info.get("WM/ParentalRating"),
            Some(&ExtValue::U32(7))
        );
    }

    #[test]
    fn truncated_stream_stops_without_panicking() {
        let data = [0x30, 0x26, 0xB2, 0x75]; // guid alone, no length
        let metadata = parse(&data);
        assert!(metadata.media_info.is_empty());
    }

    #[test]
    fn unknown_object_is_skipped() {
        let unknown_guid = [0xAAu8; 16];
        let mut data = object(unknown_guid, &[1, 2, 3, 4]);
        data.extend_from_slice(&object(
            CONTENT_DESCRIPTION_GUID,
            &[0u8; 10], // five zero-length fields, nothing to parse but proves we kept going
        ));
        let metadata = parse(&data);
        assert!(metadata.media_info.is_empty());
    }
}
