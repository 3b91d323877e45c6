//! BER-TLV Parser
//!
//! Parses the BER-TLV subset used by OpenPGP cards: one or two byte tags and
//! lengths in short form or the `81 xx` / `82 xx xx` extended forms.

use thiserror::Error;

/// Errors that can occur during TLV parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TLVError {
    #[error("Unexpected end of data while parsing tag")]
    UnexpectedEndTag,

    #[error("Unexpected end of data while parsing length")]
    UnexpectedEndLength,

    #[error("Unexpected end of data while parsing value")]
    UnexpectedEndValue,

    #[error("Indefinite length encoding is not supported")]
    InvalidLength,

    /// Extended length forms beyond `82 xx xx`
    #[error("Length encoded on {0} bytes, at most 2 supported")]
    LengthTooLong(usize),

    #[error("Only two bytes for tags supported")]
    TagTooLong,
}

/// A TLV (Tag-Length-Value) structure
///
/// `subs` holds the parsed children of constructed tags when parsing
/// recursively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TLV {
    /// The tag (1 or 2 bytes)
    pub tag: u16,
    /// The raw value bytes
    pub value: Vec<u8>,
    /// Child TLVs if this is a constructed tag
    pub subs: Vec<TLV>,
}

impl TLV {
    pub fn new(tag: u16, value: Vec<u8>) -> Self {
        Self {
            tag,
            value,
            subs: Vec::new(),
        }
    }

    /// Check if this is a constructed (container) tag based on the tag bits
    pub fn is_constructed(&self) -> bool {
        (first_tag_byte(self.tag) & 0x20) != 0
    }

    /// Depth-first search for a tag
    pub fn find(&self, tag: u16) -> Option<&TLV> {
        if self.tag == tag {
            return Some(self);
        }
        self.subs.iter().find_map(|child| child.find(tag))
    }

    /// Find a direct child by tag
    pub fn find_child(&self, tag: u16) -> Option<&TLV> {
        self.subs.iter().find(|c| c.tag == tag)
    }
}

fn first_tag_byte(tag: u16) -> u8 {
    if tag > 0xFF {
        (tag >> 8) as u8
    } else {
        tag as u8
    }
}

/// Parse a sequence of TLVs, stopping at the first malformed element.
///
/// Filler bytes (`00`, `FF`) between elements are skipped.
pub fn read_list(data: &[u8], recursive: bool) -> Vec<TLV> {
    let mut result = Vec::new();
    let mut remaining = data;

    while let Some(&first) = remaining.first() {
        if first == 0x00 || first == 0xFF {
            remaining = &remaining[1..];
            continue;
        }
        match read_single(remaining, recursive) {
            Ok((tlv, rest)) => {
                result.push(tlv);
                remaining = rest;
            }
            Err(_) => break,
        }
    }

    result
}

/// Parse a single TLV and return it with the unparsed remainder
pub fn read_single(data: &[u8], recursive: bool) -> Result<(TLV, &[u8]), TLVError> {
    let (tag, tag_len) = parse_tag(data)?;
    let (length, len_len) = parse_length(&data[tag_len..])?;

    let start = tag_len + len_len;
    let end = start + length;
    if end > data.len() {
        return Err(TLVError::UnexpectedEndValue);
    }
    let value = data[start..end].to_vec();

    let subs = if recursive && (first_tag_byte(tag) & 0x20) != 0 && !value.is_empty() {
        read_list(&value, true)
    } else {
        Vec::new()
    };

    Ok((TLV { tag, value, subs }, &data[end..]))
}

/// Parse a BER tag of one or two bytes, returning the tag and its size.
pub fn parse_tag(data: &[u8]) -> Result<(u16, usize), TLVError> {
    let first = *data.first().ok_or(TLVError::UnexpectedEndTag)?;

    if (first & 0x1F) != 0x1F {
        return Ok((first as u16, 1));
    }

    let second = *data.get(1).ok_or(TLVError::UnexpectedEndTag)?;
    if (second & 0x80) != 0 {
        return Err(TLVError::TagTooLong);
    }
    Ok((((first as u16) << 8) | second as u16, 2))
}

/// Parse a BER length, returning the length and its encoded size.
pub fn parse_length(data: &[u8]) -> Result<(usize, usize), TLVError> {
    let first = *data.first().ok_or(TLVError::UnexpectedEndLength)?;

    match first {
        0x00..=0x7F => Ok((first as usize, 1)),
        0x80 => Err(TLVError::InvalidLength),
        0x81 => {
            let b = *data.get(1).ok_or(TLVError::UnexpectedEndLength)?;
            Ok((b as usize, 2))
        }
        0x82 => {
            if data.len() < 3 {
                return Err(TLVError::UnexpectedEndLength);
            }
            Ok((((data[1] as usize) << 8) | data[2] as usize, 3))
        }
        _ => Err(TLVError::LengthTooLong((first & 0x7F) as usize)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_tlv() {
        let data = hex::decode("4F06D27600012401").unwrap();
        let tlvs = read_list(&data, true);
        assert_eq!(tlvs.len(), 1);
        assert_eq!(tlvs[0].tag, 0x4F);
        assert_eq!(tlvs[0].value, hex::decode("D27600012401").unwrap());
    }

    #[test]
    fn test_two_byte_tag() {
        let data = hex::decode("5F2D02656E").unwrap();
        let (tlv, rest) = read_single(&data, false).unwrap();
        assert_eq!(tlv.tag, 0x5F2D);
        assert_eq!(tlv.value, b"en");
        assert!(rest.is_empty());
    }

    #[test]
    fn test_constructed_children() {
        // 6E { 73 { C4 07 ... } }
        let data = hex::decode("6E0B7309C407010C0C0C030003").unwrap();
        let tlvs = read_list(&data, true);
        assert!(tlvs[0].is_constructed());
        let c4 = tlvs[0].find(0xC4).unwrap();
        assert_eq!(c4.value, hex::decode("010C0C0C030003").unwrap());
        assert!(tlvs[0].find_child(0xC4).is_none());
        assert!(tlvs[0].find_child(0x73).is_some());
    }

    #[test]
    fn test_extended_lengths() {
        assert_eq!(parse_length(&[0x81, 0x80]), Ok((0x80, 2)));
        assert_eq!(parse_length(&[0x82, 0x01, 0x00]), Ok((0x100, 3)));
        assert_eq!(parse_length(&[0x83, 0x01, 0x00, 0x00]), Err(TLVError::LengthTooLong(3)));
        assert_eq!(parse_length(&[0x80]), Err(TLVError::InvalidLength));
        assert_eq!(parse_length(&[0x82, 0x01]), Err(TLVError::UnexpectedEndLength));
    }

    #[test]
    fn test_three_byte_tag_rejected() {
        assert_eq!(parse_tag(&[0x9F, 0x81, 0x01]), Err(TLVError::TagTooLong));
        assert_eq!(parse_tag(&[0x7F]), Err(TLVError::UnexpectedEndTag));
    }

    #[test]
    fn test_truncated_value() {
        let data = hex::decode("5B05414243").unwrap();
        assert_eq!(read_single(&data, false).unwrap_err(), TLVError::UnexpectedEndValue);
        assert!(read_list(&data, false).is_empty());
    }

    #[test]
    fn test_filler_bytes() {
        let data = hex::decode("00FF830102").unwrap();
        let tlvs = read_list(&data, true);
        assert_eq!(tlvs.len(), 1);
        assert_eq!(tlvs[0].tag, 0x83);
        assert_eq!(tlvs[0].value, vec![0x02]);
    }
}
