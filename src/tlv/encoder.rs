//! BER-TLV Encoder
//!
//! Encodes TLVs for card responses. Composite objects are written into a
//! sub-buffer first and wrapped once their size is known.

/// Stateless TLV encoding helpers
pub struct TLVEncoder;

impl TLVEncoder {
    /// Encode a tag-value pair to bytes
    pub fn encode(tag: u16, value: &[u8]) -> Vec<u8> {
        let mut result = Self::encode_tag(tag);
        result.extend(Self::encode_length(value.len()));
        result.extend_from_slice(value);
        result
    }

    pub fn encode_tag(tag: u16) -> Vec<u8> {
        if tag > 0xFF {
            tag.to_be_bytes().to_vec()
        } else {
            vec![tag as u8]
        }
    }

    /// Short form below 0x80, then `81 xx`, then `82 xx xx`.
    pub fn encode_length(length: usize) -> Vec<u8> {
        debug_assert!(length <= 0xFFFF);
        match length {
            0..=0x7F => vec![length as u8],
            0x80..=0xFF => vec![0x81, length as u8],
            _ => {
                let [hi, lo] = (length as u16).to_be_bytes();
                vec![0x82, hi, lo]
            }
        }
    }
}

/// Builder for composite TLV structures
///
/// # Example
/// ```ignore
/// let cardholder = TLVBuilder::new()
///     .add(0x5B, b"Doe<<John")
///     .add(0x5F2D, b"en")
///     .add(0x5F35, &[0x39])
///     .wrap(0x65)
///     .build();
/// ```
#[derive(Debug, Default, Clone)]
pub struct TLVBuilder {
    data: Vec<u8>,
}

impl TLVBuilder {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Add a primitive TLV
    pub fn add(mut self, tag: u16, value: &[u8]) -> Self {
        self.data.extend(TLVEncoder::encode(tag, value));
        self
    }

    /// Add pre-encoded bytes
    pub fn add_raw(mut self, data: &[u8]) -> Self {
        self.data.extend_from_slice(data);
        self
    }

    /// Add a nested builder's content as a constructed child
    pub fn add_nested(self, tag: u16, child: TLVBuilder) -> Self {
        let encoded = child.wrap(tag).build();
        self.add_raw(&encoded)
    }

    /// Wrap the current content in a constructed tag
    pub fn wrap(self, tag: u16) -> Self {
        Self {
            data: TLVEncoder::encode(tag, &self.data),
        }
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
