//! Fixed 8-byte frame codec.
//!
//! Every message exchanged with the bootloader, in both directions, is one
//! frame of exactly eight bytes:
//!
//! ```text
//! +------+---------+---------+--------+---------------------+
//! | Type | Seq Lo  | Seq Hi  | Length |       Payload       |
//! +------+---------+---------+--------+---------------------+
//! |  1   |    1    |    1    |   1    |          4          |
//! +------+---------+---------+--------+---------------------+
//! | tag  |   u16 little-endian   | 0..=4 | zero padded      |
//! +------+-----------------------+--------+-----------------+
//! ```
//!
//! There is no per-frame checksum. Only the whole image is optionally
//! protected by a CRC-32 sent in the second header frame.

use {
    crate::error::{Error, Result},
    byteorder::{ByteOrder, LittleEndian},
    std::fmt,
};

/// Size of every frame on the wire.
pub const FRAME_SIZE: usize = 8;

/// Maximum number of payload bytes in a frame.
pub const MAX_PAYLOAD: usize = 4;

/// Frame type tag (byte 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Transfer header: image size (seq 0) or image CRC-32 (seq 1).
    Header,
    /// Four bytes of image data.
    DataChunk,
    /// End of transfer.
    End,
    /// Identity request / response.
    Info,
    /// Positive acknowledgement.
    Ack,
    /// Negative acknowledgement.
    Nak,
    /// Abort the transfer in progress on the device.
    Cancel,
    /// Any other tag value.
    Unrecognized(u8),
}

impl FrameType {
    /// Raw tag byte.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Header => 0x01,
            Self::DataChunk => 0x02,
            Self::End => 0x03,
            Self::Info => 0x04,
            Self::Ack => 0x06,
            Self::Nak => 0x15,
            Self::Cancel => 0x18,
            Self::Unrecognized(tag) => tag,
        }
    }
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Self::Header,
            0x02 => Self::DataChunk,
            0x03 => Self::End,
            0x04 => Self::Info,
            0x06 => Self::Ack,
            0x15 => Self::Nak,
            0x18 => Self::Cancel,
            other => Self::Unrecognized(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(value: FrameType) -> Self {
        value.as_byte()
    }
}

/// A decoded protocol frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    frame_type: FrameType,
    sequence: u16,
    length: u8,
    payload: [u8; MAX_PAYLOAD],
}

impl Frame {
    /// Create a frame carrying `data` (at most four bytes).
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(frame_type: FrameType, sequence: u16, data: &[u8]) -> Result<Self> {
        if data.len() > MAX_PAYLOAD {
            return Err(Error::Protocol(format!(
                "payload of {} bytes exceeds the {MAX_PAYLOAD}-byte frame limit",
                data.len()
            )));
        }

        let mut payload = [0u8; MAX_PAYLOAD];
        payload[..data.len()].copy_from_slice(data);

        Ok(Self {
            frame_type,
            sequence,
            // Bounded by MAX_PAYLOAD above.
            length: data.len() as u8,
            payload,
        })
    }

    fn with_word(frame_type: FrameType, sequence: u16, word: u32) -> Self {
        let mut payload = [0u8; MAX_PAYLOAD];
        LittleEndian::write_u32(&mut payload, word);
        Self {
            frame_type,
            sequence,
            length: 4,
            payload,
        }
    }

    /// First header frame: total image size.
    pub fn size_header(image_len: u32) -> Self {
        Self::with_word(FrameType::Header, 0, image_len)
    }

    /// Second header frame: image CRC-32.
    pub fn crc_header(crc: u32) -> Self {
        Self::with_word(FrameType::Header, 1, crc)
    }

    /// Data chunk frame.
    ///
    /// The length field is always 4, even for a short final chunk; the
    /// missing bytes are sent as zero. The bootloader programs whole words
    /// and relies on this.
    #[allow(clippy::cast_possible_truncation)]
    pub fn data_chunk(sequence: u16, chunk: &[u8]) -> Result<Self> {
        let mut frame = Self::new(FrameType::DataChunk, sequence, chunk)?;
        frame.length = MAX_PAYLOAD as u8;
        Ok(frame)
    }

    /// End-of-transfer frame.
    pub fn end() -> Self {
        Self {
            frame_type: FrameType::End,
            sequence: 0,
            length: 0,
            payload: [0; MAX_PAYLOAD],
        }
    }

    /// Identity request for `command_id`.
    pub fn info_request(command_id: u8) -> Self {
        Self {
            frame_type: FrameType::Info,
            sequence: 0,
            length: 1,
            payload: [command_id, 0, 0, 0],
        }
    }

    /// Transfer cancel frame.
    pub fn cancel() -> Self {
        Self {
            frame_type: FrameType::Cancel,
            sequence: 0,
            length: 0,
            payload: [0; MAX_PAYLOAD],
        }
    }

    /// Serialize to the 8-byte wire form.
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut buf = [0u8; FRAME_SIZE];
        buf[0] = self.frame_type.as_byte();
        LittleEndian::write_u16(&mut buf[1..3], self.sequence);
        buf[3] = self.length;
        buf[4..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a frame from its 8-byte wire form.
    ///
    /// A length field above four cannot be trusted and is reported as
    /// [`Error::UnexpectedFrame`].
    pub fn decode(bytes: &[u8; FRAME_SIZE]) -> Result<Self> {
        let length = bytes[3];
        if usize::from(length) > MAX_PAYLOAD {
            return Err(Error::UnexpectedFrame(format!(
                "length field {length} out of range in {}",
                hex_bytes(bytes)
            )));
        }

        let mut payload = [0u8; MAX_PAYLOAD];
        payload.copy_from_slice(&bytes[4..]);

        Ok(Self {
            frame_type: FrameType::from(bytes[0]),
            sequence: LittleEndian::read_u16(&bytes[1..3]),
            length,
            payload,
        })
    }

    /// Frame type tag.
    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Sequence number.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Raw 4-byte payload including padding.
    pub fn payload(&self) -> &[u8; MAX_PAYLOAD] {
        &self.payload
    }

    /// Meaningful payload bytes (`payload[..length]`).
    pub fn data(&self) -> &[u8] {
        &self.payload[..usize::from(self.length)]
    }

    /// Whether bytes 3 to 7 are all zero, as in a well-formed ACK/NAK.
    pub fn has_empty_tail(&self) -> bool {
        self.length == 0 && self.payload == [0; MAX_PAYLOAD]
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} seq={} len={} [{}]",
            self.frame_type,
            self.sequence,
            self.length,
            hex_bytes(&self.payload)
        )
    }
}

/// Render bytes as `0x01 0x02 ...` for log output.
pub fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("0x{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_tags() {
        assert_eq!(FrameType::from(0x01), FrameType::Header);
        assert_eq!(FrameType::from(0x06), FrameType::Ack);
        assert_eq!(FrameType::from(0x15), FrameType::Nak);
        assert_eq!(FrameType::from(0x18), FrameType::Cancel);
        assert_eq!(FrameType::from(0x99), FrameType::Unrecognized(0x99));
        assert_eq!(u8::from(FrameType::Unrecognized(0x42)), 0x42);
        assert_eq!(u8::from(FrameType::DataChunk), 0x02);
    }

    #[test]
    fn test_size_header_layout() {
        let raw = Frame::size_header(0x0001_2345).encode();
        assert_eq!(raw, [0x01, 0x00, 0x00, 0x04, 0x45, 0x23, 0x01, 0x00]);
    }

    #[test]
    fn test_crc_header_layout() {
        let raw = Frame::crc_header(0xCBF43926).encode();
        assert_eq!(raw, [0x01, 0x01, 0x00, 0x04, 0x26, 0x39, 0xF4, 0xCB]);
    }

    #[test]
    fn test_info_request_layout() {
        let raw = Frame::info_request(2).encode();
        assert_eq!(raw, [0x04, 0x00, 0x00, 0x01, 0x02, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_end_and_cancel_layout() {
        assert_eq!(Frame::end().encode(), [0x03, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Frame::cancel().encode(), [0x18, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_data_chunk_short_tail_keeps_length_four() {
        let raw = Frame::data_chunk(0x0102, &[0xAA, 0xBB])
            .unwrap()
            .encode();
        assert_eq!(raw, [0x02, 0x02, 0x01, 0x04, 0xAA, 0xBB, 0x00, 0x00]);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let err = Frame::new(FrameType::Info, 0, &[1, 2, 3, 4, 5]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(Frame::data_chunk(0, &[0; 5]).is_err());
    }

    #[test]
    fn test_encode_decode_recovers_fields() {
        let types = [
            FrameType::Header,
            FrameType::DataChunk,
            FrameType::End,
            FrameType::Info,
            FrameType::Ack,
            FrameType::Nak,
            FrameType::Unrecognized(0x7F),
        ];
        let data = [0xDE, 0xAD, 0xBE, 0xEF];

        for frame_type in types {
            for len in 0..=MAX_PAYLOAD {
                let seq = 0xA55A_u16.wrapping_add(len as u16);
                let frame = Frame::new(frame_type, seq, &data[..len]).unwrap();
                let raw = frame.encode();
                assert!(raw[4 + len..].iter().all(|&b| b == 0));

                let decoded = Frame::decode(&raw).unwrap();
                assert_eq!(decoded.frame_type(), frame_type);
                assert_eq!(decoded.sequence(), seq);
                assert_eq!(decoded.data(), &data[..len]);
            }
        }
    }

    #[test]
    fn test_decode_rejects_bad_length() {
        let raw = [0x06, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            Frame::decode(&raw),
            Err(Error::UnexpectedFrame(_))
        ));
    }

    #[test]
    fn test_empty_tail_detection() {
        let ack = Frame::decode(&[0x06, 0x03, 0x00, 0, 0, 0, 0, 0]).unwrap();
        assert!(ack.has_empty_tail());
        assert_eq!(ack.sequence(), 3);

        let noisy = Frame::decode(&[0x06, 0x03, 0x00, 0, 0, 1, 0, 0]).unwrap();
        assert!(!noisy.has_empty_tail());
    }

    #[test]
    fn test_hex_bytes() {
        assert_eq!(hex_bytes(&[0x01, 0xAB]), "0x01 0xAB");
    }
}
