//! Frame encoding/decoding
//!
//! Frame format:
//! - 2 bytes: header `0x55 0xAA`
//! - 2 bytes: length, little-endian, counts the command byte plus payload
//! - 1 byte: command word
//! - N bytes: payload (`length - 1` bytes)
//! - 1 byte: checksum, low byte of the sum of length bytes, command and payload
//!
//! The checksum is a plain additive sum, kept exactly as the firmware computes it.

use byteorder::{ByteOrder, LittleEndian};
use std::io::Read;
use tracing::{debug, trace};

use super::{Command, RadarError, MAX_PAYLOAD_SIZE};

/// First header byte
pub const HEADER_1: u8 = 0x55;
/// Second header byte
pub const HEADER_2: u8 = 0xAA;

/// Header + length + command + checksum
pub const FRAME_OVERHEAD: usize = 6;

/// Largest payload the 16-bit length field can describe
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize - 1;

/// A protocol frame with a verified checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw command word
    pub command: u8,
    /// Frame payload (may be empty)
    pub payload: Vec<u8>,
    /// Checksum as carried on the wire
    pub checksum: u8,
}

impl Frame {
    /// Create a new frame, computing its checksum
    pub fn new(command: Command, payload: Vec<u8>) -> Self {
        Self::with_code(command.code(), payload)
    }

    /// Create a frame from a raw command word
    ///
    /// # Panics
    ///
    /// Panics if the payload is longer than [`MAX_FRAME_PAYLOAD`].
    pub fn with_code(command: u8, payload: Vec<u8>) -> Self {
        let checksum = checksum(length_field(payload.len()), command, &payload);
        Self {
            command,
            payload,
            checksum,
        }
    }

    /// Decoded command word, if the code is known
    pub fn command(&self) -> Option<Command> {
        Command::try_from(self.command).ok()
    }

    /// Check if this frame carries the given command
    pub fn is(&self, command: Command) -> bool {
        self.command == command.code()
    }

    /// Value of the length field for this frame
    pub fn length_field(&self) -> u16 {
        length_field(self.payload.len())
    }

    /// Encode the frame to raw bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_size());

        bytes.push(HEADER_1);
        bytes.push(HEADER_2);

        let mut len_bytes = [0u8; 2];
        LittleEndian::write_u16(&mut len_bytes, self.length_field());
        bytes.extend_from_slice(&len_bytes);

        bytes.push(self.command);
        bytes.extend_from_slice(&self.payload);
        bytes.push(self.checksum);

        bytes
    }

    /// Get the total encoded size
    pub fn encoded_size(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }
}

/// Reason a scanned frame was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidFrame {
    /// `0x55` was followed by something other than `0xAA`
    HeaderMismatch(u8),
    /// Length field of zero, or a payload larger than the reader's limit
    BadLength(u16),
    /// Recomputed checksum differs from the trailing byte
    ChecksumMismatch {
        /// Command word of the discarded frame
        command: u8,
        /// Checksum computed over the received bytes
        expected: u8,
        /// Checksum carried on the wire
        actual: u8,
    },
}

/// Outcome of scanning the stream for one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Frame passed header, length and checksum checks
    Valid(Frame),
    /// Frame was discarded
    Invalid(InvalidFrame),
}

impl Decoded {
    /// The frame, if it passed validation
    pub fn valid(self) -> Option<Frame> {
        match self {
            Decoded::Valid(frame) => Some(frame),
            Decoded::Invalid(_) => None,
        }
    }
}

/// Encode a command and payload into wire bytes
///
/// # Panics
///
/// Panics if the payload is longer than [`MAX_FRAME_PAYLOAD`].
pub fn encode(command: Command, payload: &[u8]) -> Vec<u8> {
    Frame::new(command, payload.to_vec()).to_bytes()
}

/// Compute the frame checksum
pub fn checksum(length: u16, command: u8, payload: &[u8]) -> u8 {
    let [lo, hi] = length.to_le_bytes();
    payload
        .iter()
        .fold(lo.wrapping_add(hi).wrapping_add(command), |acc, b| {
            acc.wrapping_add(*b)
        })
}

fn length_field(payload_len: usize) -> u16 {
    assert!(
        payload_len <= MAX_FRAME_PAYLOAD,
        "payload of {} bytes does not fit a frame",
        payload_len
    );
    (payload_len + 1) as u16
}

fn read_byte<R: Read + ?Sized>(reader: &mut R) -> Result<u8, RadarError> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}

/// Scan the stream for the next frame, accepting payloads up to
/// [`MAX_PAYLOAD_SIZE`].
///
/// See [`read_frame_limited`].
pub fn read_frame<R: Read + ?Sized>(reader: &mut R) -> Result<Decoded, RadarError> {
    read_frame_limited(reader, MAX_PAYLOAD_SIZE)
}

/// Scan the stream for the next frame and validate it.
///
/// Bytes are consumed one at a time until the first header byte shows up. If
/// the next byte isn't the second header byte the frame is reported as
/// [`InvalidFrame::HeaderMismatch`] and that byte is consumed with it, so a
/// `0x55` embedded in payload data may cost the caller one extra read.
///
/// A length field announcing more than `max_payload` bytes is rejected
/// before anything is allocated. Checksum and length problems come back as
/// [`Decoded::Invalid`]; only transport errors are returned as `Err`.
pub fn read_frame_limited<R: Read + ?Sized>(
    reader: &mut R,
    max_payload: usize,
) -> Result<Decoded, RadarError> {
    let mut skipped = 0usize;
    while read_byte(reader)? != HEADER_1 {
        skipped += 1;
    }
    if skipped > 0 {
        trace!("read_frame: skipped {} noise bytes before header", skipped);
    }

    let second = read_byte(reader)?;
    if second != HEADER_2 {
        return Ok(Decoded::Invalid(InvalidFrame::HeaderMismatch(second)));
    }

    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes)?;
    let length = LittleEndian::read_u16(&len_bytes);

    // Validate before sizing any buffer from a device-supplied number
    if length == 0 || length as usize - 1 > max_payload {
        debug!("read_frame: rejecting length field {}", length);
        return Ok(Decoded::Invalid(InvalidFrame::BadLength(length)));
    }

    let command = read_byte(reader)?;

    let mut payload = vec![0u8; length as usize - 1];
    reader.read_exact(&mut payload)?;

    let actual = read_byte(reader)?;
    let expected = checksum(length, command, &payload);

    if expected != actual {
        return Ok(Decoded::Invalid(InvalidFrame::ChecksumMismatch {
            command,
            expected,
            actual,
        }));
    }

    trace!(
        "read_frame: command {:#04x}, {} payload bytes",
        command,
        payload.len()
    );

    Ok(Decoded::Valid(Frame {
        command,
        payload,
        checksum: actual,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn test_request_version_bytes() {
        assert_eq!(
            encode(Command::RequestVersion, &[]),
            vec![0x55, 0xAA, 0x01, 0x00, 0x10, 0x11]
        );
    }

    #[test]
    fn test_version_response_decodes() {
        let bytes = [0x55, 0xAA, 0x04, 0x00, 0x11, 0x01, 0x02, 0x03, 0x1B];
        let frame = read_frame(&mut Cursor::new(bytes))
            .unwrap()
            .valid()
            .expect("frame should be valid");

        assert!(frame.is(Command::ReadVersion));
        assert_eq!(frame.payload, vec![1, 2, 3]);
    }

    #[test]
    fn test_checksum_sums_all_fields() {
        let payload = [0xF0, 0x20, 0x33];
        let bytes = encode(Command::SetParameters, &payload);
        let expected = (0x04u32 + 0x00 + 0x36 + 0xF0 + 0x20 + 0x33) % 256;
        assert_eq!(*bytes.last().unwrap() as u32, expected);
    }

    #[test]
    fn test_checksum_includes_length_high_byte() {
        let payload = vec![0u8; 300];
        let frame = Frame::new(Command::ReadTargetData, payload);
        // 301 = 0x012D
        assert_eq!(frame.checksum, 0x2Du8.wrapping_add(0x01).wrapping_add(0x42));
    }

    #[test]
    fn test_round_trip_keeps_command_and_payload() {
        let sent = Frame::new(Command::SetTargetNum, vec![7]);
        let decoded = read_frame(&mut Cursor::new(sent.to_bytes())).unwrap();
        assert_eq!(decoded, Decoded::Valid(sent));
    }

    #[test]
    fn test_empty_payload() {
        let bytes = encode(Command::ReadTargetData, &[]);
        let frame = read_frame(&mut Cursor::new(bytes)).unwrap().valid().unwrap();
        assert!(frame.payload.is_empty());
        assert_eq!(frame.length_field(), 1);
    }

    #[test]
    fn test_resync_after_noise() {
        let mut bytes = vec![0x00, 0x13, 0xAA, 0xFE];
        bytes.extend(encode(Command::ReadStatus, &[0x0A]));
        let frame = read_frame(&mut Cursor::new(bytes)).unwrap().valid().unwrap();
        assert!(frame.is(Command::ReadStatus));
    }

    #[test]
    fn test_false_header_reported_then_recovered() {
        let mut bytes = vec![0x55, 0x01];
        bytes.extend(encode(Command::ReadStatus, &[0x0A]));
        let mut cursor = Cursor::new(bytes);

        assert_eq!(
            read_frame(&mut cursor).unwrap(),
            Decoded::Invalid(InvalidFrame::HeaderMismatch(0x01))
        );
        assert!(read_frame(&mut cursor).unwrap().valid().is_some());
    }

    #[test]
    fn test_corrupted_checksum() {
        let mut bytes = encode(Command::ReadStatus, &[0x0A]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        match read_frame(&mut Cursor::new(bytes)).unwrap() {
            Decoded::Invalid(InvalidFrame::ChecksumMismatch { command, .. }) => {
                assert_eq!(command, 0x50)
            }
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_length_not_trusted() {
        let bytes = [0x55, 0xAA, 0xFF, 0xFF, 0x42];
        assert_eq!(
            read_frame(&mut Cursor::new(bytes)).unwrap(),
            Decoded::Invalid(InvalidFrame::BadLength(0xFFFF))
        );
    }

    #[test]
    fn test_limit_admits_large_reports() {
        let payload = vec![0x42u8; 2852];
        let bytes = encode(Command::ReadTargetData, &payload);

        assert_eq!(
            read_frame(&mut Cursor::new(&bytes)).unwrap(),
            Decoded::Invalid(InvalidFrame::BadLength(2853))
        );
        let frame = read_frame_limited(&mut Cursor::new(&bytes), 2852)
            .unwrap()
            .valid()
            .unwrap();
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn test_largest_frame_payload_encodes() {
        let frame = Frame::new(Command::ReadTargetData, vec![0u8; MAX_FRAME_PAYLOAD]);
        assert_eq!(frame.length_field(), u16::MAX);
    }

    #[test]
    #[should_panic(expected = "does not fit a frame")]
    fn test_oversized_payload_not_encoded() {
        encode(Command::ReadTargetData, &vec![0u8; MAX_FRAME_PAYLOAD + 1]);
    }

    #[test]
    fn test_zero_length_rejected() {
        let bytes = [0x55, 0xAA, 0x00, 0x00];
        assert_eq!(
            read_frame(&mut Cursor::new(bytes)).unwrap(),
            Decoded::Invalid(InvalidFrame::BadLength(0))
        );
    }

    #[test]
    fn test_truncated_stream_is_channel_error() {
        let bytes = [0x55, 0xAA, 0x04, 0x00, 0x11, 0x01];
        let err = read_frame(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, RadarError::Channel(_)));
    }
}
