//! Target report decoding
//!
//! A `READ_TARGET_DATA` payload is a run of fixed-size records, one per
//! detected object:
//!
//! | offset | size | field              |
//! |--------|------|--------------------|
//! | 0      | 1    | target id          |
//! | 1      | 2    | distance, u16 LE   |
//! | 3      | 2    | speed, u16 LE      |
//! | 5      | 2    | angle, u16 LE      |
//! | 7      | 2    | SNR, u16 LE        |
//!
//! Each measurement is `raw * 0.01`.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Scale applied to every 2-byte measurement
pub const MEASUREMENT_SCALE: f32 = 0.01;

/// Bytes used by the id and the four measurements
const RECORD_FIELDS_LEN: usize = 9;

/// Record size and position inside the target payload.
///
/// Firmware revisions disagree on the record size, so it is a protocol
/// parameter rather than a constant. Bytes past the first nine of a record
/// are ignored. Every way of building a layout, deserialization included,
/// goes through [`TargetLayout::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LayoutFields", into = "LayoutFields")]
pub struct TargetLayout {
    record_len: usize,
    payload_offset: usize,
}

/// Serialized form of [`TargetLayout`]
#[derive(Serialize, Deserialize)]
struct LayoutFields {
    record_len: usize,
    #[serde(default)]
    payload_offset: usize,
}

impl TargetLayout {
    /// 9-byte records starting at the beginning of the payload
    pub const COMPACT: TargetLayout = TargetLayout {
        record_len: RECORD_FIELDS_LEN,
        payload_offset: 0,
    };

    /// Create a layout, rejecting records too short to hold all fields
    pub fn new(record_len: usize, payload_offset: usize) -> Option<Self> {
        (record_len >= RECORD_FIELDS_LEN).then_some(Self {
            record_len,
            payload_offset,
        })
    }

    /// Bytes per target record, at least 9
    pub fn record_len(&self) -> usize {
        self.record_len
    }

    /// Bytes skipped at the start of the payload before the first record
    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    /// Payload size of a report carrying `targets` records
    pub fn report_size(&self, targets: usize) -> usize {
        self.payload_offset
            .saturating_add(targets.saturating_mul(self.record_len))
    }
}

impl TryFrom<LayoutFields> for TargetLayout {
    type Error = String;

    fn try_from(fields: LayoutFields) -> Result<Self, Self::Error> {
        TargetLayout::new(fields.record_len, fields.payload_offset).ok_or_else(|| {
            format!(
                "target record length {} is shorter than {} bytes",
                fields.record_len, RECORD_FIELDS_LEN
            )
        })
    }
}

impl From<TargetLayout> for LayoutFields {
    fn from(layout: TargetLayout) -> Self {
        Self {
            record_len: layout.record_len,
            payload_offset: layout.payload_offset,
        }
    }
}

impl Default for TargetLayout {
    fn default() -> Self {
        Self::COMPACT
    }
}

/// One detected object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// Target id assigned by the radar
    pub id: u8,
    /// Metres
    pub distance: f32,
    /// Metres per second
    pub speed: f32,
    /// Degrees
    pub angle: f32,
    /// Signal-to-noise ratio
    pub snr: f32,
}

/// Targets decoded from one report, in wire order
pub type TargetSet = Vec<TargetRecord>;

fn measurement(raw: &[u8]) -> f32 {
    LittleEndian::read_u16(raw) as f32 * MEASUREMENT_SCALE
}

fn raw_measurement(value: f32) -> u16 {
    (value / MEASUREMENT_SCALE)
        .round()
        .clamp(0.0, u16::MAX as f32) as u16
}

/// Split a target report payload into records.
///
/// A payload too short to hold a record (including an empty one) is a valid
/// "nothing detected" report and yields an empty set. Trailing bytes that
/// don't form a whole record are dropped. At most `capacity` records are
/// returned.
pub fn decode_targets(payload: &[u8], capacity: usize, layout: TargetLayout) -> TargetSet {
    let body = payload.get(layout.payload_offset..).unwrap_or(&[]);
    let chunks = body.chunks_exact(layout.record_len);

    if !chunks.remainder().is_empty() {
        warn!(
            "decode_targets: ignoring {} trailing bytes (record length {})",
            chunks.remainder().len(),
            layout.record_len
        );
    }

    chunks
        .take(capacity)
        .map(|rec| TargetRecord {
            id: rec[0],
            distance: measurement(&rec[1..3]),
            speed: measurement(&rec[3..5]),
            angle: measurement(&rec[5..7]),
            snr: measurement(&rec[7..9]),
        })
        .collect()
}

/// Encode records into a target report payload.
///
/// Measurements are rounded to the 0.01 resolution and clamped to the
/// unsigned 16-bit range of the wire field.
pub fn encode_targets(targets: &[TargetRecord], layout: TargetLayout) -> Vec<u8> {
    let mut payload = vec![0u8; layout.report_size(targets.len())];

    for (target, rec) in targets
        .iter()
        .zip(payload[layout.payload_offset..].chunks_exact_mut(layout.record_len))
    {
        rec[0] = target.id;
        LittleEndian::write_u16(&mut rec[1..3], raw_measurement(target.distance));
        LittleEndian::write_u16(&mut rec[3..5], raw_measurement(target.speed));
        LittleEndian::write_u16(&mut rec[5..7], raw_measurement(target.angle));
        LittleEndian::write_u16(&mut rec[7..9], raw_measurement(target.snr));
    }

    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_detections() {
        assert!(decode_targets(&[], 35, TargetLayout::COMPACT).is_empty());
        assert!(decode_targets(&[0x00], 35, TargetLayout::COMPACT).is_empty());
    }

    #[test]
    fn test_single_record() {
        // id 3, distance 1234 (12.34 m), speed 250, angle 1500, snr 4000
        let payload = [3, 0xD2, 0x04, 0xFA, 0x00, 0xDC, 0x05, 0xA0, 0x0F];
        let targets = decode_targets(&payload, 35, TargetLayout::COMPACT);

        assert_eq!(targets.len(), 1);
        let t = targets[0];
        assert_eq!(t.id, 3);
        assert!((t.distance - 12.34).abs() < 1e-4);
        assert!((t.speed - 2.5).abs() < 1e-4);
        assert!((t.angle - 15.0).abs() < 1e-4);
        assert!((t.snr - 40.0).abs() < 1e-4);
    }

    #[test]
    fn test_capacity_truncates() {
        let records: Vec<TargetRecord> = (1..=5)
            .map(|id| TargetRecord {
                id,
                distance: id as f32,
                speed: 1.0,
                angle: 0.0,
                snr: 10.0,
            })
            .collect();
        let payload = encode_targets(&records, TargetLayout::COMPACT);

        let targets = decode_targets(&payload, 3, TargetLayout::COMPACT);
        assert_eq!(targets.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_trailing_partial_record_dropped() {
        let mut payload = vec![1, 100, 0, 0, 0, 0, 0, 0, 0];
        payload.extend_from_slice(&[2, 100, 0]);
        let targets = decode_targets(&payload, 35, TargetLayout::COMPACT);
        assert_eq!(targets.len(), 1);
        assert!((targets[0].distance - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_wider_layout_with_offset() {
        let layout = TargetLayout::new(10, 2).unwrap();
        let records = [
            TargetRecord {
                id: 7,
                distance: 5.5,
                speed: 1.25,
                angle: 20.0,
                snr: 12.0,
            },
            TargetRecord {
                id: 8,
                distance: 9.0,
                speed: 0.0,
                angle: 45.5,
                snr: 3.0,
            },
        ];
        let payload = encode_targets(&records, layout);
        assert_eq!(payload.len(), 22);

        let decoded = decode_targets(&payload, 35, layout);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].id, 8);
        assert!((decoded[1].angle - 45.5).abs() < 1e-4);

        // The same bytes read with the compact layout are misaligned
        assert_ne!(decode_targets(&payload, 35, TargetLayout::COMPACT)[0].id, 7);
    }

    #[test]
    fn test_layout_rejects_short_records() {
        assert!(TargetLayout::new(8, 0).is_none());
        assert!(TargetLayout::new(9, 0).is_some());
    }

    #[test]
    fn test_layout_deserialize_goes_through_new() {
        let layout: TargetLayout =
            serde_json::from_str(r#"{"record_len": 10, "payload_offset": 2502}"#).unwrap();
        assert_eq!(layout, TargetLayout::new(10, 2502).unwrap());

        let layout: TargetLayout = serde_json::from_str(r#"{"record_len": 12}"#).unwrap();
        assert_eq!(layout.payload_offset(), 0);

        for bad in [
            r#"{"record_len": 0, "payload_offset": 0}"#,
            r#"{"record_len": 5, "payload_offset": 0}"#,
        ] {
            let err = serde_json::from_str::<TargetLayout>(bad).unwrap_err();
            assert!(err.to_string().contains("shorter than 9 bytes"), "{err}");
        }
    }

    #[test]
    fn test_layout_serializes_fields() {
        let json = serde_json::to_string(&TargetLayout::new(10, 2).unwrap()).unwrap();
        assert_eq!(json, r#"{"record_len":10,"payload_offset":2}"#);
    }

    #[test]
    fn test_report_size() {
        assert_eq!(TargetLayout::COMPACT.report_size(35), 315);
        assert_eq!(TargetLayout::new(10, 2502).unwrap().report_size(35), 2852);
    }

    #[test]
    fn test_negative_values_clamp_to_zero() {
        let payload = encode_targets(
            &[TargetRecord {
                id: 1,
                distance: 3.0,
                speed: 1.0,
                angle: -10.0,
                snr: 0.0,
            }],
            TargetLayout::COMPACT,
        );
        let t = decode_targets(&payload, 1, TargetLayout::COMPACT)[0];
        assert_eq!(t.angle, 0.0);
    }
}
