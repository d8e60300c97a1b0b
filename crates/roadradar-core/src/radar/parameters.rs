//! Detection envelope parameters
//!
//! Eight little-endian `f32` values, 32 bytes on the wire.
//!
//! The firmware reads `SET_PARAMETERS` in declaration order, but reports
//! `READ_PARAMETERS` with max before min for both distance and speed. Both
//! layouts are modelled explicitly so the swap is never silently "fixed".

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::protocol::{Command, RadarError};

/// Wire size of the parameter block
pub const PARAMETERS_SIZE: usize = 32;

/// Detection envelope of the radar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// Metres
    pub min_distance: f32,
    /// Metres
    pub max_distance: f32,
    /// Metres per second
    pub min_speed: f32,
    /// Metres per second
    pub max_speed: f32,
    /// Degrees
    pub min_angle: f32,
    /// Degrees
    pub max_angle: f32,
    /// Metres from the boresight, negative to the left
    pub left_border: f32,
    /// Metres from the boresight, positive to the right
    pub right_border: f32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            min_distance: 0.0,
            max_distance: 13.0,
            min_speed: 0.0,
            max_speed: 5.0,
            min_angle: -60.0,
            max_angle: 60.0,
            left_border: -6.0,
            right_border: 6.0,
        }
    }
}

/// Byte order of the parameter block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterLayout {
    /// Declaration order, as sent with `SET_PARAMETERS`
    Request,
    /// Distance and speed pairs stored max-first, as received in `READ_PARAMETERS`
    Report,
}

impl ParameterLayout {
    /// Slot index of each field, in declaration order
    fn slots(&self) -> [usize; 8] {
        match self {
            ParameterLayout::Request => [0, 1, 2, 3, 4, 5, 6, 7],
            ParameterLayout::Report => [1, 0, 3, 2, 4, 5, 6, 7],
        }
    }
}

impl Parameters {
    fn fields(&self) -> [f32; 8] {
        [
            self.min_distance,
            self.max_distance,
            self.min_speed,
            self.max_speed,
            self.min_angle,
            self.max_angle,
            self.left_border,
            self.right_border,
        ]
    }

    fn from_fields(f: [f32; 8]) -> Self {
        Self {
            min_distance: f[0],
            max_distance: f[1],
            min_speed: f[2],
            max_speed: f[3],
            min_angle: f[4],
            max_angle: f[5],
            left_border: f[6],
            right_border: f[7],
        }
    }

    /// Check whether a point lies inside the distance/speed/angle envelope
    pub fn contains(&self, distance: f32, speed: f32, angle: f32) -> bool {
        (self.min_distance..=self.max_distance).contains(&distance)
            && (self.min_speed..=self.max_speed).contains(&speed)
            && (self.min_angle..=self.max_angle).contains(&angle)
    }

    /// Bytes sent with `SET_PARAMETERS`
    pub fn to_request_bytes(&self) -> [u8; PARAMETERS_SIZE] {
        pack(self, ParameterLayout::Request)
    }

    /// Parse the payload of a `READ_PARAMETERS` frame
    pub fn from_report_bytes(payload: &[u8]) -> Result<Self, RadarError> {
        unpack(payload, ParameterLayout::Report)
    }
}

/// Serialize parameters in the given layout
pub fn pack(params: &Parameters, layout: ParameterLayout) -> [u8; PARAMETERS_SIZE] {
    let mut out = [0u8; PARAMETERS_SIZE];
    for (value, slot) in params.fields().iter().zip(layout.slots()) {
        LittleEndian::write_f32(&mut out[slot * 4..slot * 4 + 4], *value);
    }
    out
}

/// Deserialize parameters from the given layout
pub fn unpack(bytes: &[u8], layout: ParameterLayout) -> Result<Parameters, RadarError> {
    if bytes.len() != PARAMETERS_SIZE {
        return Err(RadarError::MalformedResponse {
            command: Command::ReadParameters,
            reason: "parameter block is not 32 bytes",
        });
    }

    let mut fields = [0f32; 8];
    for (field, slot) in fields.iter_mut().zip(layout.slots()) {
        *field = LittleEndian::read_f32(&bytes[slot * 4..slot * 4 + 4]);
    }
    Ok(Parameters::from_fields(fields))
}
