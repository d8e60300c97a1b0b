//! Protocol commands
//!
//! Defines the command words and single-byte argument values understood by the radar.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::RadarError;

/// Command words of the radar protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Ask for the firmware version (0x10)
    RequestVersion,
    /// Firmware version reply (0x11)
    ReadVersion,
    /// Configure the number of reported targets (0x12)
    SetTargetNum,
    /// Configure the report rate (0x18)
    SetDataFreq,
    /// Toggle reporting of frames with no targets (0x19)
    SetZeroReport,
    /// Start streaming target reports (0x20)
    EnableTransmit,
    /// Stop streaming target reports (0x21)
    DisableTransmit,
    /// Write the detection envelope (0x36)
    SetParameters,
    /// Ask for the detection envelope (0x37)
    GetParameters,
    /// Detection envelope reply (0x38)
    ReadParameters,
    /// Unsolicited target report (0x42)
    ReadTargetData,
    /// Status reply to configuration commands (0x50)
    ReadStatus,
}

impl Command {
    /// Get the wire byte for this command
    pub fn code(&self) -> u8 {
        match self {
            Command::RequestVersion => 0x10,
            Command::ReadVersion => 0x11,
            Command::SetTargetNum => 0x12,
            Command::SetDataFreq => 0x18,
            Command::SetZeroReport => 0x19,
            Command::EnableTransmit => 0x20,
            Command::DisableTransmit => 0x21,
            Command::SetParameters => 0x36,
            Command::GetParameters => 0x37,
            Command::ReadParameters => 0x38,
            Command::ReadTargetData => 0x42,
            Command::ReadStatus => 0x50,
        }
    }

    /// Response command the device answers this request with.
    ///
    /// `None` for commands that only ever travel device-to-host.
    pub fn expected_response(&self) -> Option<Command> {
        match self {
            Command::RequestVersion => Some(Command::ReadVersion),
            Command::GetParameters => Some(Command::ReadParameters),
            Command::SetParameters
            | Command::SetTargetNum
            | Command::EnableTransmit
            | Command::DisableTransmit
            | Command::SetDataFreq
            | Command::SetZeroReport => Some(Command::ReadStatus),
            Command::ReadVersion
            | Command::ReadParameters
            | Command::ReadTargetData
            | Command::ReadStatus => None,
        }
    }

    /// Check if this command is answered with a `READ_STATUS` frame
    pub fn expects_status(&self) -> bool {
        self.expected_response() == Some(Command::ReadStatus)
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0x10 => Command::RequestVersion,
            0x11 => Command::ReadVersion,
            0x12 => Command::SetTargetNum,
            0x18 => Command::SetDataFreq,
            0x19 => Command::SetZeroReport,
            0x20 => Command::EnableTransmit,
            0x21 => Command::DisableTransmit,
            0x36 => Command::SetParameters,
            0x37 => Command::GetParameters,
            0x38 => Command::ReadParameters,
            0x42 => Command::ReadTargetData,
            0x50 => Command::ReadStatus,
            other => return Err(other),
        })
    }
}

/// First payload byte of a `READ_STATUS` frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// `0x0A`
    Success,
    /// `0xFF`
    Failure,
    /// Any byte the documentation doesn't name; treated as a failure
    Other(u8),
}

impl Status {
    /// Status byte of an accepted command
    pub const SUCCESS: u8 = 0x0A;
    /// Status byte of a rejected command
    pub const FAILURE: u8 = 0xFF;

    /// Raw status byte
    pub fn byte(&self) -> u8 {
        match self {
            Status::Success => Self::SUCCESS,
            Status::Failure => Self::FAILURE,
            Status::Other(b) => *b,
        }
    }

    /// Whether the device accepted the command
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

impl From<u8> for Status {
    fn from(b: u8) -> Self {
        match b {
            Self::SUCCESS => Status::Success,
            Self::FAILURE => Status::Failure,
            other => Status::Other(other),
        }
    }
}

/// Argument of `SET_ZERO_REPORT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZeroReport {
    /// Send a target frame even when nothing is detected
    Report,
    /// Stay silent when nothing is detected
    NotReport,
}

impl ZeroReport {
    /// Wire value of the argument
    pub fn byte(&self) -> u8 {
        match self {
            ZeroReport::Report => 0x0A,
            ZeroReport::NotReport => 0xFF,
        }
    }

    /// Parse a wire value, `None` for unknown bytes
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x0A => Some(ZeroReport::Report),
            0xFF => Some(ZeroReport::NotReport),
            _ => None,
        }
    }
}

impl From<bool> for ZeroReport {
    fn from(enabled: bool) -> Self {
        if enabled {
            ZeroReport::Report
        } else {
            ZeroReport::NotReport
        }
    }
}

/// Argument of `SET_DATA_FREQ`
///
/// The code on the wire is the number of reports per second. The firmware
/// accepts 1 through 10, 15 and 20.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DataFrequency(u8);

impl DataFrequency {
    /// One report per second
    pub const HZ_1: DataFrequency = DataFrequency(0x01);
    /// Two reports per second
    pub const HZ_2: DataFrequency = DataFrequency(0x02);
    /// Three reports per second
    pub const HZ_3: DataFrequency = DataFrequency(0x03);
    /// Four reports per second
    pub const HZ_4: DataFrequency = DataFrequency(0x04);
    /// Five reports per second
    pub const HZ_5: DataFrequency = DataFrequency(0x05);
    /// Ten reports per second
    pub const HZ_10: DataFrequency = DataFrequency(0x0A);
    /// 15 reports per second
    pub const HZ_15: DataFrequency = DataFrequency(0x0F);
    /// 20 reports per second
    pub const HZ_20: DataFrequency = DataFrequency(0x14);

    /// Validate a raw frequency code
    pub fn from_code(code: u8) -> Result<Self, RadarError> {
        match code {
            0x01..=0x0A | 0x0F | 0x14 => Ok(DataFrequency(code)),
            other => Err(RadarError::InvalidArgument(format!(
                "unsupported data frequency code {other:#04x}"
            ))),
        }
    }

    /// Wire code
    pub fn code(&self) -> u8 {
        self.0
    }

    /// Target reports per second
    pub fn reports_per_second(&self) -> u32 {
        self.0 as u32
    }

    /// Time between two consecutive target reports
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.reports_per_second() as u64)
    }
}

impl Default for DataFrequency {
    fn default() -> Self {
        Self::HZ_1
    }
}

impl TryFrom<u8> for DataFrequency {
    type Error = RadarError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl From<DataFrequency> for u8 {
    fn from(freq: DataFrequency) -> Self {
        freq.0
    }
}

/// Firmware version reported by `READ_VERSION`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
    /// Patch version
    pub patch: u8,
}

impl FirmwareVersion {
    /// Create a version from its three parts
    pub fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the payload of a `READ_VERSION` frame
    pub fn from_payload(payload: &[u8]) -> Result<Self, RadarError> {
        match payload {
            [major, minor, patch, ..] => Ok(Self::new(*major, *minor, *patch)),
            _ => Err(RadarError::MalformedResponse {
                command: Command::ReadVersion,
                reason: "version payload shorter than 3 bytes",
            }),
        }
    }

    /// Encode as a `READ_VERSION` payload
    pub fn to_payload(&self) -> [u8; 3] {
        [self.major, self.minor, self.patch]
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What the `SET_TARGET_NUM` argument actually configures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetNumberMeaning {
    /// Number of targets to report
    Count,
    /// Highest target id to report
    MaxIndex,
    /// Not established by the vendor documentation
    Unresolved,
}

/// The vendor documentation does not say whether the target number is a count
/// or the highest target id. The value is sent through untouched either way.
pub const TARGET_NUMBER_MEANING: TargetNumberMeaning = TargetNumberMeaning::Unresolved;
