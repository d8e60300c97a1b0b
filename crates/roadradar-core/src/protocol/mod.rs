//! Serial Protocol Communication
//!
//! Implements the framed command/response protocol spoken by the smart road
//! radar over a half-duplex serial link.
//!
//! Frame format (all multi-byte fields little-endian):
//! - 2 bytes: header `0x55 0xAA`
//! - 2 bytes: length (`1 + payload length`)
//! - 1 byte: command word
//! - N bytes: payload
//! - 1 byte: additive checksum of length, command and payload

pub mod channel;
mod client;
pub mod commands;
mod error;
pub mod frame;
pub mod serial;

pub use channel::{ByteChannel, SerialChannel};
pub use client::{ClientConfig, ClientCounters, CommandClient};
pub(crate) use client::SharedChannel;
pub use commands::{
    Command, DataFrequency, FirmwareVersion, Status, TargetNumberMeaning, ZeroReport,
    TARGET_NUMBER_MEANING,
};
pub use error::RadarError;
pub use frame::{Decoded, Frame, InvalidFrame, MAX_FRAME_PAYLOAD};
pub use serial::{list_ports, open_port, DataBits, Parity, PortConfig, PortInfo, StopBits};

/// Default baud rate of the radar's UART
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default number of frame reads spent waiting for a response
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default limit on payloads accepted from the device
///
/// 35 targets at 10 bytes each fit comfortably. Layouts with a payload offset
/// raise the limit, see [`ClientConfig::max_payload_size`].
pub const MAX_PAYLOAD_SIZE: usize = 1024;
