//! # RoadRadar Core Library
//!
//! Host-side driver for smart road traffic radars attached over a serial link.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Frame encoding and decoding for the radar's serial protocol
//! - A command client that correlates requests with responses
//! - Parameter and target report codecs
//! - A background reader for streamed target reports
//! - A demo radar and a wire-level simulator for testing
//!
//! ## Example
//!
//! ```rust,ignore
//! use roadradar_core::prelude::*;
//!
//! let port = PortConfig { name: "/dev/ttyUSB0".into(), ..Default::default() };
//! let mut radar = Radar::open(&port, ClientConfig::default())?;
//! println!("firmware {}", radar.get_firmware_version()?);
//!
//! radar.enable_data_transmit()?;
//! radar.start_streaming(|event| println!("{:?}", event))?;
//! ```

pub mod config;
pub mod demo;
pub mod protocol;
pub mod radar;
pub mod sim;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::RadarConfig;
    pub use crate::demo::DemoRadar;
    pub use crate::protocol::{
        ClientConfig, Command, CommandClient, DataFrequency, FirmwareVersion, PortConfig,
        RadarError,
    };
    pub use crate::radar::{
        Parameters, Radar, RadarDevice, StreamEvent, TargetRecord, TargetSet,
        DEFAULT_TARGET_CAPACITY,
    };
    pub use crate::sim::SimulatedSensor;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
