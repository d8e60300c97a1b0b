//! Radar capabilities
//!
//! [`RadarDevice`] is the operation set a front-end talks to. [`Radar`] drives
//! real hardware (or any [`ByteChannel`]) through the command client;
//! [`crate::demo::DemoRadar`] produces synthetic data without a wire.

mod parameters;
mod streaming;
mod targets;

pub use parameters::{pack, unpack, ParameterLayout, Parameters, PARAMETERS_SIZE};
pub use streaming::{StreamEvent, StreamReader, StreamSettings, StreamState};
pub use targets::{
    decode_targets, encode_targets, TargetLayout, TargetRecord, TargetSet, MEASUREMENT_SCALE,
};

use tracing::{debug, info};

use crate::protocol::{
    open_port, ByteChannel, ClientConfig, ClientCounters, Command, CommandClient, DataFrequency,
    FirmwareVersion, PortConfig, RadarError, SerialChannel, ZeroReport,
};

/// Upper bound on targets the radar reports in one frame
pub const DEFAULT_TARGET_CAPACITY: usize = 35;

/// Operations exposed by a radar, real or simulated
pub trait RadarDevice {
    /// Ask for the firmware version
    fn get_firmware_version(&mut self) -> Result<FirmwareVersion, RadarError>;

    /// Write the detection envelope
    fn set_parameters(&mut self, params: &Parameters) -> Result<(), RadarError>;

    /// Read back the detection envelope
    fn get_parameters(&mut self) -> Result<Parameters, RadarError>;

    /// Whether this is a count or a highest id is unresolved, see
    /// [`crate::protocol::TARGET_NUMBER_MEANING`]
    fn set_target_number(&mut self, number: u8) -> Result<(), RadarError>;

    /// Wait for the next target report and decode at most `capacity` records.
    ///
    /// An empty set is a valid "nothing detected" report.
    fn get_target_data(&mut self, capacity: usize) -> Result<TargetSet, RadarError>;

    /// Start streaming target reports
    fn enable_data_transmit(&mut self) -> Result<(), RadarError>;

    /// Stop streaming target reports
    fn disable_data_transmit(&mut self) -> Result<(), RadarError>;

    /// Set the report rate
    fn set_data_transmit_frequency(&mut self, frequency: DataFrequency) -> Result<(), RadarError>;

    /// Choose whether reports with zero detections are sent
    fn set_zero_data_reporting(&mut self, enabled: bool) -> Result<(), RadarError>;
}

/// Radar driven over a byte channel
pub struct Radar<C: ByteChannel> {
    client: CommandClient<C>,
    stream: StreamReader,
    target_capacity: usize,
}

impl Radar<SerialChannel> {
    /// Open the serial port and wrap it in a radar client
    pub fn open(port: &PortConfig, config: ClientConfig) -> Result<Self, RadarError> {
        let channel = open_port(port)?;
        info!("Opened radar on {}", port.name);
        Ok(Self::new(channel, config))
    }
}

impl<C: ByteChannel> Radar<C> {
    /// Radar over any byte channel
    pub fn new(channel: C, config: ClientConfig) -> Self {
        Self::from_client(CommandClient::new(channel, config))
    }

    /// Radar around an existing command client
    pub fn from_client(client: CommandClient<C>) -> Self {
        Self {
            client,
            stream: StreamReader::new(),
            target_capacity: DEFAULT_TARGET_CAPACITY,
        }
    }

    /// Limit the number of targets decoded from streamed reports
    pub fn with_target_capacity(mut self, capacity: usize) -> Self {
        self.target_capacity = capacity;
        self
    }

    /// Underlying command client
    pub fn client(&self) -> &CommandClient<C> {
        &self.client
    }

    /// Frame counters, stream reads included
    pub fn counters(&self) -> ClientCounters {
        self.client.counters()
    }

    /// Lifecycle state of the stream reader
    pub fn stream_state(&self) -> StreamState {
        self.stream.state()
    }

    /// Whether the stream reader is running
    pub fn is_streaming(&self) -> bool {
        self.stream.is_running()
    }

    /// Stop streaming, if running, and hand back the command client
    pub fn into_client(mut self) -> CommandClient<C> {
        self.stream.stop();
        let Radar { client, .. } = self;
        client
    }
}

impl<C: ByteChannel + 'static> Radar<C> {
    /// Start decoding unsolicited frames on a background thread.
    ///
    /// Commands stay usable while streaming; the reader yields the channel to
    /// them. A stopped reader can't be restarted, `start_streaming` replaces
    /// it with a fresh one.
    pub fn start_streaming<H>(&mut self, handler: H) -> Result<(), RadarError>
    where
        H: FnMut(StreamEvent) + Send + 'static,
    {
        if self.stream.is_running() {
            return Err(RadarError::AlreadyStreaming);
        }
        if self.stream.state() == StreamState::Stopped {
            self.stream = StreamReader::new();
        }

        let settings = StreamSettings::from_client_config(self.client.config(), self.target_capacity);
        self.stream
            .start(self.client.shared().clone(), settings, handler)
    }

    /// Stop the stream reader and wait for its thread. No-op when idle
    pub fn stop_streaming(&mut self) {
        self.stream.stop();
    }
}

impl<C: ByteChannel> RadarDevice for Radar<C> {
    fn get_firmware_version(&mut self) -> Result<FirmwareVersion, RadarError> {
        let frame = self.client.send_command(Command::RequestVersion, &[])?;
        let version = FirmwareVersion::from_payload(&frame.payload)?;
        info!("Radar firmware {}", version);
        Ok(version)
    }

    fn set_parameters(&mut self, params: &Parameters) -> Result<(), RadarError> {
        debug!("set_parameters: {:?}", params);
        self.client
            .send_status_command(Command::SetParameters, &params.to_request_bytes())
    }

    fn get_parameters(&mut self) -> Result<Parameters, RadarError> {
        let frame = self.client.send_command(Command::GetParameters, &[])?;
        Parameters::from_report_bytes(&frame.payload)
    }

    fn set_target_number(&mut self, number: u8) -> Result<(), RadarError> {
        self.client
            .send_status_command(Command::SetTargetNum, &[number])
    }

    fn get_target_data(&mut self, capacity: usize) -> Result<TargetSet, RadarError> {
        let frame = self.client.await_frame(Command::ReadTargetData)?;
        Ok(decode_targets(
            &frame.payload,
            capacity,
            self.client.config().target_layout,
        ))
    }

    fn enable_data_transmit(&mut self) -> Result<(), RadarError> {
        self.client
            .send_status_command(Command::EnableTransmit, &[])
    }

    fn disable_data_transmit(&mut self) -> Result<(), RadarError> {
        self.client
            .send_status_command(Command::DisableTransmit, &[])
    }

    fn set_data_transmit_frequency(&mut self, frequency: DataFrequency) -> Result<(), RadarError> {
        self.client
            .send_status_command(Command::SetDataFreq, &[frequency.code()])
    }

    fn set_zero_data_reporting(&mut self, enabled: bool) -> Result<(), RadarError> {
        self.client
            .send_status_command(Command::SetZeroReport, &[ZeroReport::from(enabled).byte()])
    }
}

impl<C: ByteChannel> std::fmt::Debug for Radar<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Radar")
            .field("client", &self.client)
            .field("stream", &self.stream.state())
            .field("target_capacity", &self.target_capacity)
            .finish()
    }
}
