//! Wire-level radar simulator
//!
//! [`SimulatedSensor`] is a [`ByteChannel`] that parses the request frames
//! written to it and queues the replies a real radar would send, including
//! streamed target reports while transmit is enabled. It exercises the full
//! codec path, unlike [`crate::demo::DemoRadar`].

use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use tracing::{debug, trace};

use crate::demo::TargetGenerator;
use crate::protocol::frame::{self, HEADER_1};
use crate::protocol::{
    ByteChannel, Command, DataFrequency, Decoded, FirmwareVersion, Frame, Status, ZeroReport,
};
use crate::radar::{
    encode_targets, pack, unpack, ParameterLayout, Parameters, TargetLayout, TargetRecord,
    DEFAULT_TARGET_CAPACITY,
};

/// Simulated radar speaking the serial protocol
pub struct SimulatedSensor {
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
    received: Vec<Frame>,

    version: FirmwareVersion,
    parameters: Parameters,
    target_number: u8,
    frequency: DataFrequency,
    zero_report: ZeroReport,
    transmitting: bool,

    layout: TargetLayout,
    generator: TargetGenerator,
    scripted: VecDeque<Vec<TargetRecord>>,

    reject: bool,
    silent: bool,
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSensor {
    /// Sensor with random targets and factory defaults
    pub fn new() -> Self {
        Self::with_generator(TargetGenerator::new())
    }

    /// Sensor drawing unscripted reports from `generator`
    pub fn with_generator(generator: TargetGenerator) -> Self {
        Self {
            inbox: Vec::new(),
            outbox: VecDeque::new(),
            received: Vec::new(),
            version: FirmwareVersion::new(1, 0, 0),
            parameters: Parameters::default(),
            target_number: DEFAULT_TARGET_CAPACITY as u8,
            frequency: DataFrequency::default(),
            zero_report: ZeroReport::Report,
            transmitting: false,
            layout: TargetLayout::COMPACT,
            generator,
            scripted: VecDeque::new(),
            reject: false,
            silent: false,
        }
    }

    /// Report this firmware version
    pub fn with_version(mut self, version: FirmwareVersion) -> Self {
        self.version = version;
        self
    }

    /// Encode target reports with this layout
    pub fn with_layout(mut self, layout: TargetLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Answer every configuration command with `FAILURE`
    pub fn reject_commands(&mut self, reject: bool) {
        self.reject = reject;
    }

    /// Stop answering and streaming altogether
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Queue raw bytes ahead of whatever the sensor sends next
    pub fn inject_noise(&mut self, bytes: &[u8]) {
        self.outbox.extend(bytes);
    }

    /// Queue an arbitrary frame for the host to read
    pub fn push_frame(&mut self, command: Command, payload: &[u8]) {
        self.outbox.extend(frame::encode(command, payload));
    }

    /// Stream these records in the next target report instead of random ones
    pub fn script_targets(&mut self, targets: Vec<TargetRecord>) {
        self.scripted.push_back(targets);
    }

    /// Valid request frames received so far
    pub fn received(&self) -> &[Frame] {
        &self.received
    }

    /// Envelope as last written by the host
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Target number as last written by the host
    pub fn target_number(&self) -> u8 {
        self.target_number
    }

    /// Report rate as last written by the host
    pub fn frequency(&self) -> DataFrequency {
        self.frequency
    }

    /// Zero-report mode as last written by the host
    pub fn zero_report(&self) -> ZeroReport {
        self.zero_report
    }

    /// Whether the host enabled data transmit
    pub fn is_transmitting(&self) -> bool {
        self.transmitting
    }

    fn reply_status(&mut self, ok: bool) {
        let status = if ok { Status::Success } else { Status::Failure };
        self.push_frame(Command::ReadStatus, &[status.byte()]);
    }

    fn handle(&mut self, request: Frame) {
        let command = request.command();
        debug!("sim: received {:?} {:02x?}", command, request.payload);
        self.received.push(request.clone());

        if self.silent {
            return;
        }

        let Some(command) = command else {
            return;
        };
        if self.reject && command.expects_status() {
            self.reply_status(false);
            return;
        }

        let arg = request.payload.first().copied();
        match command {
            Command::RequestVersion => {
                let payload = self.version.to_payload();
                self.push_frame(Command::ReadVersion, &payload);
            }
            Command::GetParameters => {
                let payload = pack(&self.parameters, ParameterLayout::Report);
                self.push_frame(Command::ReadParameters, &payload);
            }
            Command::SetParameters => match unpack(&request.payload, ParameterLayout::Request) {
                Ok(params) => {
                    self.parameters = params;
                    self.reply_status(true);
                }
                Err(_) => self.reply_status(false),
            },
            Command::SetTargetNum => match arg {
                Some(n) => {
                    self.target_number = n;
                    self.reply_status(true);
                }
                None => self.reply_status(false),
            },
            Command::SetDataFreq => match arg.map(DataFrequency::from_code) {
                Some(Ok(freq)) => {
                    self.frequency = freq;
                    self.reply_status(true);
                }
                _ => self.reply_status(false),
            },
            Command::SetZeroReport => match arg.and_then(ZeroReport::from_byte) {
                Some(mode) => {
                    self.zero_report = mode;
                    self.reply_status(true);
                }
                None => self.reply_status(false),
            },
            Command::EnableTransmit => {
                self.transmitting = true;
                self.reply_status(true);
            }
            Command::DisableTransmit => {
                self.transmitting = false;
                self.reply_status(true);
            }
            Command::ReadVersion
            | Command::ReadParameters
            | Command::ReadTargetData
            | Command::ReadStatus => {
                trace!("sim: ignoring device-to-host command {:?}", command);
            }
        }
    }

    /// Parse every complete frame sitting in the inbox
    fn drain_inbox(&mut self) {
        loop {
            let mut cursor = Cursor::new(self.inbox.as_slice());
            match frame::read_frame(&mut cursor) {
                Ok(decoded) => {
                    let consumed = cursor.position() as usize;
                    self.inbox.drain(..consumed);
                    match decoded {
                        Decoded::Valid(request) => self.handle(request),
                        Decoded::Invalid(reason) => {
                            debug!("sim: dropping invalid request: {:?}", reason)
                        }
                    }
                }
                Err(_) => {
                    // Incomplete frame; drop any noise before its header and wait
                    match self.inbox.iter().position(|b| *b == HEADER_1) {
                        Some(start) => {
                            self.inbox.drain(..start);
                        }
                        None => self.inbox.clear(),
                    }
                    return;
                }
            }
        }
    }

    /// Queue one target report if the sensor is streaming
    fn emit_report(&mut self) {
        if !self.transmitting || self.silent {
            return;
        }

        let targets = match self.scripted.pop_front() {
            Some(targets) => targets,
            None => self
                .generator
                .frame(self.target_number as usize, &self.parameters),
        };
        if targets.is_empty() && self.zero_report == ZeroReport::NotReport {
            return;
        }

        let payload = encode_targets(&targets, self.layout);
        self.push_frame(Command::ReadTargetData, &payload);
    }
}

impl Read for SimulatedSensor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.outbox.is_empty() {
            self.emit_report();
        }
        if self.outbox.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "simulated read timeout"));
        }

        let n = buf.len().min(self.outbox.len());
        for (slot, b) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}

impl Write for SimulatedSensor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inbox.extend_from_slice(buf);
        self.drain_inbox();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ByteChannel for SimulatedSensor {
    fn clear_input(&mut self) -> io::Result<()> {
        self.outbox.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn read_reply(sensor: &mut SimulatedSensor) -> Frame {
        frame::read_frame(sensor).unwrap().valid().unwrap()
    }

    #[test]
    fn test_version_reply() {
        let mut sensor = SimulatedSensor::new().with_version(FirmwareVersion::new(1, 2, 3));
        sensor
            .write_all(&frame::encode(Command::RequestVersion, &[]))
            .unwrap();

        let reply = read_reply(&mut sensor);
        assert!(reply.is(Command::ReadVersion));
        assert_eq!(reply.payload, vec![1, 2, 3]);
    }

    #[test]
    fn test_request_split_across_writes() {
        let mut sensor = SimulatedSensor::new();
        let bytes = frame::encode(Command::SetTargetNum, &[7]);
        sensor.write_all(&[0x00, 0x13]).unwrap();
        sensor.write_all(&bytes[..3]).unwrap();
        assert!(sensor.received().is_empty());

        sensor.write_all(&bytes[3..]).unwrap();
        assert_eq!(sensor.target_number(), 7);
        assert_eq!(read_reply(&mut sensor).payload, vec![Status::SUCCESS]);
    }

    #[test]
    fn test_rejects_configuration() {
        let mut sensor = SimulatedSensor::new();
        sensor.reject_commands(true);
        sensor
            .write_all(&frame::encode(Command::EnableTransmit, &[]))
            .unwrap();
        assert_eq!(read_reply(&mut sensor).payload, vec![Status::FAILURE]);
        assert!(!sensor.is_transmitting());
    }

    #[test]
    fn test_invalid_frequency_fails() {
        let mut sensor = SimulatedSensor::new();
        sensor
            .write_all(&frame::encode(Command::SetDataFreq, &[0x0B]))
            .unwrap();
        assert_eq!(read_reply(&mut sensor).payload, vec![Status::FAILURE]);
        assert_eq!(sensor.frequency(), DataFrequency::HZ_1);
    }

    #[test]
    fn test_silent_sensor_times_out() {
        let mut sensor = SimulatedSensor::new();
        sensor.set_silent(true);
        sensor
            .write_all(&frame::encode(Command::RequestVersion, &[]))
            .unwrap();
        let err = frame::read_frame(&mut sensor).unwrap_err();
        assert!(err.is_read_timeout());
        assert_eq!(sensor.received().len(), 1);
    }

    #[test]
    fn test_streams_scripted_targets() {
        let mut sensor = SimulatedSensor::new();
        sensor
            .write_all(&frame::encode(Command::EnableTransmit, &[]))
            .unwrap();
        read_reply(&mut sensor);

        let record = TargetRecord {
            id: 1,
            distance: 4.5,
            speed: 1.5,
            angle: 10.0,
            snr: 30.0,
        };
        sensor.script_targets(vec![record]);
        let report = read_reply(&mut sensor);
        assert!(report.is(Command::ReadTargetData));
        assert_eq!(report.payload.len(), 9);
    }

    #[test]
    fn test_no_zero_reports_when_disabled() {
        let mut sensor = SimulatedSensor::new();
        for request in [
            frame::encode(Command::SetZeroReport, &[0xFF]),
            frame::encode(Command::EnableTransmit, &[]),
        ] {
            sensor.write_all(&request).unwrap();
            read_reply(&mut sensor);
        }

        sensor.script_targets(Vec::new());
        let err = frame::read_frame(&mut sensor).unwrap_err();
        assert!(err.is_read_timeout());
    }

    #[test]
    fn test_zero_report_frame() {
        let mut sensor = SimulatedSensor::new();
        sensor
            .write_all(&frame::encode(Command::EnableTransmit, &[]))
            .unwrap();
        read_reply(&mut sensor);

        sensor.script_targets(Vec::new());
        let report = read_reply(&mut sensor);
        assert!(report.is(Command::ReadTargetData));
        assert!(report.payload.is_empty());
    }

    #[test]
    fn test_parameters_reported_swapped() {
        let mut sensor = SimulatedSensor::new();
        let params = Parameters {
            min_distance: 2.0,
            max_distance: 10.0,
            ..Default::default()
        };
        sensor
            .write_all(&frame::encode(
                Command::SetParameters,
                &params.to_request_bytes(),
            ))
            .unwrap();
        read_reply(&mut sensor);
        assert_eq!(sensor.parameters(), &params);

        sensor
            .write_all(&frame::encode(Command::GetParameters, &[]))
            .unwrap();
        let reply = read_reply(&mut sensor);
        assert_eq!(&reply.payload[0..4], &10.0f32.to_le_bytes());
        assert_eq!(Parameters::from_report_bytes(&reply.payload).unwrap(), params);
    }
}
