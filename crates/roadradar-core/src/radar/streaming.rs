//! Background stream reader
//!
//! Decodes frames the radar sends on its own (target reports while transmit
//! is enabled, late status or version replies) on a dedicated thread.
//!
//! The reader and the command client share one channel lock. The reader takes
//! it for a single frame at a time and backs off whenever a command
//! transaction is waiting, so a request and its response are never
//! interleaved with a streamed frame.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use super::parameters::Parameters;
use super::targets::{decode_targets, TargetLayout, TargetSet};
use crate::protocol::{
    ByteChannel, ClientConfig, Command, Decoded, FirmwareVersion, Frame, RadarError,
    SharedChannel, Status,
};

/// Lifecycle of a [`StreamReader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Created, not started
    Idle,
    /// Reader thread is decoding frames
    Running,
    /// Stopped by request or after a channel failure
    Stopped,
}

impl StreamState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => StreamState::Idle,
            1 => StreamState::Running,
            _ => StreamState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            StreamState::Idle => 0,
            StreamState::Running => 1,
            StreamState::Stopped => 2,
        }
    }
}

/// Decoded frame delivered to the stream handler
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Firmware version frame
    Version(FirmwareVersion),
    /// Status frame nobody was waiting for
    Status(Status),
    /// Parameter report, decoded with the report layout
    Parameters(Parameters),
    /// Target report; empty when the radar reports zero detections
    Targets(TargetSet),
}

/// Reader loop settings
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// Wait between checks while a command owns the channel
    pub poll_interval: Duration,
    /// Pause after a read timeout
    pub idle_backoff: Duration,
    /// Layout used to decode target reports
    pub target_layout: TargetLayout,
    /// Maximum targets decoded per report
    pub target_capacity: usize,
}

impl StreamSettings {
    /// Settings taken from a client configuration
    pub fn from_client_config(config: &ClientConfig, target_capacity: usize) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.stream_poll_interval_ms),
            idle_backoff: Duration::from_millis(config.idle_backoff_ms),
            target_layout: config.target_layout,
            target_capacity,
        }
    }
}

/// Background frame reader
pub struct StreamReader {
    state: Arc<AtomicU8>,
    handle: Option<JoinHandle<()>>,
}

impl StreamReader {
    /// Create a reader in the `Idle` state
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(StreamState::Idle.as_u8())),
            handle: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the loop is still running. It also stops on its own after a
    /// channel failure.
    pub fn is_running(&self) -> bool {
        self.state() == StreamState::Running
    }

    /// Spawn the reader loop
    pub(crate) fn start<C, H>(
        &mut self,
        shared: Arc<SharedChannel<C>>,
        settings: StreamSettings,
        handler: H,
    ) -> Result<(), RadarError>
    where
        C: ByteChannel + 'static,
        H: FnMut(StreamEvent) + Send + 'static,
    {
        if self
            .state
            .compare_exchange(
                StreamState::Idle.as_u8(),
                StreamState::Running.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(RadarError::AlreadyStreaming);
        }

        let state = Arc::clone(&self.state);
        let handle = thread::Builder::new()
            .name("radar-stream".to_string())
            .spawn(move || run_loop(shared, settings, state, handler))
            .map_err(|e| {
                self.state
                    .store(StreamState::Stopped.as_u8(), Ordering::Release);
                RadarError::Channel(e)
            })?;

        info!("stream reader started");
        self.handle = Some(handle);
        Ok(())
    }

    /// Stop the loop and wait for the thread to exit
    pub fn stop(&mut self) {
        self.state
            .store(StreamState::Stopped.as_u8(), Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("stream reader thread panicked");
            }
            info!("stream reader stopped");
        }
    }
}

impl Default for StreamReader {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<C, H>(
    shared: Arc<SharedChannel<C>>,
    settings: StreamSettings,
    state: Arc<AtomicU8>,
    mut handler: H,
) where
    C: ByteChannel,
    H: FnMut(StreamEvent),
{
    let running = || state.load(Ordering::Acquire) == StreamState::Running.as_u8();

    while running() {
        if shared.has_pending() {
            thread::sleep(settings.poll_interval);
            continue;
        }

        let decoded = match shared.lock() {
            Ok(mut channel) => shared.read_frame(&mut *channel),
            Err(e) => Err(e),
        };

        match decoded {
            Ok(Decoded::Valid(frame)) => {
                if let Some(event) = to_event(&frame, &settings) {
                    handler(event);
                }
            }
            Ok(Decoded::Invalid(reason)) => {
                warn!("stream: discarding invalid frame: {:?}", reason);
            }
            Err(e) if e.is_read_timeout() => {
                thread::sleep(settings.idle_backoff);
            }
            Err(e) => {
                error!("stream: channel failed, stopping reader: {}", e);
                state.store(StreamState::Stopped.as_u8(), Ordering::Release);
                break;
            }
        }
    }

    debug!("stream: loop exited");
}

fn to_event(frame: &Frame, settings: &StreamSettings) -> Option<StreamEvent> {
    match frame.command() {
        Some(Command::ReadTargetData) => {
            let targets = decode_targets(
                &frame.payload,
                settings.target_capacity,
                settings.target_layout,
            );
            if targets.is_empty() {
                debug!("stream: zero targets");
            } else {
                trace!("stream: {} targets", targets.len());
            }
            Some(StreamEvent::Targets(targets))
        }
        Some(Command::ReadVersion) => match FirmwareVersion::from_payload(&frame.payload) {
            Ok(version) => {
                info!("stream: firmware version {}", version);
                Some(StreamEvent::Version(version))
            }
            Err(e) => {
                warn!("stream: {}", e);
                None
            }
        },
        Some(Command::ReadStatus) => {
            let status = Status::from(*frame.payload.first()?);
            if status.is_success() {
                info!("stream: status OK");
            } else {
                warn!("stream: status {:?}", status);
            }
            Some(StreamEvent::Status(status))
        }
        Some(Command::ReadParameters) => match Parameters::from_report_bytes(&frame.payload) {
            Ok(params) => Some(StreamEvent::Parameters(params)),
            Err(e) => {
                warn!("stream: {}", e);
                None
            }
        },
        _ => {
            trace!("stream: ignoring frame {:#04x}", frame.command);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame;

    fn settings() -> StreamSettings {
        StreamSettings::from_client_config(&ClientConfig::default(), 35)
    }

    #[test]
    fn test_state_codes() {
        for s in [StreamState::Idle, StreamState::Running, StreamState::Stopped] {
            assert_eq!(StreamState::from_u8(s.as_u8()), s);
        }
    }

    #[test]
    fn test_new_reader_is_idle() {
        let reader = StreamReader::new();
        assert_eq!(reader.state(), StreamState::Idle);
        assert!(!reader.is_running());
    }

    #[test]
    fn test_zero_target_frame_is_an_event() {
        let frame = Frame::new(Command::ReadTargetData, Vec::new());
        assert_eq!(
            to_event(&frame, &settings()),
            Some(StreamEvent::Targets(Vec::new()))
        );
    }

    #[test]
    fn test_status_event() {
        let frame = Frame::new(Command::ReadStatus, vec![0xFF]);
        assert_eq!(
            to_event(&frame, &settings()),
            Some(StreamEvent::Status(Status::Failure))
        );

        let empty = Frame::new(Command::ReadStatus, Vec::new());
        assert_eq!(to_event(&empty, &settings()), None);
    }

    #[test]
    fn test_version_event() {
        let bytes = frame::encode(Command::ReadVersion, &[2, 0, 1]);
        let frame = frame::read_frame(&mut std::io::Cursor::new(bytes))
            .unwrap()
            .valid()
            .unwrap();
        assert_eq!(
            to_event(&frame, &settings()),
            Some(StreamEvent::Version(FirmwareVersion::new(2, 0, 1)))
        );
    }

    #[test]
    fn test_unknown_frames_ignored() {
        let frame = Frame::with_code(0x77, vec![1, 2]);
        assert_eq!(to_event(&frame, &settings()), None);
    }
}
