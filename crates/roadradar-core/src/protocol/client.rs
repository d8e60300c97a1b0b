//! Command/response client
//!
//! Writes request frames and waits for the correlated response. The channel
//! is half-duplex and shared with the stream reader, so every transaction
//! holds the channel lock from the write until the response (or the end of
//! the attempt budget).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use super::frame::{self, Decoded, Frame, MAX_FRAME_PAYLOAD};
use super::{ByteChannel, Command, RadarError, Status, DEFAULT_MAX_ATTEMPTS, MAX_PAYLOAD_SIZE};
use crate::radar::{TargetLayout, DEFAULT_TARGET_CAPACITY};

/// Command client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Frame reads spent waiting for a response before giving up
    pub max_attempts: u32,
    /// How often the stream reader rechecks while a command owns the channel
    pub stream_poll_interval_ms: u64,
    /// Stream reader pause after a read timeout
    pub idle_backoff_ms: u64,
    /// Target record layout of the connected firmware
    pub target_layout: TargetLayout,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            stream_poll_interval_ms: 50,
            idle_backoff_ms: 10,
            target_layout: TargetLayout::COMPACT,
        }
    }
}

impl ClientConfig {
    /// Largest payload accepted from the device.
    ///
    /// A full target report in the configured layout always fits, even when
    /// the layout's offset pushes it past [`MAX_PAYLOAD_SIZE`].
    pub fn max_payload_size(&self) -> usize {
        self.target_layout
            .report_size(DEFAULT_TARGET_CAPACITY)
            .clamp(MAX_PAYLOAD_SIZE, MAX_FRAME_PAYLOAD)
    }
}

/// Snapshot of frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientCounters {
    /// Request frames written
    pub tx_frames: u64,
    /// Frames that passed validation
    pub rx_frames: u64,
    /// Frames discarded for a bad header, length or checksum
    pub invalid_frames: u64,
}

/// Channel plus the bookkeeping shared by the client and the stream reader
pub(crate) struct SharedChannel<C> {
    channel: Mutex<C>,
    /// Transactions waiting for or holding the channel
    pending: AtomicUsize,
    max_payload: usize,
    tx_frames: AtomicU64,
    rx_frames: AtomicU64,
    invalid_frames: AtomicU64,
}

impl<C: ByteChannel> SharedChannel<C> {
    pub(crate) fn new(channel: C, max_payload: usize) -> Self {
        Self {
            channel: Mutex::new(channel),
            pending: AtomicUsize::new(0),
            max_payload,
            tx_frames: AtomicU64::new(0),
            rx_frames: AtomicU64::new(0),
            invalid_frames: AtomicU64::new(0),
        }
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, C>, RadarError> {
        self.channel.lock().map_err(|_| RadarError::LockPoisoned)
    }

    /// Whether a command transaction wants the channel
    pub(crate) fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) > 0
    }

    fn begin(&self) -> PendingGuard<'_> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        PendingGuard(&self.pending)
    }

    /// Decode one frame, updating the counters
    pub(crate) fn read_frame(&self, channel: &mut C) -> Result<Decoded, RadarError> {
        let decoded = frame::read_frame_limited(channel, self.max_payload)?;
        match &decoded {
            Decoded::Valid(_) => self.rx_frames.fetch_add(1, Ordering::Relaxed),
            Decoded::Invalid(_) => self.invalid_frames.fetch_add(1, Ordering::Relaxed),
        };
        Ok(decoded)
    }

    fn counters(&self) -> ClientCounters {
        ClientCounters {
            tx_frames: self.tx_frames.load(Ordering::Relaxed),
            rx_frames: self.rx_frames.load(Ordering::Relaxed),
            invalid_frames: self.invalid_frames.load(Ordering::Relaxed),
        }
    }
}

struct PendingGuard<'a>(&'a AtomicUsize);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Issues commands and correlates responses
pub struct CommandClient<C> {
    shared: Arc<SharedChannel<C>>,
    config: ClientConfig,
}

impl<C: ByteChannel> CommandClient<C> {
    /// Create a client owning the given channel
    pub fn new(channel: C, config: ClientConfig) -> Self {
        let shared = SharedChannel::new(channel, config.max_payload_size());
        Self::from_shared(Arc::new(shared), config)
    }

    pub(crate) fn from_shared(shared: Arc<SharedChannel<C>>, config: ClientConfig) -> Self {
        Self { shared, config }
    }

    pub(crate) fn shared(&self) -> &Arc<SharedChannel<C>> {
        &self.shared
    }

    /// Configuration the client was created with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Cumulative frame counters for this channel
    pub fn counters(&self) -> ClientCounters {
        self.shared.counters()
    }

    /// Run a closure with exclusive access to the channel
    pub fn with_channel<T>(&self, f: impl FnOnce(&mut C) -> T) -> Result<T, RadarError> {
        let _pending = self.shared.begin();
        let mut channel = self.shared.lock()?;
        Ok(f(&mut *channel))
    }

    fn attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Send a request and wait for its response frame.
    ///
    /// Each frame read is one attempt, whether it yields the expected frame,
    /// an unrelated frame, an invalid frame or a read timeout. Transport
    /// errors other than read timeouts are returned immediately.
    pub fn send_command(&self, command: Command, payload: &[u8]) -> Result<Frame, RadarError> {
        let expected = command.expected_response().ok_or_else(|| {
            RadarError::InvalidArgument(format!("{:?} is not a request command", command))
        })?;
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(RadarError::InvalidArgument(format!(
                "{} payload bytes do not fit a frame",
                payload.len()
            )));
        }

        let _pending = self.shared.begin();
        let mut channel = self.shared.lock()?;

        let bytes = frame::encode(command, payload);
        debug!("send_command: {:?} -> {:02x?}", command, bytes);
        channel.write_all(&bytes)?;
        channel.flush()?;
        self.shared.tx_frames.fetch_add(1, Ordering::Relaxed);

        self.await_locked(&mut *channel, expected)
    }

    /// Send a configuration command answered by `READ_STATUS`
    pub fn send_status_command(&self, command: Command, payload: &[u8]) -> Result<(), RadarError> {
        let frame = self.send_command(command, payload)?;
        let status = frame
            .payload
            .first()
            .copied()
            .map(Status::from)
            .ok_or(RadarError::MalformedResponse {
                command: Command::ReadStatus,
                reason: "empty status payload",
            })?;

        if status.is_success() {
            debug!("send_status_command: {:?} accepted", command);
            Ok(())
        } else {
            warn!("send_status_command: {:?} rejected ({:?})", command, status);
            Err(RadarError::DeviceFailure {
                command,
                status: status.byte(),
            })
        }
    }

    /// Wait for an unsolicited frame, e.g. a target report
    pub fn await_frame(&self, expected: Command) -> Result<Frame, RadarError> {
        let _pending = self.shared.begin();
        let mut channel = self.shared.lock()?;
        self.await_locked(&mut *channel, expected)
    }

    fn await_locked(&self, channel: &mut C, expected: Command) -> Result<Frame, RadarError> {
        let attempts = self.attempts();

        for attempt in 1..=attempts {
            match self.shared.read_frame(channel) {
                Ok(Decoded::Valid(frame)) if frame.is(expected) => {
                    debug!(
                        "await: got {:?} ({} bytes) on attempt {}",
                        expected,
                        frame.payload.len(),
                        attempt
                    );
                    return Ok(frame);
                }
                Ok(Decoded::Valid(frame)) => {
                    trace!(
                        "await: skipping frame {:#04x} while waiting for {:?}",
                        frame.command,
                        expected
                    );
                }
                Ok(Decoded::Invalid(reason)) => {
                    warn!("await: discarding invalid frame: {:?}", reason);
                }
                Err(e) if e.is_read_timeout() => {
                    trace!("await: read timeout on attempt {}", attempt);
                }
                Err(e) => return Err(e),
            }
        }

        debug!("await: no {:?} after {} attempts", expected, attempts);
        Err(RadarError::Timeout { expected, attempts })
    }
}

impl<C> std::fmt::Debug for CommandClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandClient")
            .field("config", &self.config)
            .finish()
    }
}
