//! Firmware transfer state machine.
//!
//! ```text
//! Idle -> AwaitingHeaderAck -> [AwaitingCrcAck] -> SendingChunk(0)
//!      -> AwaitingChunkAck(0, 1..=3) -> SendingChunk(1) -> ...
//!      -> SendingEnd -> Complete
//! ```
//!
//! Any unrecoverable step moves the session to `Failed` and aborts the rest
//! of the transfer. Header and CRC frames get exactly one attempt; data
//! chunks are retried on NAK or timeout. The end marker is not acknowledged
//! by the bootloader and is not waited for.

use {
    crate::{
        error::{Error, Result},
        link::{Channel, Link},
        protocol::{Frame, FrameType, MAX_PAYLOAD, crc32},
    },
    log::{debug, info, warn},
    std::{
        fmt,
        time::{Duration, Instant},
    },
};

/// Wait for the header and CRC acknowledgements.
pub const HEADER_ACK_TIMEOUT: Duration = Duration::from_millis(5000);

/// Wait for each data chunk acknowledgement.
pub const CHUNK_ACK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Transmissions per data chunk before the transfer is abandoned.
pub const MAX_CHUNK_ATTEMPTS: u32 = 3;

/// Number of chunks addressable before the 16-bit sequence wraps.
const SEQUENCE_SPACE: usize = 1 << 16;

/// Transfer parameters.
#[derive(Debug, Clone)]
pub struct FlashConfig {
    /// Send the image CRC-32 after the size header.
    pub use_crc: bool,
    /// Acknowledgement timeout for the header and CRC frames.
    pub header_timeout: Duration,
    /// Acknowledgement timeout for each data chunk.
    pub chunk_timeout: Duration,
    /// Transmissions per data chunk.
    pub max_attempts: u32,
    /// Largest image accepted, if the target's flash size is known.
    pub max_image_size: Option<usize>,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            use_crc: true,
            header_timeout: HEADER_ACK_TIMEOUT,
            chunk_timeout: CHUNK_ACK_TIMEOUT,
            max_attempts: MAX_CHUNK_ATTEMPTS,
            max_image_size: None,
        }
    }
}

impl FlashConfig {
    /// Enable or disable the CRC header.
    #[must_use]
    pub fn with_crc(mut self, use_crc: bool) -> Self {
        self.use_crc = use_crc;
        self
    }

    /// Set the per-chunk acknowledgement timeout.
    #[must_use]
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    /// Set the header/CRC acknowledgement timeout.
    #[must_use]
    pub fn with_header_timeout(mut self, timeout: Duration) -> Self {
        self.header_timeout = timeout;
        self
    }

    /// Reject images larger than `max` bytes.
    #[must_use]
    pub fn with_max_image_size(mut self, max: usize) -> Self {
        self.max_image_size = Some(max);
        self
    }
}

/// Where a transfer currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashState {
    /// Nothing sent yet.
    Idle,
    /// Size header sent.
    AwaitingHeaderAck,
    /// CRC header sent.
    AwaitingCrcAck,
    /// About to send chunk `i`.
    SendingChunk(usize),
    /// Chunk `index` sent for the `attempt`-th time.
    AwaitingChunkAck {
        /// Zero-based chunk index.
        index: usize,
        /// One-based attempt number.
        attempt: u32,
    },
    /// Sending the end marker.
    SendingEnd,
    /// Transfer finished.
    Complete,
    /// Transfer abandoned.
    Failed(String),
}

impl fmt::Display for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AwaitingHeaderAck => write!(f, "waiting for header ACK"),
            Self::AwaitingCrcAck => write!(f, "waiting for CRC ACK"),
            Self::SendingChunk(i) => write!(f, "sending chunk {i}"),
            Self::AwaitingChunkAck { index, attempt } => {
                write!(f, "waiting for chunk {index} ACK (attempt {attempt})")
            },
            Self::SendingEnd => write!(f, "sending end marker"),
            Self::Complete => write!(f, "complete"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Percentage reported before chunk `index` of `total`.
fn chunk_progress(index: usize, total: usize) -> u8 {
    // round(index / total * 90) + 5, capped at 95
    let scaled = (index * 180 + total) / (2 * total);
    u8::try_from((scaled + 5).min(95)).unwrap_or(95)
}

/// One firmware transfer over an exclusively held link.
pub struct FlashSession<'a> {
    channel: Channel<'a>,
    config: FlashConfig,
    state: FlashState,
    percent: u8,
}

impl<'a> FlashSession<'a> {
    /// Claim the link for a transfer.
    ///
    /// Fails with [`Error::Busy`] while another session holds the link.
    pub fn new(link: &'a Link, config: FlashConfig) -> Result<Self> {
        Ok(Self {
            channel: link.channel()?,
            config,
            state: FlashState::Idle,
            percent: 0,
        })
    }

    /// Current state.
    pub fn state(&self) -> &FlashState {
        &self.state
    }

    /// Transfer `firmware` to the bootloader.
    ///
    /// `progress` receives a percentage and the state it was reached in.
    /// A session runs once; create a new one for the next transfer.
    pub fn run<F>(&mut self, firmware: &[u8], mut progress: F) -> Result<()>
    where
        F: FnMut(u8, &FlashState),
    {
        if self.state != FlashState::Idle {
            return Err(Error::Protocol(format!(
                "flash session already used ({})",
                self.state
            )));
        }

        let result = self.transfer(firmware, &mut progress);
        if let Err(ref e) = result {
            warn!("Flash failed: {e}");
            self.state = FlashState::Failed(e.to_string());
            progress(self.percent, &self.state);
        }
        result
    }

    fn report(&mut self, percent: u8, progress: &mut dyn FnMut(u8, &FlashState)) {
        self.percent = percent;
        progress(percent, &self.state);
    }

    fn validate(&self, firmware: &[u8]) -> Result<u32> {
        if firmware.is_empty() {
            return Err(Error::InvalidFirmware("image is empty".into()));
        }

        let len = u32::try_from(firmware.len()).map_err(|_| {
            Error::InvalidFirmware(format!(
                "image of {} bytes does not fit the 32-bit size field",
                firmware.len()
            ))
        })?;

        if let Some(max) = self.config.max_image_size {
            if firmware.len() > max {
                return Err(Error::InvalidFirmware(format!(
                    "image of {} bytes exceeds the {max}-byte limit",
                    firmware.len()
                )));
            }
        }

        Ok(len)
    }

    fn transfer(
        &mut self,
        firmware: &[u8],
        progress: &mut dyn FnMut(u8, &FlashState),
    ) -> Result<()> {
        let len = self.validate(firmware)?;
        let total = firmware.len().div_ceil(MAX_PAYLOAD);
        if total > SEQUENCE_SPACE {
            warn!("Image spans {total} chunks; chunk sequence numbers will wrap");
        }
        info!(
            "Flashing {len} bytes in {total} chunks (CRC {})",
            if self.config.use_crc { "on" } else { "off" }
        );
        self.report(0, progress);

        self.state = FlashState::AwaitingHeaderAck;
        self.channel
            .send(&Frame::size_header(len))?;
        self.await_ack(self.config.header_timeout)?;
        debug!("Size header acknowledged");
        self.report(5, progress);

        if self.config.use_crc {
            let crc = crc32(firmware);
            debug!("Image CRC-32: 0x{crc:08X}");
            self.state = FlashState::AwaitingCrcAck;
            self.channel
                .send(&Frame::crc_header(crc))?;
            self.await_ack(self.config.header_timeout)?;
            debug!("CRC header acknowledged");
        }

        for (index, chunk) in firmware
            .chunks(MAX_PAYLOAD)
            .enumerate()
        {
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }
            self.state = FlashState::SendingChunk(index);
            self.report(chunk_progress(index, total), progress);
            self.send_chunk(index, chunk)?;
        }

        self.state = FlashState::SendingEnd;
        self.report(95, progress);
        self.channel.send(&Frame::end())?;

        self.state = FlashState::Complete;
        self.report(100, progress);
        info!("Flash complete");
        Ok(())
    }

    fn send_chunk(&mut self, index: usize, chunk: &[u8]) -> Result<()> {
        // Sequence numbers wrap like the bootloader's own counter.
        #[allow(clippy::cast_possible_truncation)]
        let frame = Frame::data_chunk(index as u16, chunk)?;
        let attempts = self.config.max_attempts.max(1);

        let mut last_error = None;
        for attempt in 1..=attempts {
            self.state = FlashState::AwaitingChunkAck { index, attempt };
            self.channel.send(&frame)?;

            match self.await_ack(self.config.chunk_timeout) {
                Ok(_) => return Ok(()),
                Err(e @ (Error::Nak { .. } | Error::Timeout(_))) => {
                    warn!("Chunk {index} attempt {attempt}/{attempts}: {e}");
                    last_error = Some(e);
                },
                Err(e) => return Err(e),
            }
        }

        Err(Error::ChunkFailed {
            index,
            attempts,
            source: Box::new(
                last_error.unwrap_or_else(|| Error::Timeout("no ACK".into())),
            ),
        })
    }

    /// Wait for an ACK with an all-zero tail and return its sequence number.
    ///
    /// The sequence number is not checked against what was sent.
    fn await_ack(&mut self, timeout: Duration) -> Result<u16> {
        let deadline = Instant::now() + timeout;

        while let Some(raw) = self.channel.recv(deadline) {
            let frame = match Frame::decode(&raw) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("Discarding frame: {e}");
                    continue;
                },
            };

            match frame.frame_type() {
                FrameType::Ack if frame.has_empty_tail() => return Ok(frame.sequence()),
                FrameType::Nak if frame.has_empty_tail() => {
                    return Err(Error::Nak {
                        seq: frame.sequence(),
                    });
                },
                _ => debug!("Discarding {frame} while waiting for ACK"),
            }
        }

        Err(Error::Timeout(format!(
            "no ACK within {} ms",
            timeout.as_millis()
        )))
    }
}
