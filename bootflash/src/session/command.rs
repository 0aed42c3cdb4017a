//! Identity queries.
//!
//! Each query is an independent round trip: one Info request out, the first
//! Info frame back is the answer. A missing answer is not an error; the
//! corresponding field is simply unknown.

use {
    crate::{
        error::Result,
        link::{Channel, Link},
        protocol::{Frame, FrameType},
    },
    byteorder::{ByteOrder, LittleEndian},
    log::debug,
    std::{
        fmt,
        time::{Duration, Instant},
    },
};

/// Default wait for an identity response.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(5000);

/// Identity query selector carried in the Info request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoCommand {
    /// Bootloader version (`major`, `minor`).
    Version,
    /// Product series as a little-endian `u32`.
    ProductSeries,
    /// Product id as a little-endian `u32`.
    ProductId,
}

impl InfoCommand {
    /// Command id on the wire.
    pub fn id(self) -> u8 {
        match self {
            Self::Version => 1,
            Self::ProductSeries => 2,
            Self::ProductId => 3,
        }
    }
}

/// Bootloader version as reported by [`InfoCommand::Version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BootloaderVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
}

impl BootloaderVersion {
    /// Parse from a response payload; needs at least two bytes.
    pub fn from_response(data: &[u8]) -> Option<Self> {
        match data {
            [major, minor, ..] => Some(Self {
                major: *major,
                minor: *minor,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for BootloaderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Identity of the connected bootloader. Absent fields were not answered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BootloaderInfo {
    /// Bootloader version.
    pub version: Option<BootloaderVersion>,
    /// Product series.
    pub product_series: Option<u32>,
    /// Product id.
    pub product_id: Option<u32>,
}

fn word_from_response(data: &[u8]) -> Option<u32> {
    (data.len() >= 4).then(|| LittleEndian::read_u32(&data[..4]))
}

fn hex_or_unknown(value: Option<u32>) -> String {
    value.map_or_else(|| "unknown".to_string(), |v| format!("0x{v:04X}"))
}

impl BootloaderInfo {
    /// Version as `major.minor`, or "unknown".
    pub fn version_string(&self) -> String {
        self.version
            .map_or_else(|| "unknown".to_string(), |v| v.to_string())
    }

    /// Product series as hex, or "unknown".
    pub fn product_series_string(&self) -> String {
        hex_or_unknown(self.product_series)
    }

    /// Product id as hex, or "unknown".
    pub fn product_id_string(&self) -> String {
        hex_or_unknown(self.product_id)
    }
}

impl fmt::Display for BootloaderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bootloader version: {}", self.version_string())?;
        writeln!(f, "Product series:     {}", self.product_series_string())?;
        write!(f, "Product id:         {}", self.product_id_string())
    }
}

/// Request/response session for identity queries.
pub struct CommandSession<'a> {
    channel: Channel<'a>,
    timeout: Duration,
}

impl<'a> CommandSession<'a> {
    /// Claim the link for a command session.
    ///
    /// Fails with [`Error::Busy`](crate::Error::Busy) while another session
    /// holds the link.
    pub fn new(link: &'a Link) -> Result<Self> {
        Ok(Self {
            channel: link.channel()?,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        })
    }

    /// Set the per-query response timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send an Info request and wait for the matching response.
    ///
    /// Returns `Ok(None)` when nothing arrives within `timeout`. Frames of
    /// any other type are discarded.
    pub fn request(&mut self, command_id: u8, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.channel
            .send(&Frame::info_request(command_id))?;

        let deadline = Instant::now() + timeout;
        while let Some(raw) = self.channel.recv(deadline) {
            match Frame::decode(&raw) {
                Ok(frame) if frame.frame_type() == FrameType::Info => {
                    return Ok(Some(frame.data().to_vec()));
                },
                Ok(frame) => debug!("Discarding {frame} while waiting for info response"),
                Err(e) => debug!("Discarding frame: {e}"),
            }
        }

        debug!(
            "No response to info command {command_id} within {} ms",
            timeout.as_millis()
        );
        Ok(None)
    }

    /// Run one identity query with the session timeout.
    pub fn query(&mut self, command: InfoCommand) -> Result<Option<Vec<u8>>> {
        self.request(command.id(), self.timeout)
    }

    /// Query version, product series and product id in turn.
    ///
    /// Each field degrades to `None` on its own; only transport errors abort.
    pub fn query_info(&mut self) -> Result<BootloaderInfo> {
        let version = self
            .query(InfoCommand::Version)?
            .and_then(|data| BootloaderVersion::from_response(&data));
        let product_series = self
            .query(InfoCommand::ProductSeries)?
            .and_then(|data| word_from_response(&data));
        let product_id = self
            .query(InfoCommand::ProductId)?
            .and_then(|data| word_from_response(&data));

        Ok(BootloaderInfo {
            version,
            product_series,
            product_id,
        })
    }

    /// Ask the bootloader to abandon a transfer in progress.
    ///
    /// The device does not answer this frame.
    pub fn cancel_transfer(&mut self) -> Result<()> {
        debug!("Sending transfer cancel");
        self.channel
            .send(&Frame::cancel())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            error::Error,
            session::sim::{ack, info_reply, sim_link},
        },
    };

    const SHORT: Duration = Duration::from_millis(30);

    fn identity_device(frame: &Frame) -> Vec<[u8; 8]> {
        match frame.data() {
            [1] => vec![info_reply(&[2, 7])],
            [2] => vec![info_reply(&[0x34, 0x12, 0x00, 0x00])],
            [3] => vec![info_reply(&[0x10, 0x04, 0x00, 0x00])],
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_query_info_all_fields() {
        let (link, sent) = sim_link(identity_device);
        let info = CommandSession::new(&link)
            .unwrap()
            .with_timeout(SHORT)
            .query_info()
            .unwrap();

        assert_eq!(info.version_string(), "2.7");
        assert_eq!(info.product_series_string(), "0x1234");
        assert_eq!(info.product_id_string(), "0x0410");

        let ids: Vec<u8> = sent
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.payload()[0])
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_field_degrades_independently() {
        let (link, _) = sim_link(|frame| match frame.data() {
            [2] => Vec::new(),
            _ => identity_device(frame),
        });
        let info = CommandSession::new(&link)
            .unwrap()
            .with_timeout(SHORT)
            .query_info()
            .unwrap();

        assert_eq!(info.version_string(), "2.7");
        assert_eq!(info.product_series, None);
        assert_eq!(info.product_series_string(), "unknown");
        assert_eq!(info.product_id, Some(0x0410));
    }

    #[test]
    fn test_short_responses_are_unknown() {
        let (link, _) = sim_link(|frame| match frame.data() {
            [1] => vec![info_reply(&[3])],
            _ => vec![info_reply(&[0xAA, 0xBB])],
        });
        let info = CommandSession::new(&link)
            .unwrap()
            .with_timeout(SHORT)
            .query_info()
            .unwrap();

        assert_eq!(info, BootloaderInfo::default());
    }

    #[test]
    fn test_request_discards_unrelated_frames() {
        let (link, _) = sim_link(|_| {
            vec![
                ack(0),
                [0x99, 0, 0, 0, 0, 0, 0, 0],
                [0x06, 0, 0, 0x09, 0, 0, 0, 0],
                info_reply(&[5, 6, 7]),
            ]
        });
        let mut session = CommandSession::new(&link).unwrap();
        let data = session
            .request(9, SHORT)
            .unwrap();
        assert_eq!(data, Some(vec![5, 6, 7]));
    }

    #[test]
    fn test_request_times_out_without_error() {
        let (link, sent) = sim_link(|_| vec![ack(0)]);
        let mut session = CommandSession::new(&link).unwrap();

        let start = Instant::now();
        let data = session
            .request(1, SHORT)
            .unwrap();
        assert!(data.is_none());
        assert!(start.elapsed() >= SHORT);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_cancel_transfer_frame() {
        let (link, sent) = sim_link(|_| Vec::new());
        CommandSession::new(&link)
            .unwrap()
            .cancel_transfer()
            .unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].encode(), [0x18, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_second_session_is_busy() {
        let (link, _) = sim_link(|_| Vec::new());
        let _first = CommandSession::new(&link).unwrap();
        assert!(matches!(CommandSession::new(&link), Err(Error::Busy)));
    }

    #[test]
    fn test_info_display() {
        let info = BootloaderInfo {
            version: Some(BootloaderVersion { major: 1, minor: 0 }),
            product_series: None,
            product_id: Some(0x1_2345),
        };
        let text = info.to_string();
        assert!(text.contains("Bootloader version: 1.0"));
        assert!(text.contains("Product series:     unknown"));
        assert!(text.contains("Product id:         0x12345"));
    }
}
