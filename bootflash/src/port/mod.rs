//! Transport abstraction.
//!
//! The protocol core only needs a byte pipe: something it can write frames
//! to, plus a second handle the background read activity can pull from.
//!
//! ```text
//! +------------------+        +------------------+
//! |  Flash / Command |        |  read activity   |
//! |     sessions     |        |  (link thread)   |
//! +--------+---------+        +--------+---------+
//!          | write                     | read
//!          v                           v
//! +--------+---------------------------+---------+
//! |                  Port trait                  |
//! +--------+-------------------------------------+
//!          |
//!          v
//! +--------+---------+
//! | NativePort       |
//! |   (serialport)   |
//! +------------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Default baud rate of the bootloader's UART.
pub const DEFAULT_BAUD: u32 = 115200;

/// Default read timeout of the reader handle.
///
/// Kept short so the read activity notices a disconnect promptly.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyACM0", "COM10").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read timeout of each underlying read call.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the read timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial port information.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// Byte-oriented link to the bootloader.
pub trait Port: Read + Write + Send {
    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Discard anything pending in the OS input/output buffers.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Open a second handle for the background read activity.
    fn try_clone_reader(&self) -> Result<Box<dyn Read + Send>>;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;
}

/// List the serial ports present on this machine.
#[cfg(feature = "native")]
pub fn list_ports() -> Result<Vec<PortInfo>> {
    native::list_ports()
}

/// List the serial ports present on this machine.
#[cfg(not(feature = "native"))]
pub fn list_ports() -> Result<Vec<PortInfo>> {
    Ok(Vec::new())
}

#[cfg(feature = "native")]
pub use native::NativePort;
