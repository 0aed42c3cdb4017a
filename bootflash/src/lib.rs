//! # bootflash
//!
//! A library for flashing microcontrollers through a small serial
//! bootloader that speaks a fixed 8-byte frame protocol.
//!
//! This crate provides:
//!
//! - CRC-32 (ISO-HDLC) over firmware images
//! - The 8-byte frame codec
//! - A receive queue fed by a background read activity
//! - Identity queries (bootloader version, product series, product id)
//! - The firmware transfer state machine with per-chunk retries
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via `serialport`
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! # #[cfg(feature = "native")]
//! # {
//! use bootflash::{FlashConfig, FlashSession, Link, NativePort, SerialConfig};
//!
//! # fn flash() -> Result<(), Box<dyn std::error::Error>> {
//! let firmware = std::fs::read("firmware.bin")?;
//!
//! let port = NativePort::open(&SerialConfig::new("/dev/ttyACM0", 115200))?;
//! let link = Link::open(Box::new(port))?;
//!
//! let mut session = FlashSession::new(&link, FlashConfig::default())?;
//! session.run(&firmware, |percent, state| {
//!     println!("{percent:3}% {state}");
//! })?;
//! # Ok(())
//! # }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod error;
pub mod link;
pub mod port;
pub mod protocol;
pub mod session;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

/// Held by tests that run transfers or toggle the interrupt flag.
#[cfg(test)]
pub(crate) fn interrupt_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, PoisonError};

    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock()
        .unwrap_or_else(PoisonError::into_inner)
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    error::{Error, Result},
    link::{Channel, Link},
    port::{Port, PortInfo, SerialConfig, list_ports},
    protocol::{FRAME_SIZE, Frame, FrameType, RxQueue, crc32},
    session::{
        BootloaderInfo, BootloaderVersion, CommandSession, FlashConfig, FlashSession, FlashState,
        InfoCommand,
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        let _guard = interrupt_test_lock();
        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }

    #[test]
    fn test_interrupt_checker_toggle_true_false() {
        let _guard = interrupt_test_lock();
        test_set_interrupted(true);
        assert!(is_interrupted_requested());

        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }
}
