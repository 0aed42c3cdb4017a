//! Live link to a bootloader.
//!
//! A [`Link`] owns the transport and a background read activity that feeds
//! every received byte into an [`RxQueue`]. Sessions borrow the link through
//! a [`Channel`], which doubles as the single-session guard: while one
//! channel is alive, a second [`Link::channel`] call fails with
//! [`Error::Busy`].

use {
    crate::{
        error::{Error, Result},
        port::Port,
        protocol::{FRAME_SIZE, Frame, RxQueue, frame::hex_bytes},
    },
    log::{debug, trace, warn},
    std::{
        io::{ErrorKind, Read, Write},
        sync::{
            Arc, Mutex, MutexGuard, PoisonError, TryLockError,
            atomic::{AtomicBool, Ordering},
        },
        thread::{self, JoinHandle},
        time::{Duration, Instant},
    },
};

/// Delay before the read activity resumes after an unexpected read error.
pub const READ_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Granularity at which a sleeping read activity re-checks the liveness flag.
const LIVENESS_POLL: Duration = Duration::from_millis(10);

const READ_BUF_SIZE: usize = 256;

/// Connection to a bootloader over a [`Port`].
pub struct Link {
    port: Mutex<Box<dyn Port>>,
    rx: Arc<RxQueue>,
    alive: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    closed: bool,
}

impl Link {
    /// Take over an opened port and start reading from it.
    pub fn open(mut port: Box<dyn Port>) -> Result<Self> {
        port.clear_buffers()?;
        let reader = port.try_clone_reader()?;
        debug!("Link opened on {}", port.name());
        Self::spawn(reader, port)
    }

    /// Start the read activity on `reader`; frames are written to `writer`.
    pub fn spawn(reader: Box<dyn Read + Send>, writer: Box<dyn Port>) -> Result<Self> {
        let rx = Arc::new(RxQueue::new());
        let alive = Arc::new(AtomicBool::new(true));

        let handle = {
            let rx = Arc::clone(&rx);
            let alive = Arc::clone(&alive);
            thread::Builder::new()
                .name("bootflash-rx".into())
                .spawn(move || read_activity(reader, &rx, &alive))?
        };

        Ok(Self {
            port: Mutex::new(writer),
            rx,
            alive,
            reader: Some(handle),
            closed: false,
        })
    }

    /// Build a link without a read activity.
    ///
    /// Whoever holds `rx` is responsible for pushing received bytes.
    pub fn new(writer: Box<dyn Port>, rx: Arc<RxQueue>) -> Self {
        Self {
            port: Mutex::new(writer),
            rx,
            alive: Arc::new(AtomicBool::new(true)),
            reader: None,
            closed: false,
        }
    }

    /// Acquire exclusive use of the link for one session.
    pub fn channel(&self) -> Result<Channel<'_>> {
        if self.closed || !self.alive.load(Ordering::Acquire) {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::NotConnected,
                "link is closed",
            )));
        }

        let port = match self.port.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(Error::Busy),
        };

        Ok(Channel {
            port,
            rx: &self.rx,
        })
    }

    /// Receive queue fed by the read activity.
    pub fn rx_queue(&self) -> &Arc<RxQueue> {
        &self.rx
    }

    /// Whether the read activity is still running.
    pub fn is_reading(&self) -> bool {
        self.reader
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop the read activity, release the transport and drop buffered bytes.
    ///
    /// Calling this more than once is harmless.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.alive.store(false, Ordering::Release);

        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!("Read activity panicked");
            }
        }

        let result = self
            .port
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .close();
        self.rx.clear();
        debug!("Link closed");
        result
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!("Error while closing link: {e}");
        }
    }
}

fn read_activity(mut reader: Box<dyn Read + Send>, rx: &RxQueue, alive: &AtomicBool) {
    let mut buf = [0u8; READ_BUF_SIZE];

    while alive.load(Ordering::Acquire) {
        match reader.read(&mut buf) {
            Ok(0) => {
                debug!("Transport reported end of stream");
                break;
            },
            Ok(n) => {
                trace!("RX chunk: {}", hex_bytes(&buf[..n]));
                rx.push(&buf[..n]);
            },
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {},
            Err(e) => {
                warn!(
                    "Read failed: {e}; retrying in {} ms",
                    READ_RETRY_DELAY.as_millis()
                );
                let resume_at = Instant::now() + READ_RETRY_DELAY;
                while alive.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if now >= resume_at {
                        break;
                    }
                    thread::sleep(LIVENESS_POLL.min(resume_at - now));
                }
            },
        }
    }

    trace!("Read activity stopped");
}

/// Exclusive handle on a [`Link`] for the duration of one session.
pub struct Channel<'a> {
    port: MutexGuard<'a, Box<dyn Port>>,
    rx: &'a RxQueue,
}

impl Channel<'_> {
    /// Write one frame to the transport.
    pub fn send(&mut self, frame: &Frame) -> Result<()> {
        let raw = frame.encode();
        trace!("TX {frame}");
        self.port.write_all(&raw)?;
        self.port.flush()?;
        Ok(())
    }

    /// Next eight received bytes, or `None` once `deadline` passes.
    pub fn recv(&mut self, deadline: Instant) -> Option<[u8; FRAME_SIZE]> {
        let bytes = self.rx.take_until(FRAME_SIZE, deadline)?;
        let mut raw = [0u8; FRAME_SIZE];
        raw.copy_from_slice(&bytes);
        trace!("RX frame: {}", hex_bytes(&raw));
        Some(raw)
    }
}
