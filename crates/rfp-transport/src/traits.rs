use crate::{PortInfo, PortSettings, Result};

/// A minimal blocking duplex byte stream to the dongle.
pub trait RfpPort: Send {
    /// Open a port by name (e.g., "/dev/ttyUSB0", "mock0").
    fn open(name: &str, settings: PortSettings) -> Result<Self>
    where
        Self: Sized;

    /// Attempt to list available ports for this backend.
    fn list() -> Result<Vec<PortInfo>>
    where
        Self: Sized;

    /// Read whatever bytes are available into `buf`, blocking at most the
    /// configured read timeout. Returns `Timeout` when nothing arrived and
    /// `Closed` once the stream has ended.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write the whole buffer.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// A second handle on the same underlying port, so reads and writes can
    /// proceed from different threads.
    fn try_clone_port(&self) -> Result<Box<dyn RfpPort>>;
}
