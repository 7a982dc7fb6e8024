use crate::{PortInfo, PortSettings, Result, RfpPort, TransportError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// One `write_all` call observed by the mock, with the instant it happened.
#[derive(Clone, Debug)]
pub struct WriteRecord {
    pub at: Instant,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct MockState {
    inbound: VecDeque<Vec<u8>>,
    writes: Vec<WriteRecord>,
    hang_up_when_drained: bool,
    closed: bool,
}

/// An in-process port. Inbound data is scripted with [`MockPort::feed`], each
/// fed chunk being returned by at most one `read` call, and every write is
/// recorded. Clones share the same state, like two handles on one tty.
pub struct MockPort {
    name: String,
    read_timeout: Duration,
    state: Arc<Mutex<MockState>>,
}

impl MockPort {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            read_timeout: PortSettings::default().read_timeout,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a chunk to be returned by a future `read`.
    pub fn feed(&self, chunk: &[u8]) {
        if let Ok(mut st) = self.state.lock() {
            st.inbound.push_back(chunk.to_vec());
        }
    }

    /// Report end-of-stream once every fed chunk has been read.
    pub fn hang_up_when_drained(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.hang_up_when_drained = true;
        }
    }

    /// Close the port for every handle; reads and writes fail with `Closed`.
    pub fn close(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.closed = true;
        }
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state
            .lock()
            .map(|st| st.writes.clone())
            .unwrap_or_default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MockState>> {
        self.state
            .lock()
            .map_err(|_| TransportError::Io("mock state poisoned".to_string()))
    }
}

impl Clone for MockPort {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            read_timeout: self.read_timeout,
            state: Arc::clone(&self.state),
        }
    }
}

impl RfpPort for MockPort {
    fn open(name: &str, settings: PortSettings) -> Result<Self> {
        tracing::debug!(port = name, "mock port open");
        Ok(Self::new(name).with_read_timeout(settings.read_timeout))
    }

    fn list() -> Result<Vec<PortInfo>> {
        Ok(vec![PortInfo {
            name: "mock0".to_string(),
            driver: "mock".to_string(),
        }])
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        {
            let mut st = self.state()?;
            if st.closed {
                return Err(TransportError::Closed);
            }
            if let Some(mut chunk) = st.inbound.pop_front() {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    st.inbound.push_front(chunk.split_off(n));
                }
                return Ok(n);
            }
            if st.hang_up_when_drained {
                tracing::debug!(port = %self.name, "mock port drained, hanging up");
                return Err(TransportError::Closed);
            }
        }
        // Nothing scripted: behave like a serial read timing out
        thread::sleep(self.read_timeout);
        Err(TransportError::Timeout)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut st = self.state()?;
        if st.closed {
            return Err(TransportError::Closed);
        }
        st.writes.push(WriteRecord {
            at: Instant::now(),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn try_clone_port(&self) -> Result<Box<dyn RfpPort>> {
        Ok(Box::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fed_chunks_come_back_in_order_and_split_on_small_buffers() {
        let mut port = MockPort::new("mock0").with_read_timeout(Duration::from_millis(1));
        port.feed(b"ZI\x01");
        port.feed(b"\x02\x00");

        let mut buf = [0u8; 2];
        assert_eq!(port.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ZI");
        assert_eq!(port.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0x01);
        assert_eq!(port.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"\x02\x00");
        assert!(matches!(port.read(&mut buf), Err(TransportError::Timeout)));
    }

    #[test]
    fn clones_share_writes_and_hang_up() {
        let port = MockPort::new("mock0").with_read_timeout(Duration::from_millis(1));
        let mut writer = port.try_clone_port().unwrap();
        writer.write_all(&[1, 2, 3]).unwrap();
        assert_eq!(port.writes().len(), 1);
        assert_eq!(port.writes()[0].bytes, vec![1, 2, 3]);

        port.hang_up_when_drained();
        let mut reader = port.clone();
        let mut buf = [0u8; 8];
        assert!(matches!(reader.read(&mut buf), Err(TransportError::Closed)));
    }

    #[test]
    fn closed_port_rejects_writes() {
        let port = MockPort::new("mock0");
        port.close();
        let mut handle = port.clone();
        assert!(matches!(
            handle.write_all(b"x"),
            Err(TransportError::Closed)
        ));
    }
}
