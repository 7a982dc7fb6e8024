use crate::{PortInfo, PortSettings, Result, RfpPort, TransportError};
use serialport::{SerialPort, SerialPortType};
use std::io::{ErrorKind, Read, Write};

/// RFPlayer dongle on a USB serial line (FTDI, 8N1).
pub struct SerialRfpPort {
    path: String,
    port: Box<dyn SerialPort>,
}

impl SerialRfpPort {
    pub fn path(&self) -> &str {
        &self.path
    }

    fn map_io(e: std::io::Error) -> TransportError {
        match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportError::Timeout,
            ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe => TransportError::Closed,
            _ => TransportError::Io(e.to_string()),
        }
    }
}

impl RfpPort for SerialRfpPort {
    fn open(path: &str, settings: PortSettings) -> Result<Self> {
        let port = serialport::new(path, settings.baud)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(path.to_string()),
                _ => TransportError::Io(e.to_string()),
            })?;
        tracing::info!(port = path, baud = settings.baud, "serial port open");
        Ok(SerialRfpPort {
            path: path.to_string(),
            port,
        })
    }

    fn list() -> Result<Vec<PortInfo>> {
        let mut out = Vec::new();
        for p in serialport::available_ports().map_err(|e| TransportError::Io(e.to_string()))? {
            let driver = match p.port_type {
                SerialPortType::UsbPort(_) => "usb-serial",
                _ => "serial",
            };
            out.push(PortInfo {
                name: p.port_name,
                driver: driver.to_string(),
            });
        }
        Ok(out)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(0) => Err(TransportError::Timeout),
            Ok(n) => Ok(n),
            Err(e) => Err(Self::map_io(e)),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes).map_err(Self::map_io)?;
        self.port.flush().map_err(Self::map_io)
    }

    fn try_clone_port(&self) -> Result<Box<dyn RfpPort>> {
        let port = self
            .port
            .try_clone()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(Box::new(SerialRfpPort {
            path: self.path.clone(),
            port,
        }))
    }
}
