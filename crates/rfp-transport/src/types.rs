use std::time::Duration;

/// Line settings used when opening a port. Parity, data and stop bits are
/// fixed at 8N1, which is what the dongle speaks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PortSettings {
    pub baud: u32,
    pub read_timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud: 115_200,
            read_timeout: Duration::from_millis(100),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PortInfo {
    pub name: String,
    pub driver: String,
}
