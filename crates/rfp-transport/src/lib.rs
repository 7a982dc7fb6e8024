//! rfp-transport: byte-stream access to the RFPlayer dongle
//!
//! The protocol engine only ever sees a blocking duplex byte stream. This crate
//! provides the trait plus feature-gated backends. The default build enables a
//! `mock` backend so binaries and tests run on any host without hardware.

mod types;
pub use types::{PortInfo, PortSettings};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::RfpPort;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockPort, WriteRecord};

#[cfg(feature = "serial")]
mod serial;

#[cfg(feature = "serial")]
pub use serial::SerialRfpPort;
