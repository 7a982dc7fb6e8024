//! rfp-protocol: the RFPlayer binary protocol engine
//!
//! Stream reassembly, the sixteen sensor payload layouts, command encoding and
//! the sensor/actuator registry. Nothing here performs I/O; the gateway crate
//! wires these pieces to a transport and a message bus.

mod types;
pub use types::*;

pub mod frame;
pub use frame::{hexdump, RawFrame};

pub mod reassembler;
pub use reassembler::{Reassembled, Reassembler};

mod registry;
pub use registry::{ActuatorEntry, LoadReport, Registry, RegistryError, Store};

mod loader;
pub use loader::{load_config_file, load_config_str, load_registry_file};

pub mod decode;
pub use decode::{
    decode_frame, DecodeError, InfoType, Measurements, ProtocolFamily, ReadingPayload,
    SensorReading,
};

pub mod encode;
pub use encode::{encode_command, parse_device_id, ActuatorCommand, Action, EncodeError, Protocol};

mod metrics;
pub use metrics::{GatewayMetrics, MetricsHub};
