//! rfp-gateway: runs the RFPlayer protocol engine against a live transport
//!
//! Three activities share one port: a blocking reader thread turning bytes
//! into readings, a command task turning bus messages into frames, and a
//! dispatcher writing those frames at a bounded rate. A publish queue sits
//! between the reader and the message bus.

mod error;
pub use error::{BridgeError, DispatchError, GatewayError, Result};

mod shutdown;
pub use shutdown::{is_shutdown, wait_for_shutdown};

mod dispatcher;
pub use dispatcher::{spawn_dispatcher, DispatchConfig, DispatchHandle, DrainReport};

mod bridge;
pub use bridge::{spawn_publisher, Bridge, InboundCommand, Publication, PublishReport};

mod reader;
pub use reader::{ReadPipeline, ReadReport};

mod commands;
pub use commands::CommandReport;

mod gateway;
pub use gateway::{Gateway, GatewayOptions, GatewayReport};
