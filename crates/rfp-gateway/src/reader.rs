//! Inbound path: transport bytes to published readings.

use crate::bridge::Publication;
use crate::shutdown::is_shutdown;
use rfp_protocol::reassembler::DEFAULT_DESYNC_THRESHOLD;
use rfp_protocol::{decode_frame, GatewayMetrics, Reassembled, Reassembler, Registry, SensorReading};
use rfp_transport::{RfpPort, TransportError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

const READ_CHUNK: usize = 256;
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(200);

/// Counters for one reader lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadReport {
    pub frames: u64,
    pub readings: u64,
    pub skipped: u64,
    pub decode_errors: u64,
    pub desyncs: u64,
    pub read_errors: u64,
    pub publish_dropped: u64,
}

/// Reassembly plus decoding, independent of where the bytes come from.
pub struct ReadPipeline {
    reassembler: Reassembler,
    registry: Arc<Registry>,
    topic_root: String,
    metrics: GatewayMetrics,
    report: ReadReport,
}

impl ReadPipeline {
    pub fn new(
        registry: Arc<Registry>,
        topic_root: impl Into<String>,
        max_payload: usize,
        metrics: GatewayMetrics,
    ) -> Self {
        Self {
            reassembler: Reassembler::with_limits(DEFAULT_DESYNC_THRESHOLD, max_payload),
            registry,
            topic_root: topic_root.into(),
            metrics,
            report: ReadReport::default(),
        }
    }

    /// Feed one read's worth of bytes; returns the readings it completed in
    /// stream order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SensorReading> {
        let mut readings = Vec::new();
        for event in self.reassembler.push(bytes) {
            match event {
                Reassembled::Desync { discarded } => {
                    debug!(discarded, "stream desync");
                    self.report.desyncs += 1;
                    self.metrics.rx_desync.inc();
                }
                Reassembled::Frame(frame) => {
                    self.report.frames += 1;
                    self.metrics.rx_frames.inc();
                    match decode_frame(&self.registry, &self.topic_root, &frame) {
                        Ok(Some(reading)) => {
                            self.report.readings += 1;
                            self.metrics.readings.inc();
                            readings.push(reading);
                        }
                        Ok(None) => self.report.skipped += 1,
                        Err(e) => {
                            warn!(error = %e, "undecodable frame");
                            self.report.decode_errors += 1;
                            self.metrics.decode_errors.inc();
                        }
                    }
                }
            }
        }
        readings
    }

    pub fn report(&self) -> ReadReport {
        self.report
    }
}

pub(crate) struct ReadLoop {
    pub port: Box<dyn RfpPort>,
    pub pipeline: ReadPipeline,
    pub publish: mpsc::Sender<Publication>,
    pub shutdown: watch::Receiver<bool>,
    pub stop: Arc<watch::Sender<bool>>,
}

impl ReadLoop {
    /// Blocking: runs on a dedicated thread until shutdown or end-of-stream.
    pub fn run(mut self) -> ReadReport {
        info!("reader started");
        let mut buf = [0u8; READ_CHUNK];
        while !is_shutdown(&self.shutdown) {
            match self.port.read(&mut buf) {
                Ok(0) | Err(TransportError::Timeout) => {}
                Ok(n) => {
                    for reading in self.pipeline.push(&buf[..n]) {
                        self.forward(reading);
                    }
                }
                Err(TransportError::Closed) => {
                    info!("dongle stream ended, stopping gateway");
                    self.stop.send_replace(true);
                    break;
                }
                Err(e) => {
                    error!(error = %e, "read from dongle failed");
                    self.pipeline.report.read_errors += 1;
                    thread::sleep(READ_ERROR_BACKOFF);
                }
            }
        }
        let report = self.pipeline.report();
        info!(
            frames = report.frames,
            readings = report.readings,
            desyncs = report.desyncs,
            "reader stopped"
        );
        report
    }

    fn forward(&mut self, reading: SensorReading) {
        let payload = match reading.to_json(OffsetDateTime::now_utc()) {
            Ok(p) => p,
            Err(e) => {
                warn!(reference = %reading.reference, error = %e, "reading not serializable");
                return;
            }
        };
        debug!(topic = %reading.topic, %payload, "reading");
        let publication = Publication {
            topic: reading.topic,
            payload,
        };
        if let Err(mpsc::error::TrySendError::Full(p)) = self.publish.try_send(publication) {
            warn!(topic = %p.topic, "publish queue full, reading dropped");
            self.pipeline.report.publish_dropped += 1;
        }
    }
}
