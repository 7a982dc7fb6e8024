//! Rate-limited command dispatch.
//!
//! Producers enqueue encoded frames without waiting; a single drain task
//! writes them to the dongle in order, never two writes closer together than
//! the configured interval.

use crate::error::DispatchError;
use crate::shutdown::wait_for_shutdown;
use rfp_protocol::{hexdump, GatewayMetrics};
use rfp_transport::{RfpPort, TransportError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub capacity: usize,
    pub min_interval: Duration,
    /// Write what is still queued when shutdown is signalled, instead of
    /// dropping it.
    pub flush_on_shutdown: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            min_interval: Duration::from_millis(500),
            flush_on_shutdown: true,
        }
    }
}

/// What the drain task did over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Producer side of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<Vec<u8>>,
}

impl DispatchHandle {
    /// Queue a frame for sending. Never waits: a full queue rejects the frame.
    pub fn enqueue(&self, frame: Vec<u8>) -> Result<(), DispatchError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }
}

/// Start the drain task writing to `writer`.
pub fn spawn_dispatcher(
    writer: Box<dyn RfpPort>,
    config: DispatchConfig,
    shutdown: watch::Receiver<bool>,
    metrics: GatewayMetrics,
) -> (DispatchHandle, JoinHandle<DrainReport>) {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    let drain = Drain {
        rx,
        writer: Some(writer),
        config,
        last_write: None,
        shutdown,
        metrics,
        report: DrainReport::default(),
    };
    let task = tokio::spawn(drain.run());
    (DispatchHandle { tx }, task)
}

struct Drain {
    rx: mpsc::Receiver<Vec<u8>>,
    writer: Option<Box<dyn RfpPort>>,
    config: DispatchConfig,
    last_write: Option<Instant>,
    shutdown: watch::Receiver<bool>,
    metrics: GatewayMetrics,
    report: DrainReport,
}

impl Drain {
    async fn run(mut self) -> DrainReport {
        info!(
            capacity = self.config.capacity,
            interval_ms = self.config.min_interval.as_millis() as u64,
            "dispatcher started"
        );
        loop {
            let frame = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => break,
                next = self.rx.recv() => match next {
                    Some(frame) => frame,
                    None => break,
                },
            };
            self.send(frame).await;
        }

        self.rx.close();
        if self.config.flush_on_shutdown {
            while let Ok(frame) = self.rx.try_recv() {
                self.send(frame).await;
            }
        } else {
            while self.rx.try_recv().is_ok() {
                self.report.dropped += 1;
            }
        }
        info!(
            written = self.report.written,
            failed = self.report.failed,
            dropped = self.report.dropped,
            "dispatcher stopped"
        );
        self.report
    }

    async fn send(&mut self, frame: Vec<u8>) {
        let Some(mut writer) = self.writer.take() else {
            self.report.dropped += 1;
            return;
        };
        if let Some(last) = self.last_write {
            let ready = last + self.config.min_interval;
            if self.config.flush_on_shutdown {
                tokio::time::sleep_until(ready).await;
            } else {
                let stopped = tokio::select! {
                    biased;
                    _ = wait_for_shutdown(&mut self.shutdown) => true,
                    _ = tokio::time::sleep_until(ready) => false,
                };
                if stopped {
                    debug!("shutdown while pacing, frame dropped");
                    self.writer = Some(writer);
                    self.report.dropped += 1;
                    return;
                }
            }
        }
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!("sending {} bytes\n{}", frame.len(), hexdump(&frame));
        }

        let outcome = tokio::task::spawn_blocking(move || {
            let res = writer.write_all(&frame);
            (writer, res)
        })
        .await;
        self.last_write = Some(Instant::now());

        match outcome {
            Ok((writer, Ok(()))) => {
                self.writer = Some(writer);
                self.report.written += 1;
                self.metrics.tx_frames.inc();
            }
            Ok((_, Err(TransportError::Closed))) => {
                error!("transport closed, dispatcher can no longer write");
                self.report.failed += 1;
            }
            Ok((writer, Err(e))) => {
                warn!(error = %e, "write to dongle failed");
                self.writer = Some(writer);
                self.report.failed += 1;
            }
            Err(e) => {
                error!(error = %e, "write task panicked");
                self.report.failed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfp_protocol::MetricsHub;
    use rfp_transport::MockPort;

    fn start(
        config: DispatchConfig,
    ) -> (
        MockPort,
        DispatchHandle,
        JoinHandle<DrainReport>,
        watch::Sender<bool>,
    ) {
        let port = MockPort::new("mock0");
        let (stop_tx, stop_rx) = watch::channel(false);
        let metrics = MetricsHub::new().unwrap().gw;
        let (handle, task) = spawn_dispatcher(Box::new(port.clone()), config, stop_rx, metrics);
        (port, handle, task, stop_tx)
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let config = DispatchConfig {
            capacity: 2,
            min_interval: Duration::from_secs(60),
            flush_on_shutdown: false,
        };
        let (_port, handle, task, stop) = start(config);
        let mut rejected = 0;
        for i in 0..10u8 {
            if handle.enqueue(vec![i]) == Err(DispatchError::QueueFull) {
                rejected += 1;
            }
        }
        // at most one frame in flight plus two queued
        assert!(rejected >= 7, "rejected {rejected}");
        stop.send(true).unwrap();
        let report = task.await.unwrap();
        assert!(report.written <= 1);
    }

    #[tokio::test]
    async fn frames_go_out_in_enqueue_order() {
        let config = DispatchConfig {
            min_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let (port, handle, task, stop) = start(config);
        for i in 0..5u8 {
            handle.enqueue(vec![i]).unwrap();
        }
        stop.send(true).unwrap();
        let report = task.await.unwrap();
        assert_eq!(report.written, 5);
        let sent: Vec<u8> = port.writes().iter().map(|w| w.bytes[0]).collect();
        assert_eq!(sent, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn drop_mode_discards_pending_frames() {
        let config = DispatchConfig {
            capacity: 10,
            min_interval: Duration::from_secs(60),
            flush_on_shutdown: false,
        };
        let (port, handle, task, stop) = start(config);
        for i in 0..4u8 {
            handle.enqueue(vec![i]).unwrap();
        }
        stop.send(true).unwrap();
        let report = task.await.unwrap();
        assert_eq!(report.written + report.dropped, 4);
        assert!(report.dropped >= 3);
        assert_eq!(port.writes().len() as u64, report.written);
    }

    #[tokio::test]
    async fn drop_mode_does_not_wait_out_the_interval() {
        let config = DispatchConfig {
            capacity: 10,
            min_interval: Duration::from_secs(60),
            flush_on_shutdown: false,
        };
        let (port, handle, task, stop) = start(config);
        handle.enqueue(vec![1]).unwrap();
        handle.enqueue(vec![2]).unwrap();
        for _ in 0..200 {
            if !port.writes().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        stop.send(true).unwrap();
        let report = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(port.writes().len(), 1);
    }

    #[tokio::test]
    async fn enqueue_after_stop_is_closed() {
        let (_port, handle, task, stop) = start(DispatchConfig::default());
        stop.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(handle.enqueue(vec![1]), Err(DispatchError::Closed));
    }
}
