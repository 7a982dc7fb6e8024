use crate::bridge::{spawn_publisher, Bridge, InboundCommand, PublishReport};
use crate::commands::{CommandLoop, CommandReport};
use crate::dispatcher::{spawn_dispatcher, DispatchConfig, DispatchHandle, DrainReport};
use crate::error::Result;
use crate::reader::{ReadLoop, ReadPipeline, ReadReport};
use crate::shutdown::wait_for_shutdown;
use rfp_protocol::{GatewayConfig, GatewayMetrics, Registry};
use rfp_transport::RfpPort;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Runtime knobs, usually derived from the configuration file.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub topic_root: String,
    pub dispatch: DispatchConfig,
    pub publish_capacity: usize,
    pub max_payload: usize,
    pub read_enabled: bool,
    /// ASCII commands written once, NUL-terminated, before anything else.
    pub init_commands: Vec<String>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

impl GatewayOptions {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let player = &config.rfplayer;
        Self {
            topic_root: config.brokermqtt.topic_root.clone(),
            dispatch: DispatchConfig {
                capacity: player.queue_capacity,
                min_interval: Duration::from_millis(player.wait_to_send_ms),
                flush_on_shutdown: player.flush_on_shutdown,
            },
            publish_capacity: 256,
            max_payload: player.max_payload,
            read_enabled: player.rx,
            init_commands: player
                .initialisation
                .iter()
                .map(|c| c.cmd.clone())
                .collect(),
        }
    }
}

/// Final counters from every activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayReport {
    pub read: ReadReport,
    pub commands: CommandReport,
    pub dispatch: DrainReport,
    pub publish: PublishReport,
}

/// A running gateway: reader thread, command task, dispatcher and publisher.
pub struct Gateway {
    stop: Arc<watch::Sender<bool>>,
    dispatch: DispatchHandle,
    reader: Option<JoinHandle<ReadReport>>,
    commands: JoinHandle<CommandReport>,
    dispatcher: JoinHandle<DrainReport>,
    publisher: JoinHandle<PublishReport>,
}

impl Gateway {
    /// Send the init commands, then start every activity.
    pub async fn start(
        port: Box<dyn RfpPort>,
        registry: Arc<Registry>,
        bridge: Arc<dyn Bridge>,
        inbound: mpsc::Receiver<InboundCommand>,
        options: GatewayOptions,
        metrics: GatewayMetrics,
    ) -> Result<Self> {
        let writer = port.try_clone_port()?;
        let writer = send_init_commands(writer, options.init_commands.clone()).await?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let stop = Arc::new(stop_tx);

        let (dispatch, dispatcher) =
            spawn_dispatcher(writer, options.dispatch, stop_rx.clone(), metrics.clone());

        let (publish_tx, publish_rx) = mpsc::channel(options.publish_capacity.max(1));
        let publisher = spawn_publisher(bridge, publish_rx);

        let reader = if options.read_enabled {
            let read_loop = ReadLoop {
                port,
                pipeline: ReadPipeline::new(
                    Arc::clone(&registry),
                    options.topic_root.clone(),
                    options.max_payload,
                    metrics.clone(),
                ),
                publish: publish_tx,
                shutdown: stop_rx.clone(),
                stop: Arc::clone(&stop),
            };
            Some(tokio::task::spawn_blocking(move || read_loop.run()))
        } else {
            info!("reception disabled");
            None
        };

        let command_loop = CommandLoop {
            inbound,
            registry,
            dispatch: dispatch.clone(),
            metrics,
            report: CommandReport::default(),
        };
        let commands = tokio::spawn(command_loop.run(stop_rx));

        info!(topic_root = %options.topic_root, "gateway started");
        Ok(Self {
            stop,
            dispatch,
            reader,
            commands,
            dispatcher,
            publisher,
        })
    }

    /// Queue a pre-encoded frame directly, bypassing the command path.
    pub fn dispatch_handle(&self) -> DispatchHandle {
        self.dispatch.clone()
    }

    /// Ask every activity to stop without waiting for them.
    pub fn trigger_shutdown(&self) {
        self.stop.send_replace(true);
    }

    /// Run until `signal` resolves or the dongle stream ends, then shut down.
    pub async fn run_until<F>(self, signal: F) -> Result<GatewayReport>
    where
        F: Future<Output = ()>,
    {
        let mut stopped = self.stop.subscribe();
        tokio::select! {
            _ = signal => info!("shutdown requested"),
            _ = wait_for_shutdown(&mut stopped) => {}
        }
        self.shutdown().await
    }

    /// Signal shutdown and wait for every activity to finish. The reader
    /// stops first, then commands, then the dispatcher flushes or drops its
    /// queue, and the publisher drains what the reader left behind.
    pub async fn shutdown(self) -> Result<GatewayReport> {
        self.stop.send_replace(true);
        let mut report = GatewayReport::default();
        if let Some(reader) = self.reader {
            report.read = reader.await?;
        }
        report.commands = self.commands.await?;
        drop(self.dispatch);
        report.dispatch = self.dispatcher.await?;
        report.publish = self.publisher.await?;
        info!(
            readings = report.read.readings,
            published = report.publish.published,
            commands = report.commands.accepted,
            written = report.dispatch.written,
            "gateway stopped"
        );
        Ok(report)
    }
}

async fn send_init_commands(
    mut writer: Box<dyn RfpPort>,
    commands: Vec<String>,
) -> Result<Box<dyn RfpPort>> {
    if commands.is_empty() {
        return Ok(writer);
    }
    let writer = tokio::task::spawn_blocking(move || {
        for cmd in commands {
            let mut bytes = cmd.clone().into_bytes();
            bytes.push(0);
            match writer.write_all(&bytes) {
                Ok(()) => debug!(%cmd, "init command sent"),
                Err(e) => error!(%cmd, error = %e, "init command failed"),
            }
        }
        writer
    })
    .await?;
    Ok(writer)
}
