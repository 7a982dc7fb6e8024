use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{info, warn};

use rfp_gateway::{Bridge, Gateway, GatewayOptions, ReadPipeline};
use rfp_protocol::{
    self as rfp, frame, GatewayConfig, LogConfig, LogFormat, LogOutput, MetricsHub, Registry,
};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use rfp_transport::{MockPort, PortSettings, RfpPort};

mod bridge;

#[derive(Parser, Debug)]
#[command(
    name = "rfp",
    version,
    about = "RFPlayer dongle to message-bus gateway",
    disable_help_subcommand = true
)]
struct Cli {
    /// Gateway configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Backend {
    Mock,
    Serial,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    Ports {
        #[arg(long, value_enum, default_value_t = Backend::Serial)]
        backend: Backend,
    },
    /// Load the configuration and report what the registry holds
    Validate {
        /// Print the load report as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Decode one frame given as hex and print the reading
    Decode {
        /// Frame bytes as hex (e.g. "5A 49 01 ...")
        #[arg(long)]
        data: String,
    },
    /// Encode a command for a configured actuator and print the frame
    Encode {
        #[arg(long)]
        actuator: String,
        /// Command token: 0, 1, 2, 6 or a heating mode name
        #[arg(long)]
        token: String,
    },
    /// Feed a raw capture file through reassembly and decoding
    Replay {
        #[arg(long)]
        from: PathBuf,
        /// Treat the capture as hex text instead of raw bytes
        #[arg(long, action = ArgAction::SetTrue)]
        hex: bool,
        /// Largest chunk handed to the reassembler at once
        #[arg(long, default_value_t = 7usize)]
        chunk: usize,
    },
    /// Run the gateway
    Run {
        #[arg(long, value_enum, default_value_t = Backend::Serial)]
        backend: Backend,
        /// Port path, overriding `rfplayer.port`
        #[arg(long)]
        device: Option<String>,
        /// Publish to and subscribe from the configured MQTT broker
        #[cfg(feature = "mqtt")]
        #[arg(long, action = ArgAction::SetTrue)]
        mqtt: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => rfp::load_config_file(path)?,
        None => GatewayConfig::default(),
    };
    setup_tracing(&config.log);

    match cli.command {
        Commands::Ports { backend } => list_ports(backend),
        Commands::Validate { json } => validate(&config, json),
        Commands::Decode { data } => decode_hex(&config, &data),
        Commands::Encode { actuator, token } => encode(&config, &actuator, &token),
        Commands::Replay { from, hex, chunk } => replay(&config, &from, hex, chunk),
        #[cfg(feature = "mqtt")]
        Commands::Run {
            backend,
            device,
            mqtt,
        } => run(config, backend, device, mqtt).await,
        #[cfg(not(feature = "mqtt"))]
        Commands::Run { backend, device } => run(config, backend, device, false).await,
    }
}

fn setup_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log.level));
    let writer = match log.output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    // Best-effort; avoid panics if already set
    let _ = match log.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Ascii => builder.try_init(),
    };
}

fn list_ports(backend: Backend) -> Result<()> {
    let ports = match backend {
        Backend::Mock => MockPort::list()?,
        Backend::Serial => serial_ports()?,
    };
    for port in ports {
        println!("{}\t{}", port.name, port.driver);
    }
    Ok(())
}

#[cfg(feature = "serial")]
fn serial_ports() -> Result<Vec<rfp_transport::PortInfo>> {
    Ok(rfp_transport::SerialRfpPort::list()?)
}

#[cfg(not(feature = "serial"))]
fn serial_ports() -> Result<Vec<rfp_transport::PortInfo>> {
    anyhow::bail!("serial backend not built; rebuild with `--features serial`")
}

#[derive(Serialize)]
struct ValidateSummary<'a> {
    #[serde(flatten)]
    report: &'a rfp::LoadReport,
    actuators_known: Vec<&'a str>,
    topic_root: &'a str,
}

fn validate(config: &GatewayConfig, json: bool) -> Result<()> {
    let (registry, report) = Registry::from_config(config);
    if json {
        let summary = ValidateSummary {
            report: &report,
            actuators_known: registry.actuator_names(),
            topic_root: &config.brokermqtt.topic_root,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("sensors: {}", report.sensors);
        println!("actuators: {}", report.actuators);
        for name in registry.actuator_names() {
            if let Some(a) = registry.actuator(name) {
                println!(
                    "  {name}\tid={}\tprotocol={}",
                    a.device_id.unwrap_or("-"),
                    a.protocol.unwrap_or("-")
                );
            }
        }
        for dup in &report.duplicates {
            println!("rejected: {dup}");
        }
    }
    if !report.duplicates.is_empty() {
        warn!(count = report.duplicates.len(), "configuration has duplicate entries");
    }
    Ok(())
}

fn decode_hex(config: &GatewayConfig, data: &str) -> Result<()> {
    let bytes = frame::parse_hex(data).ok_or_else(|| anyhow::anyhow!("invalid hex: {data}"))?;
    let raw = rfp::RawFrame::from_bytes(bytes)
        .ok_or_else(|| anyhow::anyhow!("not a complete frame (marker or length mismatch)"))?;
    let (registry, _) = Registry::from_config(config);
    match rfp::decode_frame(&registry, &config.brokermqtt.topic_root, &raw)? {
        Some(reading) => {
            println!("family: {}", reading.family());
            println!("topic: {}", reading.topic);
            println!("{}", reading.to_json(OffsetDateTime::now_utc())?);
        }
        None => println!("unknown infoType, no reading"),
    }
    Ok(())
}

fn encode(config: &GatewayConfig, actuator: &str, token: &str) -> Result<()> {
    let (registry, _) = Registry::from_config(config);
    let bytes = rfp::encode_command(&registry, actuator, token)
        .with_context(|| format!("encoding '{token}' for {actuator}"))?;
    println!("{}", frame::to_hex(&bytes));
    print!("{}", frame::hexdump(&bytes));
    Ok(())
}

fn replay(config: &GatewayConfig, from: &Path, hex: bool, chunk: usize) -> Result<()> {
    let bytes = if hex {
        let text = std::fs::read_to_string(from)
            .with_context(|| format!("reading capture: {}", from.display()))?;
        frame::parse_hex(&text).ok_or_else(|| anyhow::anyhow!("capture is not valid hex"))?
    } else {
        std::fs::read(from).with_context(|| format!("reading capture: {}", from.display()))?
    };
    let (registry, _) = Registry::from_config(config);
    let hub = MetricsHub::new().map_err(anyhow::Error::msg)?;
    let mut pipeline = ReadPipeline::new(
        Arc::new(registry),
        config.brokermqtt.topic_root.clone(),
        config.rfplayer.max_payload,
        hub.gw.clone(),
    );

    // Chunk sizes cycle 1..=chunk so frames straddle reads at every offset
    let mut offset = 0;
    let mut size = 1;
    let max = chunk.max(1);
    while offset < bytes.len() {
        let end = (offset + size).min(bytes.len());
        for reading in pipeline.push(&bytes[offset..end]) {
            println!(
                "{} {}",
                reading.topic,
                reading.to_json(OffsetDateTime::now_utc())?
            );
        }
        offset = end;
        size = size % max + 1;
    }
    let report = pipeline.report();
    info!(
        bytes = bytes.len(),
        frames = report.frames,
        readings = report.readings,
        skipped = report.skipped,
        desyncs = report.desyncs,
        decode_errors = report.decode_errors,
        "replay finished"
    );
    Ok(())
}

fn open_port(backend: Backend, name: &str, settings: PortSettings) -> Result<Box<dyn RfpPort>> {
    match backend {
        Backend::Mock => Ok(Box::new(MockPort::open(name, settings)?)),
        Backend::Serial => open_serial(name, settings),
    }
}

#[cfg(feature = "serial")]
fn open_serial(name: &str, settings: PortSettings) -> Result<Box<dyn RfpPort>> {
    let port = rfp_transport::SerialRfpPort::open(name, settings)
        .with_context(|| format!("opening serial port {name}"))?;
    Ok(Box::new(port))
}

#[cfg(not(feature = "serial"))]
fn open_serial(_name: &str, _settings: PortSettings) -> Result<Box<dyn RfpPort>> {
    anyhow::bail!("serial backend not built; rebuild with `--features serial` or use `--backend mock`")
}

async fn run(
    config: GatewayConfig,
    backend: Backend,
    device: Option<String>,
    mqtt: bool,
) -> Result<()> {
    let (registry, report) = Registry::from_config(&config);
    let hub = MetricsHub::new().map_err(anyhow::Error::msg)?;
    hub.record_load(&report);

    let name = device.unwrap_or_else(|| config.rfplayer.port.clone());
    let settings = PortSettings {
        baud: config.rfplayer.baud,
        read_timeout: Duration::from_millis(config.rfplayer.read_timeout_ms.max(1)),
    };
    let port = open_port(backend, &name, settings)?;
    info!(port = %name, ?backend, baud = settings.baud, "connected to RFPlayer dongle");

    let (cmd_tx, cmd_rx) = tokio::sync::mpsc::channel(config.rfplayer.queue_capacity.max(1));
    let (bridge, bus_task) = if mqtt {
        let (bridge, task) = connect_mqtt(&config, cmd_tx)?;
        (bridge, Some(task))
    } else {
        bridge::spawn_stdin_commands(config.brokermqtt.subscribe.clone(), cmd_tx);
        let stdout: Arc<dyn Bridge> = Arc::new(bridge::StdoutBridge::default());
        (stdout, None)
    };

    let gateway = Gateway::start(
        port,
        Arc::new(registry),
        bridge,
        cmd_rx,
        GatewayOptions::from_config(&config),
        hub.gw.clone(),
    )
    .await?;

    let summary = gateway
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    if let Some(task) = bus_task {
        task.abort();
    }
    info!(?summary, "shutdown complete");
    info!("metrics\n{}", hub.encode_text());
    Ok(())
}

#[cfg(feature = "mqtt")]
fn connect_mqtt(
    config: &GatewayConfig,
    commands: tokio::sync::mpsc::Sender<rfp_gateway::InboundCommand>,
) -> Result<(Arc<dyn Bridge>, tokio::task::JoinHandle<()>)> {
    let (mqtt, task) = bridge::mqtt::MqttBridge::connect(&config.brokermqtt, commands);
    let bridge: Arc<dyn Bridge> = Arc::new(mqtt);
    Ok((bridge, task))
}

#[cfg(not(feature = "mqtt"))]
fn connect_mqtt(
    _config: &GatewayConfig,
    _commands: tokio::sync::mpsc::Sender<rfp_gateway::InboundCommand>,
) -> Result<(Arc<dyn Bridge>, tokio::task::JoinHandle<()>)> {
    anyhow::bail!("MQTT bridge not built; rebuild with `--features mqtt`")
}
