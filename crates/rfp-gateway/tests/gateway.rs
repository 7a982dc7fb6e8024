use async_trait::async_trait;
use rfp_gateway::{Bridge, BridgeError, Gateway, GatewayOptions, InboundCommand};
use rfp_protocol::frame::SOURCE_DEST_RF;
use rfp_protocol::{load_config_str, MetricsHub, RawFrame, Registry};
use rfp_transport::MockPort;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const CONFIG: &str = r#"
rfplayer:
  waittosend: 40
  initialisation:
    - cmd: "FORMAT BINARY"
brokermqtt:
  topicroot: rfp
sensors:
  - id: "4-1179649"
    nom: home/salon
    topic: home/salon/th
actuators:
  - name: volet
    id: A1
    protocol: rts
  - name: prise
    id: B3
    protocol: chacon
"#;

#[derive(Default)]
struct RecordingBridge {
    published: Mutex<Vec<(String, String)>>,
}

impl RecordingBridge {
    fn messages(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Bridge for RecordingBridge {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BridgeError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

struct Harness {
    port: MockPort,
    bridge: Arc<RecordingBridge>,
    commands: mpsc::Sender<InboundCommand>,
    gateway: Gateway,
    metrics: MetricsHub,
}

async fn start(options: impl FnOnce(&mut GatewayOptions)) -> Harness {
    let config = load_config_str(CONFIG).unwrap();
    let (registry, _) = Registry::from_config(&config);
    let mut opts = GatewayOptions::from_config(&config);
    options(&mut opts);

    let port = MockPort::new("mock0").with_read_timeout(Duration::from_millis(5));
    let bridge = Arc::new(RecordingBridge::default());
    let (tx, rx) = mpsc::channel(16);
    let metrics = MetricsHub::new().unwrap();
    let gateway = Gateway::start(
        Box::new(port.clone()),
        Arc::new(registry),
        bridge.clone(),
        rx,
        opts,
        metrics.gw.clone(),
    )
    .await
    .unwrap();
    Harness {
        port,
        bridge,
        commands: tx,
        gateway,
        metrics,
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn oregon_frame(id_channel: u16, temp: i16, hygro: u16) -> Vec<u8> {
    let mut payload = vec![0u8, 0, 0, 0xC4, 0xA6, 0x40, 0x05, 4];
    for w in [0x1A2Du16, 0x0012, id_channel, 0, temp as u16, hygro] {
        payload.extend_from_slice(&w.to_le_bytes());
    }
    RawFrame::wrap(SOURCE_DEST_RF, &payload).unwrap().into_bytes()
}

#[tokio::test]
async fn readings_reach_the_bridge_in_stream_order() {
    let h = start(|_| {}).await;
    let mut stream = oregon_frame(1, 215, 45);
    stream.extend(oregon_frame(2, -12, 80));
    // split mid-header and mid-payload
    h.port.feed(&stream[..3]);
    h.port.feed(&stream[3..20]);
    h.port.feed(&stream[20..]);

    let bridge = h.bridge.clone();
    wait_until(|| bridge.messages().len() == 2).await;
    let report = h.gateway.shutdown().await.unwrap();
    assert_eq!(report.read.readings, 2);
    assert_eq!(report.publish.published, 2);

    let msgs = h.bridge.messages();
    assert_eq!(msgs[0].0, "home/salon/th");
    let first: serde_json::Value = serde_json::from_str(&msgs[0].1).unwrap();
    assert_eq!(first["t"], "21.5");
    assert_eq!(first["h"], "45");
    assert_eq!(first["n"], "salon");
    assert_eq!(first["r"], "4-1179649");

    assert_eq!(msgs[1].0, "rfp/4-1179650/th");
    let second: serde_json::Value = serde_json::from_str(&msgs[1].1).unwrap();
    assert_eq!(second["t"], "-1.2");
    assert_eq!(h.metrics.gw.readings.get(), 2);
}

#[tokio::test]
async fn init_commands_are_written_first_and_nul_terminated() {
    let h = start(|_| {}).await;
    let writes = h.port.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].bytes, b"FORMAT BINARY\0".to_vec());
    h.gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn commands_are_encoded_and_rate_limited() {
    let h = start(|o| o.init_commands.clear()).await;
    for token in ["1", "0", "2", "1", "0", "2"] {
        h.commands
            .send(InboundCommand::new("home/action/volet", token))
            .await
            .unwrap();
    }
    let port = h.port.clone();
    wait_until(|| port.writes().len() == 6).await;
    let report = h.gateway.shutdown().await.unwrap();
    assert_eq!(report.commands.accepted, 6);
    assert_eq!(report.dispatch.written, 6);

    let writes = h.port.writes();
    for pair in writes.windows(2) {
        let gap = pair[1].at.duration_since(pair[0].at);
        assert!(gap >= Duration::from_millis(40), "writes only {gap:?} apart");
    }
    // RTS "My" position
    assert_eq!(writes[2].bytes[7], 11);
    assert_eq!(writes[2].bytes[8], 2);
    assert_eq!(writes[2].bytes[13], 4);
    assert_eq!(writes[0].bytes[13], 0);
}

#[tokio::test]
async fn unresolvable_commands_never_reach_the_port() {
    let h = start(|o| o.init_commands.clear()).await;
    for (topic, token) in [
        ("home/action/unknown", "1"),
        ("home/action/prise", "Eco"),
        ("home/action", "1"),
        ("home/status/prise", "1"),
        ("home/action/prise", "1"),
    ] {
        h.commands
            .send(InboundCommand::new(topic, token))
            .await
            .unwrap();
    }
    let port = h.port.clone();
    wait_until(|| port.writes().len() == 1).await;
    let report = h.gateway.shutdown().await.unwrap();
    assert_eq!(report.commands.rejected, 4);
    assert_eq!(report.commands.accepted, 1);
    assert_eq!(h.metrics.gw.commands_rejected.get(), 4);
    let frame = &h.port.writes()[0].bytes;
    assert_eq!(&frame[7..13], &[0x03, 0x01, 18, 0, 0, 0]);
}

#[tokio::test]
async fn pending_commands_are_flushed_on_shutdown() {
    let h = start(|o| {
        o.init_commands.clear();
        o.dispatch.min_interval = Duration::from_millis(20);
    })
    .await;
    let handle = h.gateway.dispatch_handle();
    for i in 0..4u8 {
        handle.enqueue(vec![i]).unwrap();
    }
    drop(handle);
    let report = h.gateway.shutdown().await.unwrap();
    assert_eq!(report.dispatch.written, 4);
    assert_eq!(report.dispatch.dropped, 0);
    assert_eq!(h.port.writes().len(), 4);
}

#[tokio::test]
async fn end_of_stream_stops_the_gateway() {
    let h = start(|o| o.init_commands.clear()).await;
    h.port.feed(&oregon_frame(7, 100, 10));
    h.port.hang_up_when_drained();
    let report = tokio::time::timeout(
        Duration::from_secs(5),
        h.gateway.run_until(std::future::pending()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(report.read.readings, 1);
    assert_eq!(report.publish.published, 1);
}

#[tokio::test]
async fn garbage_between_frames_is_discarded() {
    let h = start(|o| o.init_commands.clear()).await;
    h.port.feed(&[0x55; 100]);
    h.port.feed(&oregon_frame(3, 50, 20));
    let bridge = h.bridge.clone();
    wait_until(|| bridge.messages().len() == 1).await;
    let report = h.gateway.shutdown().await.unwrap();
    assert_eq!(report.read.desyncs, 1);
    assert_eq!(report.read.frames, 1);
}
