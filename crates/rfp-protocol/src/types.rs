use serde::{Deserialize, Deserializer, Serialize};

/// Whole gateway configuration file. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub rfplayer: PlayerConfig,
    #[serde(alias = "brockermqtt")]
    pub brokermqtt: BrokerConfig,
    pub log: LogConfig,
    pub sensors: Vec<SensorConfig>,
    pub actuators: Vec<ActuatorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub port: String,
    pub baud: u32,
    /// Minimum delay between two frames written to the dongle, in ms.
    #[serde(rename = "waittosend")]
    pub wait_to_send_ms: u64,
    #[serde(rename = "queue")]
    pub queue_capacity: usize,
    #[serde(rename = "timeout")]
    pub read_timeout_ms: u64,
    /// Start the read activity at all.
    pub rx: bool,
    #[serde(rename = "maxpayload")]
    pub max_payload: usize,
    #[serde(rename = "flushonshutdown")]
    pub flush_on_shutdown: bool,
    pub initialisation: Vec<InitCommand>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 115_200,
            wait_to_send_ms: 500,
            queue_capacity: 100,
            read_timeout_ms: 100,
            rx: true,
            max_payload: crate::reassembler::DEFAULT_MAX_PAYLOAD,
            flush_on_shutdown: true,
            initialisation: Vec::new(),
        }
    }
}

/// ASCII command written verbatim (NUL-terminated) when the gateway starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitCommand {
    pub cmd: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(rename = "clientid")]
    pub client_id: String,
    #[serde(rename = "topicroot")]
    pub topic_root: String,
    pub subscribe: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            client_id: "rfp2mqtt_pubsub".to_string(),
            topic_root: "rfp2mqtt".to_string(),
            subscribe: "home/action/#".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Ascii,
    Json,
}

/// Stream the log lines go to. Defaults to stderr so stdout stays free for
/// the stdio bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutput {
    Stdout,
    #[default]
    Stderr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: String,
    pub output: LogOutput,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Ascii,
            level: "info".to_string(),
            output: LogOutput::Stderr,
        }
    }
}

/// A known sensor, keyed by its reading reference (e.g. "4-1234").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(alias = "nom")]
    pub name: String,
    #[serde(default)]
    pub topic: Option<String>,
}

/// A controllable device, keyed by the name used in command topics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub name: String,
    /// Letter+number house code ("A1") or raw numeric id ("123456").
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub protocol: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
}

/// Ids are often written unquoted in YAML (`id: 123456`).
fn string_or_number<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(u64),
    }
    Ok(match Raw::deserialize(de)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
    })
}
