use crate::registry::{LoadReport, Registry};
use crate::types::GatewayConfig;
use anyhow::Context;
use serde_yaml::Value;
use std::fs;
use std::path::Path;

pub fn load_config_str(raw: &str) -> anyhow::Result<GatewayConfig> {
    let val: Value = serde_yaml::from_str(raw).context("parsing yaml")?;
    if val.is_null() {
        return Ok(GatewayConfig::default());
    }
    let config: GatewayConfig = serde_yaml::from_value(val).context("decoding configuration")?;
    Ok(config)
}

pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<GatewayConfig> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config: {}", path.display()))?;
    load_config_str(&raw).with_context(|| format!("loading config: {}", path.display()))
}

/// Load a config file and build the registry from it in one go.
pub fn load_registry_file(
    path: impl AsRef<Path>,
) -> anyhow::Result<(GatewayConfig, Registry, LoadReport)> {
    let config = load_config_file(path)?;
    let (registry, report) = Registry::from_config(&config);
    Ok((config, registry, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LogFormat, LogOutput};
    use std::io::Write;

    const SAMPLE: &str = r#"
rfplayer:
  port: /dev/ttyUSB1
  waittosend: 250
  initialisation:
    - cmd: "FORMAT BINARY"
    - cmd: "RECEIVER +*"
brockermqtt:
  topicroot: maison
log:
  format: json
  level: debug
  output: stdout
sensors:
  - id: "4-1179649"
    nom: home/salon
    topic: home/salon/th
  - id: "2-123"
    nom: home/porte
actuators:
  - name: volet
    id: A1
    protocol: rts
    topic: home/volet
    command: "0/1/2"
  - name: prise
    id: 123456
    protocol: dio
"#;

    #[test]
    fn parses_full_sample() {
        let config = load_config_str(SAMPLE).unwrap();
        assert_eq!(config.rfplayer.port, "/dev/ttyUSB1");
        assert_eq!(config.rfplayer.wait_to_send_ms, 250);
        assert_eq!(config.rfplayer.queue_capacity, 100);
        assert_eq!(config.rfplayer.initialisation.len(), 2);
        assert_eq!(config.brokermqtt.topic_root, "maison");
        assert_eq!(config.brokermqtt.subscribe, "home/action/#");
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.output, LogOutput::Stdout);
        assert_eq!(config.sensors[0].name, "home/salon");
        assert_eq!(config.actuators[1].id, "123456");
        assert_eq!(config.actuators[0].command.as_deref(), Some("0/1/2"));
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = load_config_str("").unwrap();
        assert_eq!(config.rfplayer.wait_to_send_ms, 500);
        assert_eq!(config.brokermqtt.topic_root, "rfp2mqtt");
        assert!(config.sensors.is_empty());
    }

    #[test]
    fn loads_registry_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let (config, registry, report) = load_registry_file(file.path()).unwrap();
        assert_eq!(config.sensors.len(), 2);
        assert_eq!(report.sensors, 2);
        assert_eq!(report.actuators, 2);
        assert_eq!(registry.sensor_topic("2-123"), Some("home/porte"));
        assert_eq!(registry.actuator_protocol("prise"), Some("dio"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_config_file("/nonexistent/rfp.yaml").unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }
}
