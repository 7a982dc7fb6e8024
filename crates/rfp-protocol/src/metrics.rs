use crate::registry::LoadReport;
use prometheus::{Encoder, IntCounter, IntGauge, Registry as PromRegistry, TextEncoder};

#[derive(Clone)]
pub struct GatewayMetrics {
    pub rx_frames: IntCounter,
    pub rx_desync: IntCounter,
    pub decode_errors: IntCounter,
    pub readings: IntCounter,
    pub tx_frames: IntCounter,
    pub commands_rejected: IntCounter,
    pub sensors_loaded: IntGauge,
    pub actuators_loaded: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: PromRegistry,
    pub gw: GatewayMetrics,
}

fn counter(name: &str, help: &str) -> Result<IntCounter, String> {
    IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
}

fn gauge(name: &str, help: &str) -> Result<IntGauge, String> {
    IntGauge::new(name, help).map_err(|e| format!("metrics init error: {e}"))
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = PromRegistry::new();
        let gw = GatewayMetrics {
            rx_frames: counter("rfp_rx_frames", "Complete frames recovered from the dongle")?,
            rx_desync: counter("rfp_rx_desync", "Desynchronization events in the byte stream")?,
            decode_errors: counter("rfp_decode_errors", "Frames that failed to decode")?,
            readings: counter("rfp_readings", "Sensor readings decoded")?,
            tx_frames: counter("rfp_tx_frames", "Command frames written to the dongle")?,
            commands_rejected: counter(
                "rfp_commands_rejected",
                "Inbound commands rejected before reaching the dongle",
            )?,
            sensors_loaded: gauge("rfp_sensors_loaded", "Sensors in the registry")?,
            actuators_loaded: gauge("rfp_actuators_loaded", "Actuators in the registry")?,
        };
        let _ = registry.register(Box::new(gw.rx_frames.clone()));
        let _ = registry.register(Box::new(gw.rx_desync.clone()));
        let _ = registry.register(Box::new(gw.decode_errors.clone()));
        let _ = registry.register(Box::new(gw.readings.clone()));
        let _ = registry.register(Box::new(gw.tx_frames.clone()));
        let _ = registry.register(Box::new(gw.commands_rejected.clone()));
        let _ = registry.register(Box::new(gw.sensors_loaded.clone()));
        let _ = registry.register(Box::new(gw.actuators_loaded.clone()));
        Ok(Self { registry, gw })
    }

    pub fn record_load(&self, report: &LoadReport) {
        self.gw.sensors_loaded.set(report.sensors as i64);
        self.gw.actuators_loaded.set(report.actuators as i64);
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_text_output() {
        let hub = MetricsHub::new().unwrap();
        hub.gw.rx_frames.inc();
        hub.gw.rx_frames.inc();
        hub.record_load(&LoadReport {
            sensors: 3,
            actuators: 1,
            duplicates: vec![],
        });
        let text = hub.encode_text();
        assert!(text.contains("rfp_rx_frames 2"));
        assert!(text.contains("rfp_sensors_loaded 3"));
        assert!(text.contains("rfp_commands_rejected 0"));
    }
}
