use crate::types::{ActuatorConfig, GatewayConfig, SensorConfig};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The six independent lookup tables held by a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Store {
    SensorName,
    SensorTopic,
    ActuatorId,
    ActuatorTopic,
    ActuatorCommand,
    ActuatorProtocol,
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Store::SensorName => "sensor name",
            Store::SensorTopic => "sensor topic",
            Store::ActuatorId => "actuator id",
            Store::ActuatorTopic => "actuator topic",
            Store::ActuatorCommand => "actuator command",
            Store::ActuatorProtocol => "actuator protocol",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{store} already defined for '{key}', keeping the first entry")]
    Duplicate { store: Store, key: String },
}

/// Outcome of a bulk load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub sensors: usize,
    pub actuators: usize,
    pub duplicates: Vec<String>,
}

/// Borrowed view over everything known about one actuator.
#[derive(Debug, Clone, Copy)]
pub struct ActuatorEntry<'a> {
    pub name: &'a str,
    pub device_id: Option<&'a str>,
    pub protocol: Option<&'a str>,
    pub topic: Option<&'a str>,
    pub command: Option<&'a str>,
}

/// Sensor and actuator metadata loaded once at startup.
///
/// Every table is first-write-wins: inserting an existing key is rejected and
/// the stored value is left untouched. After loading the registry is meant to
/// be shared read-only (typically behind an `Arc`).
#[derive(Debug, Default, Clone)]
pub struct Registry {
    sensor_names: HashMap<String, String>,
    sensor_topics: HashMap<String, String>,
    actuator_ids: HashMap<String, String>,
    actuator_topics: HashMap<String, String>,
    actuator_commands: HashMap<String, String>,
    actuator_protocols: HashMap<String, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the `sensors` and `actuators` sections.
    pub fn from_config(config: &GatewayConfig) -> (Self, LoadReport) {
        let mut reg = Registry::new();
        let mut report = LoadReport::default();
        for sensor in &config.sensors {
            tracing::debug!(id = %sensor.id, name = %sensor.name, topic = ?sensor.topic, "loading sensor");
            match reg.insert_sensor(sensor) {
                Ok(()) => report.sensors += 1,
                Err(e) => report.duplicates.push(e.to_string()),
            }
        }
        for actuator in &config.actuators {
            tracing::debug!(name = %actuator.name, id = %actuator.id, protocol = %actuator.protocol, "loading actuator");
            match reg.insert_actuator(actuator) {
                Ok(()) => report.actuators += 1,
                Err(e) => report.duplicates.push(e.to_string()),
            }
        }
        tracing::info!(
            sensors = reg.sensor_count(),
            actuators = reg.actuator_count(),
            rejected = report.duplicates.len(),
            "registry loaded"
        );
        (reg, report)
    }

    /// Register a sensor. A sensor without an explicit topic publishes on its
    /// name, which is expected to be a topic path.
    pub fn insert_sensor(&mut self, sensor: &SensorConfig) -> Result<(), RegistryError> {
        let topic = non_empty(sensor.topic.as_deref()).unwrap_or(&sensor.name);
        let name = insert_first(
            &mut self.sensor_names,
            Store::SensorName,
            &sensor.id,
            &sensor.name,
        );
        let topic = insert_first(&mut self.sensor_topics, Store::SensorTopic, &sensor.id, topic);
        name.and(topic)
    }

    /// Register an actuator. A name already present rejects the whole entry,
    /// including its optional topic and command.
    pub fn insert_actuator(&mut self, actuator: &ActuatorConfig) -> Result<(), RegistryError> {
        let key = &actuator.name;
        insert_first(&mut self.actuator_ids, Store::ActuatorId, key, &actuator.id)?;
        insert_first(
            &mut self.actuator_protocols,
            Store::ActuatorProtocol,
            key,
            &actuator.protocol,
        )?;
        if let Some(topic) = non_empty(actuator.topic.as_deref()) {
            insert_first(&mut self.actuator_topics, Store::ActuatorTopic, key, topic)?;
        }
        if let Some(command) = non_empty(actuator.command.as_deref()) {
            insert_first(
                &mut self.actuator_commands,
                Store::ActuatorCommand,
                key,
                command,
            )?;
        }
        Ok(())
    }

    pub fn sensor_name(&self, reference: &str) -> Option<&str> {
        self.sensor_names.get(reference).map(String::as_str)
    }

    pub fn sensor_topic(&self, reference: &str) -> Option<&str> {
        self.sensor_topics.get(reference).map(String::as_str)
    }

    pub fn actuator_device_id(&self, name: &str) -> Option<&str> {
        self.actuator_ids.get(name).map(String::as_str)
    }

    pub fn actuator_topic(&self, name: &str) -> Option<&str> {
        self.actuator_topics.get(name).map(String::as_str)
    }

    pub fn actuator_command(&self, name: &str) -> Option<&str> {
        self.actuator_commands.get(name).map(String::as_str)
    }

    pub fn actuator_protocol(&self, name: &str) -> Option<&str> {
        self.actuator_protocols.get(name).map(String::as_str)
    }

    pub fn actuator<'a>(&'a self, name: &'a str) -> Option<ActuatorEntry<'a>> {
        let device_id = self.actuator_device_id(name);
        let protocol = self.actuator_protocol(name);
        if device_id.is_none() && protocol.is_none() {
            return None;
        }
        Some(ActuatorEntry {
            name,
            device_id,
            protocol,
            topic: self.actuator_topic(name),
            command: self.actuator_command(name),
        })
    }

    pub fn sensor_count(&self) -> usize {
        self.sensor_names.len()
    }

    pub fn actuator_count(&self) -> usize {
        self.actuator_ids.len()
    }

    /// Actuator names in sorted order.
    pub fn actuator_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actuator_ids.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

fn insert_first(
    map: &mut HashMap<String, String>,
    store: Store,
    key: &str,
    value: &str,
) -> Result<(), RegistryError> {
    match map.entry(key.to_string()) {
        Entry::Occupied(_) => {
            tracing::warn!(%store, key, "duplicate registry key rejected");
            Err(RegistryError::Duplicate {
                store,
                key: key.to_string(),
            })
        }
        Entry::Vacant(slot) => {
            slot.insert(value.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(id: &str, name: &str, topic: Option<&str>) -> SensorConfig {
        SensorConfig {
            id: id.to_string(),
            name: name.to_string(),
            topic: topic.map(str::to_string),
        }
    }

    fn actuator(name: &str, id: &str, protocol: &str) -> ActuatorConfig {
        ActuatorConfig {
            name: name.to_string(),
            id: id.to_string(),
            protocol: protocol.to_string(),
            topic: None,
            command: Some("0/1".to_string()),
        }
    }

    #[test]
    fn second_sensor_with_same_id_is_rejected() {
        let mut reg = Registry::new();
        reg.insert_sensor(&sensor("4-42", "home/salon", Some("home/salon/th")))
            .unwrap();
        let err = reg
            .insert_sensor(&sensor("4-42", "home/garage", Some("home/garage/th")))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                store: Store::SensorName,
                key: "4-42".to_string()
            }
        );
        assert_eq!(reg.sensor_name("4-42"), Some("home/salon"));
        assert_eq!(reg.sensor_topic("4-42"), Some("home/salon/th"));
        assert_eq!(reg.sensor_count(), 1);
    }

    #[test]
    fn sensor_without_topic_publishes_on_its_name() {
        let mut reg = Registry::new();
        reg.insert_sensor(&sensor("2-7", "home/door", None)).unwrap();
        reg.insert_sensor(&sensor("2-8", "home/window", Some("  ")))
            .unwrap();
        assert_eq!(reg.sensor_topic("2-7"), Some("home/door"));
        assert_eq!(reg.sensor_topic("2-8"), Some("home/window"));
        assert_eq!(reg.sensor_topic("2-9"), None);
    }

    #[test]
    fn actuator_lookups_and_duplicates() {
        let mut reg = Registry::new();
        reg.insert_actuator(&actuator("volet", "A1", "rts")).unwrap();
        assert!(reg.insert_actuator(&actuator("volet", "B2", "chacon")).is_err());

        let entry = reg.actuator("volet").unwrap();
        assert_eq!(entry.device_id, Some("A1"));
        assert_eq!(entry.protocol, Some("rts"));
        assert_eq!(entry.command, Some("0/1"));
        assert_eq!(entry.topic, None);
        assert!(reg.actuator("unknown").is_none());
        assert_eq!(reg.actuator_names(), vec!["volet"]);
    }

    #[test]
    fn rejected_actuator_leaves_no_fields_behind() {
        let mut reg = Registry::new();
        let mut first = actuator("volet", "A1", "rts");
        first.command = None;
        reg.insert_actuator(&first).unwrap();

        let mut second = actuator("volet", "B2", "chacon");
        second.topic = Some("home/other".to_string());
        second.command = Some("9".to_string());
        let err = reg.insert_actuator(&second).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                store: Store::ActuatorId,
                key: "volet".to_string()
            }
        );

        let entry = reg.actuator("volet").unwrap();
        assert_eq!(entry.device_id, Some("A1"));
        assert_eq!(entry.protocol, Some("rts"));
        assert_eq!(entry.topic, None);
        assert_eq!(entry.command, None);
    }

    #[test]
    fn from_config_reports_duplicates() {
        let config = GatewayConfig {
            sensors: vec![
                sensor("4-1", "home/a", None),
                sensor("4-1", "home/b", None),
                sensor("5-1", "home/c", None),
            ],
            actuators: vec![actuator("plug", "3", "dio")],
            ..Default::default()
        };
        let (reg, report) = Registry::from_config(&config);
        assert_eq!(report.sensors, 2);
        assert_eq!(report.actuators, 1);
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(reg.sensor_name("4-1"), Some("home/a"));
    }
}
