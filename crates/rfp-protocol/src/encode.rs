//! Outbound command frames.
//!
//! Every command is the same 17-byte shape: the frame header with a constant
//! payload length of 12, then protocol, action, device id and dim value.

use crate::frame::{RawFrame, HEADER_LEN, SOURCE_DEST_RF, SYNC};
use crate::registry::Registry;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const COMMAND_PAYLOAD_LEN: usize = 12;
pub const COMMAND_FRAME_LEN: usize = HEADER_LEN + COMMAND_PAYLOAD_LEN;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("unknown actuator '{0}'")]
    UnknownActuator(String),
    #[error("actuator '{0}' has no protocol configured")]
    MissingProtocol(String),
    #[error("actuator '{0}' has no device id configured")]
    MissingDeviceId(String),
    #[error("unsupported protocol '{0}'")]
    UnknownProtocol(String),
    #[error("token '{token}' is not a valid action for {protocol}")]
    UnsupportedAction { protocol: Protocol, token: String },
    #[error("invalid device id '{0}'")]
    InvalidDeviceId(String),
}

/// Radio protocols the dongle can transmit, with their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Protocol {
    Visonic433 = 1,
    Visonic868 = 2,
    Chacon = 3,
    Domia = 4,
    X10 = 5,
    X2d433 = 6,
    X2d868 = 7,
    X2dShutter = 8,
    X2dHaElec = 9,
    X2dHaGas = 10,
    SomfyRts = 11,
    Blyss = 12,
    Parrot = 13,
    Fs20 = 14,
    Kd101 = 15,
    Edisio = 16,
}

impl Protocol {
    pub const ALL: [Protocol; 16] = [
        Protocol::Visonic433,
        Protocol::Visonic868,
        Protocol::Chacon,
        Protocol::Domia,
        Protocol::X10,
        Protocol::X2d433,
        Protocol::X2d868,
        Protocol::X2dShutter,
        Protocol::X2dHaElec,
        Protocol::X2dHaGas,
        Protocol::SomfyRts,
        Protocol::Blyss,
        Protocol::Parrot,
        Protocol::Fs20,
        Protocol::Kd101,
        Protocol::Edisio,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Protocol::Visonic433 => "visonic433",
            Protocol::Visonic868 => "visonic868",
            Protocol::Chacon => "chacon",
            Protocol::Domia => "domia",
            Protocol::X10 => "x10",
            Protocol::X2d433 => "x2d433",
            Protocol::X2d868 => "x2d868",
            Protocol::X2dShutter => "x2dshutter",
            Protocol::X2dHaElec => "x2dhaelec",
            Protocol::X2dHaGas => "x2dhagas",
            Protocol::SomfyRts => "somfyrts",
            Protocol::Blyss => "blyss",
            Protocol::Parrot => "parrot",
            Protocol::Fs20 => "fs20",
            Protocol::Kd101 => "kd101",
            Protocol::Edisio => "edisio",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "dio" => Ok(Protocol::Chacon),
            "rts" => Ok(Protocol::SomfyRts),
            other => Protocol::ALL
                .into_iter()
                .find(|p| p.name() == other)
                .ok_or_else(|| EncodeError::UnknownProtocol(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Action {
    Off = 0,
    On = 1,
    Dim = 2,
    Assoc = 6,
}

impl Action {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Generic numeric tokens shared by every protocol but x2dhaelec.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "0" => Some(Action::Off),
            "1" => Some(Action::On),
            "2" => Some(Action::Dim),
            "6" => Some(Action::Assoc),
            _ => None,
        }
    }
}

/// Named heating modes of the X2D electric heating protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaElecMode {
    Auto,
    AutoLow,
    Eco,
    EcoLow,
    Confort,
    ConfortLow,
    Stop,
    HorsGel,
}

impl HaElecMode {
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "Auto" => HaElecMode::Auto,
            "AutoLow" => HaElecMode::AutoLow,
            "Eco" => HaElecMode::Eco,
            "EcoLow" => HaElecMode::EcoLow,
            "Confort" => HaElecMode::Confort,
            "ConfortLow" => HaElecMode::ConfortLow,
            "Stop" => HaElecMode::Stop,
            "HorsGel" => HaElecMode::HorsGel,
            _ => return None,
        })
    }

    pub fn action(self) -> Action {
        match self {
            HaElecMode::AutoLow | HaElecMode::EcoLow | HaElecMode::ConfortLow => Action::Off,
            HaElecMode::Auto
            | HaElecMode::Eco
            | HaElecMode::Confort
            | HaElecMode::Stop
            | HaElecMode::HorsGel => Action::On,
        }
    }

    /// Percentage code carried in the dim byte.
    pub fn dim_value(self) -> u8 {
        match self {
            HaElecMode::Eco | HaElecMode::EcoLow => 0,
            HaElecMode::Confort | HaElecMode::ConfortLow => 3,
            HaElecMode::Stop => 4,
            HaElecMode::HorsGel => 5,
            HaElecMode::Auto | HaElecMode::AutoLow => 7,
        }
    }
}

/// Map a token to `(action, dim value)` for a protocol.
pub fn resolve_action(protocol: Protocol, token: &str) -> Result<(Action, u8), EncodeError> {
    let token = token.trim();
    let unsupported = || EncodeError::UnsupportedAction {
        protocol,
        token: token.to_string(),
    };
    match protocol {
        Protocol::X2dHaElec => {
            let mode = HaElecMode::from_token(token).ok_or_else(unsupported)?;
            Ok((mode.action(), mode.dim_value()))
        }
        Protocol::SomfyRts => {
            let action = Action::from_token(token).ok_or_else(unsupported)?;
            // DIM on RTS is the "My" position
            let dim = if action == Action::Dim { 4 } else { 0 };
            Ok((action, dim))
        }
        _ => Ok((Action::from_token(token).ok_or_else(unsupported)?, 0)),
    }
}

/// Parse an actuator device code.
///
/// `A1`..`P16` style house/unit codes map to `(letter - 'A') * 16 + number - 1`;
/// decimal or `0x` hexadecimal codes are taken as the raw id.
pub fn parse_device_id(code: &str) -> Result<u32, EncodeError> {
    let code = code.trim();
    let invalid = || EncodeError::InvalidDeviceId(code.to_string());
    if let Some(hex) = code
        .strip_prefix("0x")
        .or_else(|| code.strip_prefix("0X"))
    {
        return u32::from_str_radix(hex, 16).map_err(|_| invalid());
    }
    let mut chars = code.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => code.parse::<u32>().map_err(|_| invalid()),
        Some(c) if c.is_ascii_alphabetic() => {
            let letter = u32::from(c.to_ascii_uppercase() as u8 - b'A');
            let number: u32 = chars.as_str().parse().map_err(|_| invalid())?;
            if number == 0 {
                return Err(invalid());
            }
            letter
                .checked_mul(16)
                .and_then(|v| v.checked_add(number - 1))
                .ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

/// A fully resolved command, ready to serialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorCommand {
    pub name: String,
    pub protocol: Protocol,
    pub device_id: u32,
    pub action: Action,
    pub dim_value: u8,
}

impl ActuatorCommand {
    pub fn new(
        name: impl Into<String>,
        protocol: Protocol,
        device_id: u32,
        token: &str,
    ) -> Result<Self, EncodeError> {
        let (action, dim_value) = resolve_action(protocol, token)?;
        Ok(Self {
            name: name.into(),
            protocol,
            device_id,
            action,
            dim_value,
        })
    }

    /// Look the actuator up in the registry and resolve `token` against its
    /// protocol. Every miss is an error; nothing defaults to zero.
    pub fn resolve(registry: &Registry, name: &str, token: &str) -> Result<Self, EncodeError> {
        let entry = registry
            .actuator(name)
            .ok_or_else(|| EncodeError::UnknownActuator(name.to_string()))?;
        let protocol: Protocol = entry
            .protocol
            .ok_or_else(|| EncodeError::MissingProtocol(name.to_string()))?
            .parse()?;
        let device_id = parse_device_id(
            entry
                .device_id
                .ok_or_else(|| EncodeError::MissingDeviceId(name.to_string()))?,
        )?;
        Self::new(name, protocol, device_id, token)
    }

    pub fn encode(&self) -> [u8; COMMAND_FRAME_LEN] {
        let mut out = [0u8; COMMAND_FRAME_LEN];
        out[..2].copy_from_slice(&SYNC);
        out[2] = SOURCE_DEST_RF;
        out[3..5].copy_from_slice(&(COMMAND_PAYLOAD_LEN as u16).to_le_bytes());
        // 5: frameType, 6: cluster
        out[7] = self.protocol.code();
        out[8] = self.action.code();
        out[9..13].copy_from_slice(&self.device_id.to_le_bytes());
        out[13] = self.dim_value;
        // 14: burst, 15: qualifier, 16: reserved
        out
    }

    pub fn to_frame(&self) -> RawFrame {
        RawFrame::from_parts_unchecked(self.encode().to_vec())
    }
}

/// Resolve and serialize in one step.
pub fn encode_command(registry: &Registry, name: &str, token: &str) -> Result<Vec<u8>, EncodeError> {
    let command = ActuatorCommand::resolve(registry, name, token)?;
    tracing::debug!(
        actuator = name,
        protocol = %command.protocol,
        device_id = command.device_id,
        action = ?command.action,
        dim = command.dim_value,
        "encoded command"
    );
    Ok(command.encode().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActuatorConfig;

    fn registry(entries: &[(&str, &str, &str)]) -> Registry {
        let mut reg = Registry::new();
        for (name, id, protocol) in entries {
            reg.insert_actuator(&ActuatorConfig {
                name: name.to_string(),
                id: id.to_string(),
                protocol: protocol.to_string(),
                topic: None,
                command: None,
            })
            .unwrap();
        }
        reg
    }

    #[test]
    fn house_unit_codes() {
        assert_eq!(parse_device_id("A1"), Ok(0));
        assert_eq!(parse_device_id("B1"), Ok(16));
        assert_eq!(parse_device_id("C2"), Ok(33));
        assert_eq!(parse_device_id("p16"), Ok(255));
        assert_eq!(parse_device_id("123456"), Ok(123_456));
        assert_eq!(parse_device_id("0x1A2B"), Ok(0x1A2B));
        assert!(parse_device_id("A0").is_err());
        assert!(parse_device_id("A").is_err());
        assert!(parse_device_id("").is_err());
        assert!(parse_device_id("#4").is_err());
    }

    #[test]
    fn chacon_on_frame_layout() {
        let reg = registry(&[("prise", "B3", "chacon")]);
        let bytes = encode_command(&reg, "prise", "1").unwrap();
        assert_eq!(
            bytes,
            vec![b'Z', b'I', 0x01, 0x0C, 0x00, 0, 0, 0x03, 0x01, 18, 0, 0, 0, 0, 0, 0, 0]
        );
        let frame = RawFrame::from_bytes(bytes).unwrap();
        assert_eq!(frame.payload_len(), COMMAND_PAYLOAD_LEN);
    }

    #[test]
    fn protocol_names_and_aliases() {
        assert_eq!("dio".parse::<Protocol>(), Ok(Protocol::Chacon));
        assert_eq!("RTS".parse::<Protocol>(), Ok(Protocol::SomfyRts));
        assert_eq!("edisio".parse::<Protocol>().map(Protocol::code), Ok(16));
        assert_eq!("visonic433".parse::<Protocol>().map(Protocol::code), Ok(1));
        for p in Protocol::ALL {
            assert_eq!(p.name().parse::<Protocol>(), Ok(p));
        }
        assert!(matches!(
            "zigbee".parse::<Protocol>(),
            Err(EncodeError::UnknownProtocol(_))
        ));
    }

    #[test]
    fn rts_my_position_uses_dim_four() {
        let reg = registry(&[("volet", "A1", "rts")]);
        for (token, action, dim) in [("0", 0, 0), ("1", 1, 0), ("2", 2, 4), ("6", 6, 0)] {
            let c = ActuatorCommand::resolve(&reg, "volet", token).unwrap();
            assert_eq!(c.encode()[7], 11);
            assert_eq!(c.encode()[8], action, "token {token}");
            assert_eq!(c.encode()[13], dim, "token {token}");
        }
    }

    #[test]
    fn ha_elec_modes() {
        let cases = [
            ("Eco", 1, 0),
            ("EcoLow", 0, 0),
            ("Confort", 1, 3),
            ("ConfortLow", 0, 3),
            ("Stop", 1, 4),
            ("HorsGel", 1, 5),
            ("Auto", 1, 7),
            ("AutoLow", 0, 7),
        ];
        for (token, action, dim) in cases {
            let c = ActuatorCommand::new("rad", Protocol::X2dHaElec, 5, token).unwrap();
            assert_eq!((c.action.code(), c.dim_value), (action, dim), "{token}");
            assert_eq!(c.encode()[7], 9);
        }
        assert!(ActuatorCommand::new("rad", Protocol::X2dHaElec, 5, "1").is_err());
    }

    #[test]
    fn unresolvable_commands_are_rejected() {
        let reg = registry(&[("lamp", "A1", "zwave"), ("bad", "Z", "x10"), ("ok", "A2", "x10")]);
        assert_eq!(
            encode_command(&reg, "nope", "1"),
            Err(EncodeError::UnknownActuator("nope".to_string()))
        );
        assert_eq!(
            encode_command(&reg, "lamp", "1"),
            Err(EncodeError::UnknownProtocol("zwave".to_string()))
        );
        assert!(matches!(
            encode_command(&reg, "bad", "1"),
            Err(EncodeError::InvalidDeviceId(_))
        ));
        assert!(matches!(
            encode_command(&reg, "ok", "Eco"),
            Err(EncodeError::UnsupportedAction { .. })
        ));
        assert!(encode_command(&reg, "ok", "6").is_ok());
    }
}
