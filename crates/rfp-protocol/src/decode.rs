//! Binary RF frame decoding.
//!
//! After the 5-byte header the dongle sends an 8-byte radio preamble followed
//! by up to eleven little-endian words whose layout depends on the infoType
//! byte. Each layout has its own decode function; [`DECODERS`] maps the
//! infoType discriminant to it.

use crate::frame::RawFrame;
use crate::registry::Registry;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Absolute offset of the infoType byte.
pub const INFO_TYPE_OFFSET: usize = 12;
/// Absolute offset of the first infos word.
pub const INFOS_OFFSET: usize = 13;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too short for a radio header: {len} bytes")]
    NoRadioHeader { len: usize },
    #[error("infoType {info_type} needs {needed} info bytes, frame has {available}")]
    Truncated {
        info_type: u8,
        needed: usize,
        available: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtocolFamily {
    X10,
    Chacon,
    Visonic,
    Rts,
    Oregon,
    Owl,
    X2d,
    Deprecated,
    Linky,
    Fs20,
    Jamming,
}

impl ProtocolFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolFamily::X10 => "X10",
            ProtocolFamily::Chacon => "CHACON",
            ProtocolFamily::Visonic => "VISONIC",
            ProtocolFamily::Rts => "RTS",
            ProtocolFamily::Oregon => "OREGON",
            ProtocolFamily::Owl => "OWL",
            ProtocolFamily::X2d => "X2D",
            ProtocolFamily::Deprecated => "DEPRECATED",
            ProtocolFamily::Linky => "LINKY",
            ProtocolFamily::Fs20 => "FS20",
            ProtocolFamily::Jamming => "JAMMING",
        }
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the device id lives in the infos block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdScheme {
    /// One 32-bit word read at this infos offset.
    Direct(usize),
    /// `idPHY` (offset 2) and `idChannel` (offset 4) joined as `phy << 16 | channel`.
    PhyChannel,
}

/// The sixteen payload layouts, discriminated by the infoType byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum InfoType {
    X10 = 0,
    Chacon = 1,
    Visonic = 2,
    Rts = 3,
    OregonThermoHygro = 4,
    OregonPressure = 5,
    OregonWind = 6,
    OregonUv = 7,
    OwlPower = 8,
    OregonRain = 9,
    X2dThermostat = 10,
    X2dShutter = 11,
    DeprecatedThermostat = 12,
    Metering = 13,
    Fs20 = 14,
    Jamming = 15,
}

impl InfoType {
    pub const ALL: [InfoType; 16] = [
        InfoType::X10,
        InfoType::Chacon,
        InfoType::Visonic,
        InfoType::Rts,
        InfoType::OregonThermoHygro,
        InfoType::OregonPressure,
        InfoType::OregonWind,
        InfoType::OregonUv,
        InfoType::OwlPower,
        InfoType::OregonRain,
        InfoType::X2dThermostat,
        InfoType::X2dShutter,
        InfoType::DeprecatedThermostat,
        InfoType::Metering,
        InfoType::Fs20,
        InfoType::Jamming,
    ];

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(usize::from(v)).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn family(self) -> ProtocolFamily {
        match self {
            InfoType::X10 => ProtocolFamily::X10,
            InfoType::Chacon => ProtocolFamily::Chacon,
            InfoType::Visonic => ProtocolFamily::Visonic,
            InfoType::Rts => ProtocolFamily::Rts,
            InfoType::OregonThermoHygro
            | InfoType::OregonPressure
            | InfoType::OregonWind
            | InfoType::OregonUv
            | InfoType::OregonRain => ProtocolFamily::Oregon,
            InfoType::OwlPower => ProtocolFamily::Owl,
            InfoType::X2dThermostat | InfoType::X2dShutter => ProtocolFamily::X2d,
            InfoType::DeprecatedThermostat => ProtocolFamily::Deprecated,
            InfoType::Metering => ProtocolFamily::Linky,
            InfoType::Fs20 => ProtocolFamily::Fs20,
            InfoType::Jamming => ProtocolFamily::Jamming,
        }
    }

    /// Last path segment of the topic synthesized for unregistered sensors.
    pub fn topic_suffix(self) -> &'static str {
        match self {
            InfoType::X10 => "x10",
            InfoType::Chacon => "chacon",
            InfoType::Visonic => "visonic",
            InfoType::Rts => "rts",
            InfoType::OregonThermoHygro => "th",
            InfoType::OregonPressure => "thpa",
            InfoType::OregonWind => "wind",
            InfoType::OregonUv => "uv",
            InfoType::OwlPower => "owl",
            InfoType::OregonRain => "rain",
            InfoType::X2dThermostat => "x2dcontact",
            InfoType::X2dShutter => "x2dshutter",
            InfoType::DeprecatedThermostat => "null",
            InfoType::Metering => "linky",
            InfoType::Fs20 => "fs20",
            InfoType::Jamming => "jamming",
        }
    }

    pub fn id_scheme(self) -> IdScheme {
        match self {
            InfoType::X10 => IdScheme::Direct(0),
            InfoType::OregonThermoHygro
            | InfoType::OregonPressure
            | InfoType::OregonWind
            | InfoType::OregonUv
            | InfoType::OwlPower
            | InfoType::OregonRain => IdScheme::PhyChannel,
            _ => IdScheme::Direct(2),
        }
    }

    /// Bytes of the infos block this layout reads.
    pub fn infos_len(self) -> usize {
        match self {
            InfoType::X10 => 4,
            InfoType::Chacon | InfoType::Jamming => 6,
            InfoType::Visonic
            | InfoType::Rts
            | InfoType::X2dThermostat
            | InfoType::X2dShutter
            | InfoType::DeprecatedThermostat
            | InfoType::Fs20 => 8,
            InfoType::OregonUv => 10,
            InfoType::OregonThermoHygro | InfoType::OregonWind => 12,
            InfoType::OregonPressure | InfoType::OregonRain => 14,
            InfoType::OwlPower => 20,
            InfoType::Metering => 22,
        }
    }
}

impl fmt::Display for InfoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Radio preamble preceding the infoType byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RadioInfo {
    pub frame_type: u8,
    pub data_flag: u8,
    pub rf_level_db: i8,
    pub floor_noise_db: i8,
    pub rf_quality: u8,
    pub protocol: u8,
}

impl RadioInfo {
    fn parse(b: &[u8]) -> Option<Self> {
        Some(Self {
            frame_type: *b.get(5)?,
            data_flag: *b.get(6)?,
            rf_level_db: *b.get(8)? as i8,
            floor_noise_db: *b.get(9)? as i8,
            rf_quality: *b.get(10)?,
            protocol: *b.get(11)?,
        })
    }
}

/// Qualifier bits reported by Visonic detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VisonicFlags {
    pub tamper: bool,
    pub alarm: bool,
    pub low_batt: bool,
    pub alive: bool,
}

/// Qualifier bits reported by X2D devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct X2dFlags {
    pub tamper: bool,
    pub anomaly: bool,
    pub low_batt: bool,
    pub test_assoc: bool,
    pub domestic: bool,
}

/// Typed values carried by one reading. Temperatures are in tenths of °C,
/// wind speed in tenths of m/s, total rain in tenths of mm and rain rate in
/// hundredths of mm/h, exactly as the sensor reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurements {
    /// Only identity and subtype (X10, Chacon).
    Basic,
    Visonic {
        qualifier: u16,
        flags: VisonicFlags,
    },
    /// Qualifier word only (RTS, deprecated thermostat, FS20).
    Qualifier {
        qualifier: u16,
    },
    ThermoHygro {
        temp_tenths: i16,
        humidity: u16,
        low_batt: bool,
    },
    Pressure {
        temp_tenths: i16,
        humidity: u16,
        pressure_hpa: u16,
        low_batt: bool,
    },
    Wind {
        speed: u16,
        direction: u16,
        low_batt: bool,
    },
    Uv {
        light: u16,
        low_batt: bool,
    },
    Power {
        energy_wh: u32,
        power_w: u16,
        input_w: [u16; 3],
        low_batt: bool,
    },
    Rain {
        total: u32,
        rate: u16,
        low_batt: bool,
    },
    X2d {
        qualifier: u16,
        flags: X2dFlags,
    },
    Metering {
        contract: u16,
        setpoint: u16,
        counter1: u32,
        counter2: u32,
        apparent_power: u16,
        qualifier: u16,
    },
    Jamming,
}

/// Little-endian accessors over the infos block. Offsets are relative to the
/// first infos byte; out-of-range reads yield zero, callers check
/// [`InfoType::infos_len`] first.
#[derive(Debug, Clone, Copy)]
pub struct Infos<'a> {
    bytes: &'a [u8],
}

impl<'a> Infos<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn u16_at(&self, at: usize) -> u16 {
        match self.bytes.get(at..at + 2) {
            Some(&[lo, hi]) => u16::from_le_bytes([lo, hi]),
            _ => 0,
        }
    }

    pub fn i16_at(&self, at: usize) -> i16 {
        self.u16_at(at) as i16
    }

    pub fn u32_at(&self, at: usize) -> u32 {
        match self.bytes.get(at..at + 4) {
            Some(&[a, b, c, d]) => u32::from_le_bytes([a, b, c, d]),
            _ => 0,
        }
    }

    pub fn subtype(&self) -> u16 {
        self.u16_at(0)
    }

    pub fn qualifier(&self) -> u16 {
        self.u16_at(6)
    }

    /// Bit `n` of the qualifier's low byte.
    pub fn flag(&self, n: u8) -> bool {
        (self.qualifier() & 0xFF) & (1 << n) != 0
    }

    pub fn device_id(&self, scheme: IdScheme) -> u32 {
        match scheme {
            IdScheme::Direct(at) => self.u32_at(at),
            IdScheme::PhyChannel => (u32::from(self.u16_at(2)) << 16) | u32::from(self.u16_at(4)),
        }
    }
}

type DecodeFn = fn(&Infos<'_>) -> Measurements;

/// Decode functions indexed by infoType.
pub const DECODERS: [DecodeFn; 16] = [
    decode_basic,
    decode_basic,
    decode_visonic,
    decode_qualifier,
    decode_thermo_hygro,
    decode_pressure,
    decode_wind,
    decode_uv,
    decode_power,
    decode_rain,
    decode_x2d,
    decode_x2d,
    decode_qualifier,
    decode_metering,
    decode_qualifier,
    decode_jamming,
];

fn decode_basic(_: &Infos<'_>) -> Measurements {
    Measurements::Basic
}

fn decode_qualifier(i: &Infos<'_>) -> Measurements {
    Measurements::Qualifier {
        qualifier: i.qualifier(),
    }
}

fn decode_visonic(i: &Infos<'_>) -> Measurements {
    Measurements::Visonic {
        qualifier: i.qualifier(),
        flags: VisonicFlags {
            tamper: i.flag(0),
            alarm: i.flag(1),
            low_batt: i.flag(2),
            alive: i.flag(3),
        },
    }
}

fn decode_thermo_hygro(i: &Infos<'_>) -> Measurements {
    Measurements::ThermoHygro {
        temp_tenths: i.i16_at(8),
        humidity: i.u16_at(10),
        low_batt: i.flag(0),
    }
}

fn decode_pressure(i: &Infos<'_>) -> Measurements {
    Measurements::Pressure {
        temp_tenths: i.i16_at(8),
        humidity: i.u16_at(10),
        pressure_hpa: i.u16_at(12),
        low_batt: i.flag(0),
    }
}

fn decode_wind(i: &Infos<'_>) -> Measurements {
    Measurements::Wind {
        speed: i.u16_at(8),
        direction: i.u16_at(10),
        low_batt: i.flag(0),
    }
}

fn decode_uv(i: &Infos<'_>) -> Measurements {
    Measurements::Uv {
        light: i.u16_at(8),
        low_batt: i.flag(0),
    }
}

fn decode_power(i: &Infos<'_>) -> Measurements {
    Measurements::Power {
        energy_wh: i.u32_at(8),
        power_w: i.u16_at(12),
        input_w: [i.u16_at(14), i.u16_at(16), i.u16_at(18)],
        low_batt: i.flag(0),
    }
}

fn decode_rain(i: &Infos<'_>) -> Measurements {
    Measurements::Rain {
        total: i.u32_at(8),
        rate: i.u16_at(12),
        low_batt: i.flag(0),
    }
}

fn decode_x2d(i: &Infos<'_>) -> Measurements {
    Measurements::X2d {
        qualifier: i.qualifier(),
        flags: X2dFlags {
            tamper: i.flag(0),
            anomaly: i.flag(1),
            low_batt: i.flag(2),
            test_assoc: i.flag(4),
            domestic: i.flag(5),
        },
    }
}

fn decode_metering(i: &Infos<'_>) -> Measurements {
    Measurements::Metering {
        contract: i.u16_at(8),
        setpoint: i.u16_at(10),
        counter1: i.u32_at(12),
        counter2: i.u32_at(16),
        apparent_power: i.u16_at(20),
        qualifier: i.qualifier(),
    }
}

fn decode_jamming(_: &Infos<'_>) -> Measurements {
    Measurements::Jamming
}

/// One decoded sensor message, with its routing already resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorReading {
    pub info_type: InfoType,
    pub reference: String,
    pub subtype: u16,
    pub name: Option<String>,
    pub topic: String,
    pub radio: RadioInfo,
    pub measurements: Measurements,
}

/// Wire form of a reading: every value is a string, absent keys are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReadingPayload {
    pub tc: String,
    pub n: String,
    pub r: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pi1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pi2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pi3: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tra: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ra: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnt1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnt2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ftamper: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub falarm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fanomaly: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flowbatt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub falive: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ftestassoc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fdomestic: Option<String>,
    pub st: String,
}

fn num(v: impl fmt::Display) -> Option<String> {
    Some(v.to_string())
}

fn bit(b: bool) -> Option<String> {
    Some(if b { "1" } else { "0" }.to_string())
}

fn tenths(v: i16) -> Option<String> {
    Some(format!("{:.1}", f64::from(v) / 10.0))
}

impl SensorReading {
    pub fn family(&self) -> ProtocolFamily {
        self.info_type.family()
    }

    /// Second topic segment, or the whole topic when it has none.
    pub fn short_name(&self) -> &str {
        self.topic.split('/').nth(1).unwrap_or(&self.topic)
    }

    pub fn payload(&self, at: OffsetDateTime) -> ReadingPayload {
        let mut p = ReadingPayload {
            tc: at.format(&Rfc3339).unwrap_or_default(),
            n: self.short_name().to_string(),
            r: self.reference.clone(),
            st: self.subtype.to_string(),
            ..Default::default()
        };
        match &self.measurements {
            Measurements::Basic => {}
            Measurements::Jamming => p.s = num(self.subtype),
            Measurements::Qualifier { qualifier } => p.q = num(qualifier),
            Measurements::Visonic { qualifier, flags } => {
                p.q = num(qualifier);
                p.ftamper = bit(flags.tamper);
                p.falarm = bit(flags.alarm);
                p.flowbatt = bit(flags.low_batt);
                p.falive = bit(flags.alive);
            }
            Measurements::ThermoHygro {
                temp_tenths,
                humidity,
                low_batt,
            } => {
                p.t = tenths(*temp_tenths);
                p.h = num(humidity);
                p.flowbatt = bit(*low_batt);
            }
            Measurements::Pressure {
                temp_tenths,
                humidity,
                pressure_hpa,
                low_batt,
            } => {
                p.t = tenths(*temp_tenths);
                p.h = num(humidity);
                p.p = num(pressure_hpa);
                p.flowbatt = bit(*low_batt);
            }
            Measurements::Wind {
                speed,
                direction,
                low_batt,
            } => {
                p.s = num(speed);
                p.d = num(direction);
                p.flowbatt = bit(*low_batt);
            }
            Measurements::Uv { light, low_batt } => {
                p.l = num(light);
                p.flowbatt = bit(*low_batt);
            }
            Measurements::Power {
                energy_wh,
                power_w,
                input_w,
                low_batt,
            } => {
                p.e = num(energy_wh);
                p.p = num(power_w);
                p.pi1 = num(input_w[0]);
                p.pi2 = num(input_w[1]);
                p.pi3 = num(input_w[2]);
                p.flowbatt = bit(*low_batt);
            }
            Measurements::Rain {
                total,
                rate,
                low_batt,
            } => {
                p.tra = num(total);
                p.ra = num(rate);
                p.flowbatt = bit(*low_batt);
            }
            Measurements::X2d { qualifier, flags } => {
                p.q = num(qualifier);
                p.ftamper = bit(flags.tamper);
                p.fanomaly = bit(flags.anomaly);
                p.flowbatt = bit(flags.low_batt);
                p.ftestassoc = bit(flags.test_assoc);
                p.fdomestic = bit(flags.domestic);
            }
            Measurements::Metering {
                contract,
                setpoint,
                counter1,
                counter2,
                apparent_power,
                qualifier,
            } => {
                p.ct = num(contract);
                p.sp = num(setpoint);
                p.cnt1 = num(counter1);
                p.cnt2 = num(counter2);
                p.ap = num(apparent_power);
                p.q = num(qualifier);
            }
        }
        p
    }

    pub fn to_json(&self, at: OffsetDateTime) -> serde_json::Result<String> {
        serde_json::to_string(&self.payload(at))
    }
}

/// Topic for a reference: the registered one, else `<root>/<reference>/<suffix>`.
pub fn resolve_topic(
    registry: &Registry,
    topic_root: &str,
    reference: &str,
    info_type: InfoType,
) -> String {
    match registry.sensor_topic(reference) {
        Some(topic) => topic.to_string(),
        None => {
            tracing::debug!(reference, "sensor not registered, using default topic");
            format!("{topic_root}/{reference}/{}", info_type.topic_suffix())
        }
    }
}

/// Decode one complete frame.
///
/// `Ok(None)` means the infoType is outside the documented set; such frames
/// are skipped without error.
pub fn decode_frame(
    registry: &Registry,
    topic_root: &str,
    frame: &RawFrame,
) -> Result<Option<SensorReading>, DecodeError> {
    let bytes = frame.as_bytes();
    let (Some(radio), Some(&raw_type)) = (RadioInfo::parse(bytes), bytes.get(INFO_TYPE_OFFSET))
    else {
        return Err(DecodeError::NoRadioHeader { len: bytes.len() });
    };
    let Some(info_type) = InfoType::from_u8(raw_type) else {
        tracing::debug!(info_type = raw_type, "unknown infoType, frame skipped");
        return Ok(None);
    };
    let infos = Infos::new(bytes.get(INFOS_OFFSET..).unwrap_or_default());
    if infos.len() < info_type.infos_len() {
        return Err(DecodeError::Truncated {
            info_type: raw_type,
            needed: info_type.infos_len(),
            available: infos.len(),
        });
    }

    let id = infos.device_id(info_type.id_scheme());
    let reference = format!("{}-{}", info_type.code(), id);
    let measurements = DECODERS[usize::from(info_type.code())](&infos);
    let topic = resolve_topic(registry, topic_root, &reference, info_type);
    tracing::debug!(
        family = %info_type.family(),
        %reference,
        rf_level = radio.rf_level_db,
        floor_noise = radio.floor_noise_db,
        rf_quality = radio.rf_quality,
        %topic,
        "decoded frame"
    );

    Ok(Some(SensorReading {
        info_type,
        name: registry.sensor_name(&reference).map(str::to_string),
        reference,
        subtype: infos.subtype(),
        topic,
        radio,
        measurements,
    }))
}
