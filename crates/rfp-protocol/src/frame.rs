use std::fmt::Write as _;

/// Synchronization marker opening every binary frame.
pub const SYNC: [u8; 2] = *b"ZI";
/// Sync (2) + sourceDest (1) + payload length (2).
pub const HEADER_LEN: usize = 5;
/// sourceDest qualifier for frames addressed to the 433/868 MHz radios.
pub const SOURCE_DEST_RF: u8 = 0x01;

/// One complete length-delimited frame: header plus exactly the declared
/// number of payload bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    bytes: Vec<u8>,
}

impl RawFrame {
    /// Accept `bytes` only if it starts with the marker and its length
    /// matches the declared payload length.
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        if bytes.len() < HEADER_LEN || bytes[..2] != SYNC {
            return None;
        }
        if bytes.len() != HEADER_LEN + declared_payload_len(&bytes)? {
            return None;
        }
        Some(Self { bytes })
    }

    /// Build a frame around `payload`.
    pub fn wrap(source_dest: u8, payload: &[u8]) -> Option<Self> {
        let len = u16::try_from(payload.len()).ok()?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&SYNC);
        bytes.push(source_dest);
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(payload);
        Some(Self { bytes })
    }

    pub(crate) fn from_parts_unchecked(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn source_dest(&self) -> u8 {
        self.bytes[2]
    }

    pub fn payload_len(&self) -> usize {
        self.bytes.len() - HEADER_LEN
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }
}

/// Little-endian payload length from a buffer holding at least a header.
pub fn declared_payload_len(header: &[u8]) -> Option<usize> {
    match header.get(3..HEADER_LEN) {
        Some(&[lsb, msb]) => Some(usize::from(u16::from_le_bytes([lsb, msb]))),
        _ => None,
    }
}

/// Classic 16-bytes-per-row hex dump with an ASCII gutter, used when tracing
/// frames at debug level.
pub fn hexdump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:4}", row * 16);
        for i in 0..16 {
            if i % 8 == 0 {
                out.push(' ');
            }
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(out, " {b:02X}");
                }
                None => out.push_str("   "),
            }
        }
        out.push_str("  ");
        for &b in chunk {
            out.push(if (32..=126).contains(&b) { b as char } else { '.' });
        }
        out.push('\n');
    }
    out
}

/// Compact space-separated hex ("5A 49 01 ...").
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse hex bytes separated by spaces, commas or nothing ("5A49", "5a 49", "0x5A,0x49").
pub fn parse_hex(s: &str) -> Option<Vec<u8>> {
    let digits: String = s
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(|t| t.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}
