//! BLE advertising payload decoding.
//!
//! An advertising payload is a run of AD structures, each laid out as
//! `[length][type][data; length - 1]`. Controllers pad the payload with zero
//! bytes, so a zero length or a zero AD type ends the significant part.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use thiserror::Error;
use uuid::Uuid;

/// AD type codes from the Bluetooth Assigned Numbers.
pub mod ad_type {
    /// Incomplete list of 16-bit service UUIDs.
    pub const INCOMPLETE_UUID16: u8 = 0x02;
    /// Complete list of 16-bit service UUIDs.
    pub const COMPLETE_UUID16: u8 = 0x03;
    /// Incomplete list of 32-bit service UUIDs.
    pub const INCOMPLETE_UUID32: u8 = 0x04;
    /// Complete list of 32-bit service UUIDs.
    pub const COMPLETE_UUID32: u8 = 0x05;
    /// Incomplete list of 128-bit service UUIDs.
    pub const INCOMPLETE_UUID128: u8 = 0x06;
    /// Complete list of 128-bit service UUIDs.
    pub const COMPLETE_UUID128: u8 = 0x07;
    /// Shortened local name.
    pub const SHORTENED_LOCAL_NAME: u8 = 0x08;
    /// Complete local name.
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    /// TX power level.
    pub const TX_POWER_LEVEL: u8 = 0x0A;
    /// Service data with a 16-bit UUID.
    pub const SERVICE_DATA_UUID16: u8 = 0x16;
    /// Service data with a 32-bit UUID.
    pub const SERVICE_DATA_UUID32: u8 = 0x20;
    /// Service data with a 128-bit UUID.
    pub const SERVICE_DATA_UUID128: u8 = 0x21;
}

/// Bluetooth base UUID `00000000-0000-1000-8000-00805F9B34FB`.
const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Errors from advertising payload decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdvertisingError {
    /// An AD structure runs past the end of the payload.
    #[error("Malformed advertisement at byte {offset}: {reason}")]
    MalformedAdvertisement {
        /// Offset of the offending structure's length byte.
        offset: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// The hex text of a payload could not be decoded.
    #[error("Invalid advertisement hex: {0}")]
    InvalidHex(String),
}

/// One AD structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdStructure {
    /// AD type code.
    pub ad_type: u8,
    /// Payload after the type byte.
    pub data: Vec<u8>,
}

/// A decoded advertising payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisingData {
    structures: Vec<AdStructure>,
}

impl AdvertisingData {
    /// Decode raw payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AdvertisingError::MalformedAdvertisement`] if a structure's
    /// declared length exceeds the remaining bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, AdvertisingError> {
        let mut structures = Vec::new();
        let mut index = 0;

        while index < bytes.len() {
            let length = usize::from(bytes[index]);
            if length == 0 {
                break;
            }

            let end = index + 1 + length;
            if end > bytes.len() {
                return Err(AdvertisingError::MalformedAdvertisement {
                    offset: index,
                    reason: format!(
                        "structure declares {length} bytes but only {} remain",
                        bytes.len() - index - 1
                    ),
                });
            }

            let ad_type = bytes[index + 1];
            if ad_type == 0 {
                break;
            }

            structures.push(AdStructure {
                ad_type,
                data: bytes[index + 2..end].to_vec(),
            });
            index = end;
        }

        Ok(Self { structures })
    }

    /// Decode a payload given as hex text. Whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AdvertisingError::InvalidHex`] for non-hex text or an odd
    /// digit count, and otherwise as [`AdvertisingData::parse`].
    pub fn from_hex(text: &str) -> Result<Self, AdvertisingError> {
        Self::parse(&decode_hex(text)?)
    }

    /// All decoded structures in payload order.
    #[must_use]
    pub fn structures(&self) -> &[AdStructure] {
        &self.structures
    }

    /// Returns `true` if no structures were decoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    fn of_type(&self, ad_type: u8) -> impl Iterator<Item = &[u8]> {
        self.structures
            .iter()
            .filter(move |s| s.ad_type == ad_type)
            .map(|s| s.data.as_slice())
    }

    /// Advertised local name; the complete name wins over the shortened one.
    #[must_use]
    pub fn local_name(&self) -> Option<String> {
        [ad_type::COMPLETE_LOCAL_NAME, ad_type::SHORTENED_LOCAL_NAME]
            .into_iter()
            .find_map(|t| self.of_type(t).next())
            .and_then(|data| String::from_utf8(data.to_vec()).ok())
            .map(|name| name.trim_end_matches('\0').to_owned())
            .filter(|name| !name.trim().is_empty())
    }

    /// Advertised service UUIDs, expanded to 128 bits, in payload order.
    #[must_use]
    pub fn service_uuids(&self) -> Vec<Uuid> {
        let mut uuids = Vec::new();
        for s in &self.structures {
            match s.ad_type {
                ad_type::INCOMPLETE_UUID16 | ad_type::COMPLETE_UUID16 => {
                    uuids.extend(s.data.chunks_exact(2).map(uuid_from_le));
                }
                ad_type::INCOMPLETE_UUID32 | ad_type::COMPLETE_UUID32 => {
                    uuids.extend(s.data.chunks_exact(4).map(uuid_from_le));
                }
                ad_type::INCOMPLETE_UUID128 | ad_type::COMPLETE_UUID128 => {
                    uuids.extend(s.data.chunks_exact(16).map(uuid_from_le));
                }
                _ => {}
            }
        }
        uuids
    }

    /// Service data entries as `(service UUID, data)` pairs.
    #[must_use]
    pub fn service_data(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.structures
            .iter()
            .filter_map(|s| {
                let width = match s.ad_type {
                    ad_type::SERVICE_DATA_UUID16 => 2,
                    ad_type::SERVICE_DATA_UUID32 => 4,
                    ad_type::SERVICE_DATA_UUID128 => 16,
                    _ => return None,
                };
                (s.data.len() >= width)
                    .then(|| (uuid_from_le(&s.data[..width]), s.data[width..].to_vec()))
            })
            .collect()
    }

    /// Advertised TX power level in dBm.
    #[must_use]
    pub fn tx_power(&self) -> Option<i8> {
        self.of_type(ad_type::TX_POWER_LEVEL)
            .find_map(|data| data.first())
            .map(|&b| i8::from_le_bytes([b]))
    }

    /// Upper-case hex of each structure's data keyed by AD type, bytes reversed.
    ///
    /// Later structures of the same type replace earlier ones.
    #[must_use]
    pub fn hex_by_type(&self) -> BTreeMap<u8, String> {
        self.structures
            .iter()
            .filter(|s| !s.data.is_empty())
            .map(|s| {
                let hex = s.data.iter().rev().fold(String::new(), |mut out, b| {
                    let _ = write!(out, "{b:02X}");
                    out
                });
                (s.ad_type, hex)
            })
            .collect()
    }
}

/// Expand a little-endian 16, 32 or 128-bit UUID.
fn uuid_from_le(bytes: &[u8]) -> Uuid {
    let mut value: u128 = 0;
    for &b in bytes.iter().rev() {
        value = (value << 8) | u128::from(b);
    }
    if bytes.len() == 16 {
        Uuid::from_u128(value)
    } else {
        Uuid::from_u128(BASE_UUID | (value << 96))
    }
}

fn decode_hex(text: &str) -> Result<Vec<u8>, AdvertisingError> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(AdvertisingError::InvalidHex(format!(
            "odd number of hex digits ({})",
            digits.len()
        )));
    }

    digits
        .chunks_exact(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| {
                    AdvertisingError::InvalidHex(format!(
                        "'{}' is not a hex byte",
                        String::from_utf8_lossy(pair)
                    ))
                })
        })
        .collect()
}
