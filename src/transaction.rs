/*******************************************************************************
*   (c) 2020 ZondaX GmbH
*
*  Licensed under the Apache License, Version 2.0 (the "License");
*  you may not use this file except in compliance with the License.
*  You may obtain a copy of the License at
*
*      http://www.apache.org/licenses/LICENSE-2.0
*
*  Unless required by applicable law or agreed to in writing, software
*  distributed under the License is distributed on an "AS IS" BASIS,
*  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
*  See the License for the specific language governing permissions and
*  limitations under the License.
********************************************************************************/
//! Transaction envelope sent with the sign-tx instruction.
//!
//! The envelope is a list of segments, one per frame:
//! - `[path count][path]`
//! - `to (32) || selector length (1) || selector || calldata count (1)`
//! - one `name length (1) || name || value (32)` per calldata entry

use std::{fmt, str::FromStr};

use starknet_types_core::felt::Felt;

use crate::codec::encode_length_prefixed;
use crate::errors::BuildError;
use crate::params::{FELT_LEN, MAX_PAYLOAD_LEN};
use crate::path::BIP32Path;

/// Starknet field element, always below the field prime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldElement(Felt);

impl FieldElement {
    /// Zero
    pub const ZERO: FieldElement = FieldElement(Felt::ZERO);

    /// Big-endian bytes, `None` unless the value is below the field prime
    pub fn from_bytes_be(bytes: &[u8; FELT_LEN]) -> Option<Self> {
        let felt = Felt::from_bytes_be(bytes);
        // from_bytes_be reduces modulo the prime
        (felt.to_bytes_be() == *bytes).then_some(FieldElement(felt))
    }

    /// Big-endian bytes
    pub fn to_bytes_be(&self) -> [u8; FELT_LEN] {
        self.0.to_bytes_be()
    }

    /// Underlying felt
    pub fn felt(&self) -> Felt {
        self.0
    }

    /// Cairo short string: up to 31 ASCII characters packed big-endian
    pub fn from_short_string(s: &str) -> Result<Self, BuildError> {
        if !s.is_ascii() || s.len() >= FELT_LEN {
            return Err(BuildError::InvalidFieldElement(s.to_owned()));
        }
        let mut bytes = [0u8; FELT_LEN];
        bytes[FELT_LEN - s.len()..].copy_from_slice(s.as_bytes());
        Ok(FieldElement(Felt::from_bytes_be(&bytes)))
    }

    fn from_hex(digits: &str) -> Option<Self> {
        if digits.is_empty() || digits.len() > 2 * FELT_LEN {
            return None;
        }
        let padded = format!("{:0>width$}", digits, width = 2 * FELT_LEN);
        let mut bytes = [0u8; FELT_LEN];
        hex::decode_to_slice(padded, &mut bytes).ok()?;
        Self::from_bytes_be(&bytes)
    }

    fn from_decimal(digits: &str) -> Option<Self> {
        // from_dec_str takes a sign and reduces modulo the prime
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let felt = Felt::from_dec_str(digits).ok()?;

        let canonical = match digits.trim_start_matches('0') {
            "" => "0",
            trimmed => trimmed,
        };
        (felt.to_biguint().to_str_radix(10) == canonical).then_some(FieldElement(felt))
    }
}

impl Default for FieldElement {
    fn default() -> Self {
        FieldElement::ZERO
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        FieldElement(Felt::from(value))
    }
}

impl From<FieldElement> for Felt {
    fn from(value: FieldElement) -> Self {
        value.0
    }
}

impl From<Felt> for FieldElement {
    fn from(value: Felt) -> Self {
        FieldElement(value)
    }
}

impl FromStr for FieldElement {
    type Err = BuildError;

    /// `0x`-prefixed hex or decimal text
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => Self::from_hex(hex),
            None => Self::from_decimal(s),
        };
        parsed.ok_or_else(|| BuildError::InvalidFieldElement(s.to_owned()))
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_bytes_be()))
    }
}

/// Named calldata value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDataEntry {
    /// ASCII label shown on the device
    pub name: String,
    /// Value
    pub value: FieldElement,
}

impl CallDataEntry {
    /// Build an entry from a name and a hex or decimal value
    pub fn new(name: &str, value: &str) -> Result<Self, BuildError> {
        Ok(CallDataEntry {
            name: name.to_owned(),
            value: value.parse()?,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>, BuildError> {
        if !self.name.is_ascii() {
            return Err(BuildError::NonAsciiName(self.name.clone()));
        }
        let max = MAX_PAYLOAD_LEN - 1 - FELT_LEN;
        if self.name.len() > max {
            return Err(BuildError::FieldTooLong {
                field: "calldata name",
                len: self.name.len(),
                max,
            });
        }

        let mut out = encode_length_prefixed(self.name.as_bytes())?;
        out.extend_from_slice(&self.value.to_bytes_be());
        Ok(out)
    }
}

/// Contract call to sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Destination contract address
    pub to: FieldElement,
    /// Entry point name
    pub selector: String,
    /// Named arguments
    pub calldata: Vec<CallDataEntry>,
}

impl Transaction {
    /// Envelope segments in transmission order
    pub fn segments(&self, path: &BIP32Path) -> Result<Vec<Vec<u8>>, BuildError> {
        let path_segment = path.serialize_with_count();
        if path_segment.len() > MAX_PAYLOAD_LEN {
            return Err(BuildError::FieldTooLong {
                field: "derivation path",
                len: path_segment.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        let max_selector = MAX_PAYLOAD_LEN - FELT_LEN - 2;
        if self.selector.len() > max_selector {
            return Err(BuildError::FieldTooLong {
                field: "selector",
                len: self.selector.len(),
                max: max_selector,
            });
        }

        let entries = u8::try_from(self.calldata.len()).map_err(|_| BuildError::FieldTooLong {
            field: "calldata",
            len: self.calldata.len(),
            max: u8::MAX as usize,
        })?;

        let mut call = Vec::with_capacity(FELT_LEN + 2 + self.selector.len());
        call.extend_from_slice(&self.to.to_bytes_be());
        call.extend(encode_length_prefixed(self.selector.as_bytes())?);
        call.push(entries);

        let mut segments = Vec::with_capacity(2 + self.calldata.len());
        segments.push(path_segment);
        segments.push(call);
        for entry in &self.calldata {
            segments.push(entry.serialize()?);
        }
        Ok(segments)
    }
}
