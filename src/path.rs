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
//! BIP32 derivation paths: parsing from text and big-endian serialization
//!
//! ```
//! use ledger_starknet::BIP32Path;
//!
//! let path: BIP32Path = "m/44'/0'/0'".parse().unwrap();
//! assert_eq!(path.serialize(), vec![0x80, 0, 0, 0x2c, 0x80, 0, 0, 0, 0x80, 0, 0, 0]);
//! ```

use std::{fmt, str::FromStr};

use crate::codec::encode_u32_be;
use crate::errors::PathError;
use crate::params::BIP32_HARDENED;

/// BIP32 Path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BIP32Path {
    segments: Vec<u32>,
}

impl BIP32Path {
    /// Build a path from raw segment values (hardened bit included)
    pub fn from_segments(segments: Vec<u32>) -> Self {
        BIP32Path { segments }
    }

    /// Segment values, hardened bit included
    pub fn segments(&self) -> &[u32] {
        &self.segments
    }

    /// Number of segments
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Concatenated 4-byte big-endian segments
    pub fn serialize(&self) -> Vec<u8> {
        self.segments.iter().flat_map(|s| encode_u32_be(*s)).collect()
    }

    /// Segment count byte followed by the serialized segments
    pub fn serialize_with_count(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 4 * self.segments.len());
        out.push(self.segments.len() as u8);
        out.extend(self.serialize());
        out
    }
}

fn parse_segment(segment: &str) -> Result<u32, PathError> {
    let (digits, hardened) = match segment.strip_suffix('\'') {
        Some(d) => (d, true),
        None => (segment, false),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PathError::InvalidSegment(segment.to_owned()));
    }

    let value: u32 = digits
        .parse()
        .map_err(|_| PathError::OutOfRange(segment.to_owned()))?;

    if value & BIP32_HARDENED != 0 {
        return Err(PathError::OutOfRange(segment.to_owned()));
    }

    Ok(if hardened {
        value | BIP32_HARDENED
    } else {
        value
    })
}

impl FromStr for BIP32Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }

        let mut parts = s.split('/').peekable();
        if parts.peek() == Some(&"m") {
            parts.next();
        }

        let segments = parts.map(parse_segment).collect::<Result<Vec<_>, _>>()?;
        Ok(BIP32Path { segments })
    }
}

impl fmt::Display for BIP32Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for s in &self.segments {
            if s & BIP32_HARDENED != 0 {
                write!(f, "/{}'", s & !BIP32_HARDENED)?;
            } else {
                write!(f, "/{}", s)?;
            }
        }
        Ok(())
    }
}
