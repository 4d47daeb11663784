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
//! Reply payload decoders, one per response kind

use serde::{Deserialize, Serialize};

use crate::codec::{decode_array, decode_length_prefixed, decode_u8, expect_empty};
use crate::errors::DecodeError;
use crate::params::{FELT_LEN, PK_LEN, SIG_LEN};
use crate::transaction::FieldElement;

/// How signature replies treat the bytes after the two scalars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeMode {
    /// Length byte must match, recovery id required, nothing may follow
    #[default]
    Strict,
    /// Length byte ignored, recovery id optional, trailing bytes ignored
    Lenient,
}

/// App version triple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    /// Version Major
    pub major: u8,
    /// Version Minor
    pub minor: u8,
    /// Version Patch
    pub patch: u8,
}

/// Running app name and version, as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    /// App name
    pub app_name: String,
    /// App version string
    pub app_version: String,
}

/// Uncompressed Stark public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    /// Format byte (0x04 for uncompressed)
    pub format: u8,
    /// x coordinate
    pub x: [u8; FELT_LEN],
    /// y coordinate
    pub y: [u8; FELT_LEN],
}

/// Signature over a hash (r, s, v)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// r value
    pub r: [u8; FELT_LEN],
    /// s value
    pub s: [u8; FELT_LEN],
    /// v value, always present in strict mode
    pub v: Option<u8>,
}

/// Signature over a transaction along with the hash the device computed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxSignature {
    /// Transaction hash
    pub hash: [u8; FELT_LEN],
    /// Signature over `hash`
    pub signature: Signature,
}

fn ascii(bytes: &[u8]) -> Result<String, DecodeError> {
    if !bytes.is_ascii() {
        return Err(DecodeError::InvalidAscii);
    }
    // ASCII is valid UTF-8
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// `major || minor || patch`, exactly 3 bytes
pub fn decode_version(buf: &[u8]) -> Result<Version, DecodeError> {
    if buf.len() != 3 {
        return Err(DecodeError::InvalidLength {
            expected: 3,
            actual: buf.len(),
        });
    }
    Ok(Version {
        major: buf[0],
        minor: buf[1],
        patch: buf[2],
    })
}

/// `format (1) || name (lp) || version (lp) || flags (lp)`, fully consumed
pub fn decode_app_and_version(buf: &[u8]) -> Result<AppInfo, DecodeError> {
    let (_format, rest) = decode_u8(buf)?;
    let (_, name, rest) = decode_length_prefixed(rest)?;
    let (_, version, rest) = decode_length_prefixed(rest)?;
    let (_, _flags, rest) = decode_length_prefixed(rest)?;
    expect_empty(rest)?;

    Ok(AppInfo {
        app_name: ascii(name)?,
        app_version: ascii(version)?,
    })
}

/// `format (1) || x (32) || y (32)`, exactly 65 bytes
pub fn decode_public_key(buf: &[u8]) -> Result<PublicKey, DecodeError> {
    if buf.len() != PK_LEN {
        return Err(DecodeError::InvalidLength {
            expected: PK_LEN,
            actual: buf.len(),
        });
    }
    let (format, rest) = decode_u8(buf)?;
    let (x, rest) = decode_array::<FELT_LEN>(rest)?;
    let (y, rest) = decode_array::<FELT_LEN>(rest)?;
    expect_empty(rest)?;

    Ok(PublicKey { format, x, y })
}

/// `len (1) || r (32) || s (32) || v (1)`
pub fn decode_signature(buf: &[u8], mode: DecodeMode) -> Result<Signature, DecodeError> {
    let (announced, rest) = decode_u8(buf)?;

    if mode == DecodeMode::Strict && (announced as usize != SIG_LEN || rest.len() != SIG_LEN) {
        return Err(DecodeError::LengthMismatch {
            announced: announced as usize,
            actual: rest.len(),
        });
    }

    let (r, rest) = decode_array::<FELT_LEN>(rest)?;
    let (s, rest) = decode_array::<FELT_LEN>(rest)?;

    let v = match mode {
        DecodeMode::Strict => {
            let (v, rest) = decode_u8(rest)?;
            expect_empty(rest)?;
            Some(v)
        }
        DecodeMode::Lenient => rest.first().copied(),
    };

    Ok(Signature { r, s, v })
}

/// `hash (32) || len (1) || r (32) || s (32) || v (1)`
pub fn decode_tx_signature(buf: &[u8], mode: DecodeMode) -> Result<TxSignature, DecodeError> {
    let (hash, rest) = decode_array::<FELT_LEN>(buf)?;
    let signature = decode_signature(rest, mode)?;
    Ok(TxSignature { hash, signature })
}

/// Leading 32 byte field element, anything after it is ignored
pub fn decode_field_hash(buf: &[u8]) -> Result<FieldElement, DecodeError> {
    let (hash, _) = decode_array::<FELT_LEN>(buf)?;
    FieldElement::from_bytes_be(&hash)
        .ok_or_else(|| DecodeError::InvalidFieldElement(hex::encode(hash)))
}
