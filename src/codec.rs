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
//! Primitive field encoding: big-endian integers and length-prefixed blocks.
//!
//! Decoders consume a buffer left to right and hand back the remainder, so
//! reply layouts read as a chain of pops.

use byteorder::{BigEndian, ByteOrder};

use crate::errors::{BuildError, DecodeError};

/// Encode a u32 as 4 big-endian bytes
pub fn encode_u32_be(value: u32) -> [u8; 4] {
    let mut out = [0u8; 4];
    BigEndian::write_u32(&mut out, value);
    out
}

/// Prefix `data` with its length as a single byte
pub fn encode_length_prefixed(data: &[u8]) -> Result<Vec<u8>, BuildError> {
    let len = u8::try_from(data.len()).map_err(|_| BuildError::FieldTooLong {
        field: "length-prefixed block",
        len: data.len(),
        max: u8::MAX as usize,
    })?;

    let mut out = Vec::with_capacity(data.len() + 1);
    out.push(len);
    out.extend_from_slice(data);
    Ok(out)
}

/// Pop `n` bytes from the front of `buffer`, returning `(value, remainder)`
pub fn decode_fixed(buffer: &[u8], n: usize) -> Result<(&[u8], &[u8]), DecodeError> {
    if buffer.len() < n {
        return Err(DecodeError::TruncatedBuffer {
            needed: n,
            remaining: buffer.len(),
        });
    }
    Ok(buffer.split_at(n))
}

/// Pop a fixed-size array from the front of `buffer`
pub fn decode_array<const N: usize>(buffer: &[u8]) -> Result<([u8; N], &[u8]), DecodeError> {
    let (value, rest) = decode_fixed(buffer, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(value);
    Ok((out, rest))
}

/// Pop a single byte from the front of `buffer`
pub fn decode_u8(buffer: &[u8]) -> Result<(u8, &[u8]), DecodeError> {
    let (value, rest) = decode_fixed(buffer, 1)?;
    Ok((value[0], rest))
}

/// Pop a length byte then that many bytes, returning `(length, value, remainder)`
pub fn decode_length_prefixed(buffer: &[u8]) -> Result<(usize, &[u8], &[u8]), DecodeError> {
    let (len, rest) = decode_u8(buffer)?;
    let len = len as usize;
    let (value, rest) = decode_fixed(rest, len)?;
    Ok((len, value, rest))
}

/// Fail unless the buffer has been fully consumed
pub fn expect_empty(remainder: &[u8]) -> Result<(), DecodeError> {
    if remainder.is_empty() {
        Ok(())
    } else {
        Err(DecodeError::TrailingBytes(remainder.len()))
    }
}
