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
//! Splitting of payloads into ordered, final-tagged chunks

use crate::errors::BuildError;
use crate::frame::Frame;
use crate::params::{P2_LAST, P2_MORE};

/// Most frames a sequence can hold: p1 is a single byte
pub const MAX_SEQUENCE_LEN: usize = u8::MAX as usize + 1;

/// One piece of a larger payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Set on the last chunk only
    pub is_final: bool,
    /// Piece of the original buffer
    pub payload: &'a [u8],
}

/// Split `data` in pieces of at most `chunk_len` bytes.
///
/// Exactly one chunk, the last one, is final. An empty buffer gives a single
/// empty final chunk. A `chunk_len` of zero is treated as one.
pub fn chunkify(data: &[u8], chunk_len: usize) -> Vec<Chunk<'_>> {
    let chunk_len = chunk_len.max(1);

    if data.len() <= chunk_len {
        return vec![Chunk {
            is_final: true,
            payload: data,
        }];
    }

    let count = (data.len() + chunk_len - 1) / chunk_len;
    data.chunks(chunk_len)
        .enumerate()
        .map(|(idx, payload)| Chunk {
            is_final: idx + 1 == count,
            payload,
        })
        .collect()
}

/// Turn payload segments into sequence-numbered frames, one per segment.
///
/// Segments are never split: the device parses each frame as one field of
/// the envelope. Frame `i` carries `p1 = i`; every frame but the last one
/// carries the more-data flag in p2.
pub fn sequence_frames(cla: u8, ins: u8, segments: &[Vec<u8>]) -> Result<Vec<Frame>, BuildError> {
    if segments.len() > MAX_SEQUENCE_LEN {
        return Err(BuildError::TooManyFrames(segments.len()));
    }

    let last = segments.len().saturating_sub(1);
    segments
        .iter()
        .enumerate()
        .map(|(idx, segment)| {
            let p2 = if idx == last { P2_LAST } else { P2_MORE };
            Frame::new(cla, ins, idx as u8, p2, segment.clone())
        })
        .collect()
}
