//
// Copyright 2017-2025 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Newline-delimited text codec
//!
//! Inbound bytes are buffered until a `\n` arrives, so a single socket read
//! may yield any number of lines and a line may span several reads. A
//! trailing `\r` is dropped and invalid UTF-8 is replaced rather than
//! rejected. Outbound text is written verbatim followed by `\n`.

use crate::ChatError;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// Line codec for the chat wire protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineCodec {
    /// Maximum line length in bytes, excluding the terminator
    max_length: usize,
    /// Offset into the buffer already scanned for a newline
    next_index: usize,
    /// Skipping the remainder of an overlong line
    discarding: bool,
}

impl LineCodec {
    /// Create a codec that accepts lines up to `max_length` bytes
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    /// Get the maximum line length
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Check if the codec is currently skipping an overlong line
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    fn discard_warning(&self) {
        warn!(
            max_length = self.max_length,
            "Discarding overlong inbound line"
        );
        metrics::counter!("chatrelay.lines.discarded").increment(1);
    }

    fn strip_cr(bytes: &[u8]) -> &[u8] {
        bytes.strip_suffix(b"\r").unwrap_or(bytes)
    }

    fn finish_line(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(8192)
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ChatError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, ChatError> {
        loop {
            // Scan at most two bytes past the limit (room for `\r\n`) so an
            // overlong line is detected without waiting for its terminator.
            let read_to = src.len().min(self.max_length.saturating_add(2));
            let newline = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| offset + self.next_index);

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    src.advance(offset + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(read_to);
                    self.next_index = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let line = src.split_to(offset + 1);
                    self.next_index = 0;
                    // The limit applies to the text, not its `\r\n` terminator.
                    let content = Self::strip_cr(&line[..offset]);
                    if content.len() > self.max_length {
                        self.discard_warning();
                        continue;
                    }
                    return Ok(Some(Self::finish_line(content)));
                }
                (false, None) if src.len() > self.max_length.saturating_add(1) => {
                    self.discard_warning();
                    self.discarding = true;
                    self.next_index = 0;
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, ChatError> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        self.next_index = 0;
        if src.is_empty() || self.discarding {
            src.clear();
            self.discarding = false;
            return Ok(None);
        }

        // Peer closed mid-line; deliver what arrived.
        let line = src.split_to(src.len());
        let content = Self::strip_cr(&line);
        if content.len() > self.max_length {
            self.discard_warning();
            return Ok(None);
        }
        Ok(Some(Self::finish_line(content)))
    }
}

impl Encoder<&str> for LineCodec {
    type Error = ChatError;

    fn encode(&mut self, text: &str, dst: &mut BytesMut) -> Result<(), ChatError> {
        dst.reserve(text.len() + 1);
        dst.put_slice(text.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

impl Encoder<String> for LineCodec {
    type Error = ChatError;

    fn encode(&mut self, text: String, dst: &mut BytesMut) -> Result<(), ChatError> {
        Encoder::<&str>::encode(self, text.as_str(), dst)
    }
}
