//! Frame codec
//!
//! Every message is a MessagePack body behind a 4-byte big-endian length.
//! The [`Parser`] buffers partial reads and yields complete messages.

use crate::error::{ProtocolError, ProtocolResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Default maximum message size (1MB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

const LENGTH_PREFIX: usize = 4;

/// Encode a message into one length-prefixed frame
pub fn encode<T: Serialize>(message: &T, max_message_size: usize) -> ProtocolResult<Bytes> {
    let body = rmp_serde::to_vec_named(message)?;
    if body.len() > max_message_size {
        return Err(ProtocolError::MessageTooLarge {
            size: body.len(),
            max: max_message_size,
        });
    }

    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX + body.len());
    frame.put_u32(body.len() as u32);
    frame.extend_from_slice(&body);
    Ok(frame.freeze())
}

/// Incremental frame parser
pub struct Parser {
    buffer: BytesMut,
    max_message_size: usize,
}

impl Parser {
    pub fn new() -> Self {
        Self::with_max_message_size(MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_message_size,
        }
    }

    /// Add data to the parser buffer
    pub fn feed(&mut self, data: &[u8]) -> ProtocolResult<()> {
        let limit = self.max_message_size + LENGTH_PREFIX;
        if self.buffer.len() + data.len() > limit {
            return Err(ProtocolError::MessageTooLarge {
                size: self.buffer.len() + data.len(),
                max: limit,
            });
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Try to parse a complete message from the buffer
    pub fn parse<T: DeserializeOwned>(&mut self) -> ProtocolResult<Option<T>> {
        if self.buffer.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let len = u32::from_be_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]) as usize;
        if len > self.max_message_size {
            // The stream is unusable past this point
            self.buffer.clear();
            return Err(ProtocolError::MessageTooLarge {
                size: len,
                max: self.max_message_size,
            });
        }
        if self.buffer.len() < LENGTH_PREFIX + len {
            return Ok(None); // Incomplete
        }

        self.buffer.advance(LENGTH_PREFIX);
        let body = self.buffer.split_to(len);
        let message = rmp_serde::from_slice(&body)?;
        Ok(Some(message))
    }

    /// Feed a chunk and collect every message it completes
    pub fn feed_and_parse<T: DeserializeOwned>(&mut self, data: &[u8]) -> ProtocolResult<Vec<T>> {
        self.feed(data)?;
        let mut messages = Vec::new();
        while let Some(message) = self.parse()? {
            messages.push(message);
        }
        Ok(messages)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}
