//! Byte messages passed between components, listeners and the transport.
//!
//! A [`MessageBuilder`] owns a zero-filled buffer of a fixed capacity. Producers
//! write into it, record how many bytes are meaningful with
//! [`MessageBuilder::set_size`], then [`seal`](MessageBuilder::seal) it into an
//! immutable [`Message`]. Sealed messages are cheap to clone: every clone shares
//! the same backing storage, and the storage is released when the last clone is
//! dropped.

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Writable buffer used to assemble a [`Message`].
#[derive(Debug)]
pub struct MessageBuilder {
    buf: BytesMut,
    size: usize,
}

impl MessageBuilder {
    /// Allocate a zero-filled buffer holding at most `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            buf: BytesMut::zeroed(max_size),
            size: 0,
        }
    }

    /// The whole writable region, `max_size` bytes long.
    pub fn data(&mut self) -> &mut [u8] {
        &mut self.buf[..]
    }

    /// Record how many leading bytes of the buffer are meaningful.
    ///
    /// Values past the capacity are clamped to `max_size`.
    pub fn set_size(&mut self, size: usize) {
        self.size = size.min(self.buf.len());
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_size(&self) -> usize {
        self.buf.len()
    }

    /// Freeze the buffer. The builder cannot be written after this point.
    pub fn seal(mut self) -> Message {
        let max_size = self.buf.len();
        self.buf.truncate(self.size);
        Message {
            data: self.buf.freeze(),
            max_size,
        }
    }
}

/// Immutable, shareable message payload.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Message {
    data: Bytes,
    max_size: usize,
}

impl Message {
    /// Start a writable message with room for `max_size` bytes.
    pub fn builder(max_size: usize) -> MessageBuilder {
        MessageBuilder::new(max_size)
    }

    /// Copy `src` into a new message whose size and capacity are both `src.len()`.
    pub fn from_bytes(src: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(src),
            max_size: src.len(),
        }
    }

    /// Serialize `value` as JSON into a new message.
    pub fn from_json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(Self::from)
    }

    /// Decode the meaningful bytes as JSON.
    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.data)
    }

    /// Read-only view of the meaningful bytes.
    pub fn cdata(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Lossy UTF-8 view, used for logging and script handlers.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        let max_size = value.len();
        Self {
            data: Bytes::from(value),
            max_size,
        }
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Self::from(value.into_bytes())
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Self::from_bytes(value.as_bytes())
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("size", &self.size())
            .field("max_size", &self.max_size)
            .finish()
    }
}
