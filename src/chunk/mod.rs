//! Chunking of encoded frames into transport-sized messages
//!
//! A frame larger than the transport's message limit is sent as a run of data chunks
//! followed by exactly one completion chunk. The receiver appends data chunks in arrival
//! order and hands the buffer off when the completion chunk arrives (see
//! [`ChunkAssembler`]).
//!
//! ## Framing
//!
//! [`Framing::Tagged`] (default) prefixes every message with a one-byte tag:
//!
//! ```text
//! data      0x00 | payload...
//! complete  0x01 | u32 LE declared frame length
//! ```
//!
//! The declared length lets the receiver verify that nothing was lost before it honours
//! the completion.
//!
//! [`Framing::Sentinel`] is the legacy format: data messages carry raw payload, and the
//! single-byte message `[1]` marks completion. A data chunk equal to `[1]` would be read
//! as a marker, so the splitter never emits one (see [`ChunkSplitter::split`]).

mod assembler;

pub use assembler::{ChunkAssembler, ChunkEvent};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Result, StreamError};

/// Tag byte of a tagged data message
pub const TAG_DATA: u8 = 0x00;
/// Tag byte of a tagged completion message
pub const TAG_COMPLETE: u8 = 0x01;
/// Payload of a sentinel completion message
pub const SENTINEL_MARKER: u8 = 0x01;

/// Size of a tagged completion message: tag + u32 length
const TAGGED_COMPLETE_SIZE: usize = 5;

/// Identifies one logical channel. At most one frame is in flight per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u32);

impl SessionId {
    /// Channel used for point-cloud frames when a transport carries a single stream
    pub const POINT_CLOUD: SessionId = SessionId(0);
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of a chunked transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// A slice of the frame, in order
    Data(Vec<u8>),

    /// End of the frame. Carries the sender's total length when the framing transmits it.
    Complete { declared_len: Option<usize> },
}

/// Wire representation of chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    #[default]
    Tagged,
    Sentinel,
}

impl Framing {
    /// Bytes each data message spends on framing
    pub const fn data_overhead(self) -> usize {
        match self {
            Framing::Tagged => 1,
            Framing::Sentinel => 0,
        }
    }

    /// Smallest message limit that can carry both a data byte and a completion message
    pub const fn min_message_size(self) -> usize {
        match self {
            Framing::Tagged => TAGGED_COMPLETE_SIZE,
            Framing::Sentinel => 1,
        }
    }

    /// Serialize a chunk into one transport message.
    pub fn encode(self, chunk: &Chunk) -> Result<Vec<u8>> {
        match (self, chunk) {
            (Framing::Tagged, Chunk::Data(payload)) => {
                let mut message = Vec::with_capacity(payload.len() + 1);
                message.push(TAG_DATA);
                message.extend_from_slice(payload);
                Ok(message)
            }
            (Framing::Tagged, Chunk::Complete { declared_len }) => {
                let len = declared_len.ok_or_else(|| {
                    StreamError::invalid_input("Tagged completion requires a declared length")
                })?;
                let len = u32::try_from(len).map_err(|_| {
                    StreamError::invalid_input(format!("Frame of {len} bytes exceeds u32 framing"))
                })?;
                let mut message = Vec::with_capacity(TAGGED_COMPLETE_SIZE);
                message.push(TAG_COMPLETE);
                message.extend_from_slice(&len.to_le_bytes());
                Ok(message)
            }
            (Framing::Sentinel, Chunk::Data(payload)) => {
                if payload.as_slice() == [SENTINEL_MARKER] {
                    return Err(StreamError::AmbiguousChunk { offset: 0 });
                }
                Ok(payload.clone())
            }
            (Framing::Sentinel, Chunk::Complete { .. }) => Ok(vec![SENTINEL_MARKER]),
        }
    }

    /// Parse one transport message.
    pub fn decode(self, message: &[u8]) -> Result<Chunk> {
        match self {
            Framing::Sentinel => {
                if message == [SENTINEL_MARKER] {
                    Ok(Chunk::Complete { declared_len: None })
                } else {
                    Ok(Chunk::Data(message.to_vec()))
                }
            }
            Framing::Tagged => match message.split_first() {
                Some((&TAG_DATA, payload)) => Ok(Chunk::Data(payload.to_vec())),
                Some((&TAG_COMPLETE, len)) if len.len() == 4 => {
                    let declared = u32::from_le_bytes([len[0], len[1], len[2], len[3]]);
                    Ok(Chunk::Complete { declared_len: Some(declared as usize) })
                }
                Some((&TAG_COMPLETE, len)) => Err(StreamError::decode_error(
                    "Completion message",
                    format!("Expected 4 length bytes, got {}", len.len()),
                )),
                Some((tag, _)) => Err(StreamError::decode_error(
                    "Chunk tag",
                    format!("Unknown tag {:#04x}", tag),
                )),
                None => Err(StreamError::decode_error("Chunk tag", "Empty message")),
            },
        }
    }
}

/// Splits encoded frames into chunks that fit a transport message limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSplitter {
    max_message_size: usize,
    framing: Framing,
}

impl ChunkSplitter {
    /// `max_message_size` bounds every wire message, framing bytes included.
    pub fn new(max_message_size: usize, framing: Framing) -> Result<Self> {
        if max_message_size == 0 {
            return Err(StreamError::invalid_configuration("max_chunk_size", "must be non-zero"));
        }
        if max_message_size < framing.min_message_size() {
            return Err(StreamError::invalid_configuration(
                "max_chunk_size",
                format!(
                    "{:?} framing needs at least {} bytes per message, got {}",
                    framing,
                    framing.min_message_size(),
                    max_message_size
                ),
            ));
        }
        Ok(Self { max_message_size, framing })
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Largest data payload per message
    pub fn max_payload(&self) -> usize {
        self.max_message_size - self.framing.data_overhead()
    }

    /// Split `buffer` into data chunks followed by one completion chunk.
    ///
    /// Under sentinel framing a trailing one-byte remainder equal to the marker borrows a
    /// byte from the chunk before it. A full-size chunk equal to the marker (one-byte
    /// payload limit) cannot be fixed up, and the split fails with
    /// [`StreamError::AmbiguousChunk`] at that chunk's offset.
    pub fn split(&self, buffer: &[u8]) -> Result<Vec<Chunk>> {
        let max_payload = self.max_payload();
        let mut chunks: Vec<Chunk> =
            buffer.chunks(max_payload).map(|piece| Chunk::Data(piece.to_vec())).collect();

        if self.framing == Framing::Sentinel {
            let body = chunks.len().saturating_sub(1);
            if let Some(index) = chunks[..body].iter().position(is_sentinel_lookalike) {
                return Err(StreamError::AmbiguousChunk { offset: index * max_payload });
            }
            rebalance_sentinel_tail(&mut chunks, buffer)?;
        }

        chunks.push(Chunk::Complete { declared_len: Some(buffer.len()) });
        Ok(chunks)
    }

    /// Split and serialize in one step.
    pub fn to_messages(&self, buffer: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.split(buffer)?.iter().map(|chunk| self.framing.encode(chunk)).collect()
    }
}

fn is_sentinel_lookalike(chunk: &Chunk) -> bool {
    matches!(chunk, Chunk::Data(d) if d.as_slice() == [SENTINEL_MARKER])
}

fn rebalance_sentinel_tail(chunks: &mut [Chunk], buffer: &[u8]) -> Result<()> {
    let Some(last) = chunks.len().checked_sub(1) else {
        return Ok(());
    };
    if !is_sentinel_lookalike(&chunks[last]) {
        return Ok(());
    }

    let offset = buffer.len() - 1;
    if last == 0 {
        return Err(StreamError::AmbiguousChunk { offset });
    }

    let (head, tail) = chunks.split_at_mut(last);
    match (&mut head[last - 1], &mut tail[0]) {
        (Chunk::Data(previous), Chunk::Data(remainder))
            if previous.len() >= 3 || (previous.len() == 2 && previous[0] != SENTINEL_MARKER) =>
        {
            if let Some(byte) = previous.pop() {
                remainder.insert(0, byte);
            }
            Ok(())
        }
        _ => Err(StreamError::AmbiguousChunk { offset }),
    }
}

/// Split `buffer` into data chunks of at most `max_chunk_size` bytes plus a completion chunk.
pub fn split(buffer: &[u8], max_chunk_size: usize) -> Result<Vec<Chunk>> {
    if max_chunk_size == 0 {
        return Err(StreamError::invalid_configuration("max_chunk_size", "must be non-zero"));
    }
    let mut chunks: Vec<Chunk> =
        buffer.chunks(max_chunk_size).map(|piece| Chunk::Data(piece.to_vec())).collect();
    chunks.push(Chunk::Complete { declared_len: Some(buffer.len()) });
    Ok(chunks)
}
