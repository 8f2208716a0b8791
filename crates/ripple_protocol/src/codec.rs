//! CBOR encoding and length-prefixed framing.
//!
//! A frame is a 4-byte big-endian body length followed by the CBOR body.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, Read, Write};

/// Largest frame body accepted by [`read_frame`] and produced by [`write_frame`].
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Encoded size a snapshot chunk is filled to before a new one starts.
///
/// Half a frame, so a chunk that overshoots by one row still fits.
pub const SNAPSHOT_CHUNK_LEN: usize = MAX_FRAME_LEN / 2;

/// Encodes a value to CBOR bytes.
pub fn encode<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a value from CBOR bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

/// Encodes a value and writes it as a single frame, then flushes.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> ProtocolResult<()> {
    let body = encode(value)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len: body.len(),
            max: MAX_FRAME_LEN,
        });
    }

    // Bounded by MAX_FRAME_LEN above.
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame and decodes it.
///
/// Returns `Ok(None)` if the stream ends before a new frame starts. A stream
/// that ends inside the length header is an I/O error.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> ProtocolResult<Option<T>> {
    let mut len_bytes = [0u8; 4];
    let mut filled = 0;
    while filled < len_bytes.len() {
        match reader.read(&mut len_bytes[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {filled} of 4 header bytes"),
                )
                .into());
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    decode(&body).map(Some)
}
