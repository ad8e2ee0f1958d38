//! Length-prefixed `bincode` framing shared by the controller and every
//! worker, carrying both typed channel kinds (updates down, reports up)
//! over whatever byte stream the process re-exec binding provides.
//!
//! Each frame is a `u32` little-endian length followed by that many bytes
//! of `bincode`-encoded payload.

use std::io::{Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Serializes `value` and writes it as one length-prefixed frame.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    let payload = bincode::serialize(value)
        .map_err(|e| Error::InternalBug(format!("failed to encode frame: {e}")))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::InternalBug("frame payload exceeds u32::MAX".into()))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Reads one length-prefixed frame and decodes it. Returns `Ok(None)` on a
/// clean EOF at a frame boundary (the peer closed the pipe).
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0usize;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..])? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(Error::InternalBug(
                    "frame length prefix truncated at peer EOF".into(),
                ));
            }
            n => filled += n,
        }
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    let value = bincode::deserialize(&payload)
        .map_err(|e| Error::InternalBug(format!("failed to decode frame: {e}")))?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn write_then_read_round_trips() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &vec![1u8, 2, 3]).unwrap();
        write_frame(&mut buf, &vec![4u8, 5]).unwrap();

        let mut cursor = Cursor::new(buf);
        let first: Vec<u8> = read_frame(&mut cursor).unwrap().unwrap();
        let second: Vec<u8> = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(second, vec![4, 5]);
        let third: Option<Vec<u8>> = read_frame(&mut cursor).unwrap();
        assert!(third.is_none());
    }

    #[test]
    fn truncated_length_prefix_is_an_error_not_a_silent_eof() {
        let mut cursor = Cursor::new(vec![0u8, 1]);
        let result: Result<Option<Vec<u8>>> = read_frame(&mut cursor);
        assert!(result.is_err());
    }

    #[test]
    fn empty_stream_is_a_clean_eof() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let result: Option<Vec<u8>> = read_frame(&mut cursor).unwrap();
        assert!(result.is_none());
    }
}
