//! Bounded insert/remove/copy on mutable byte buffers.
//!
//! All three operations are total on the complement of their documented
//! failure condition; the single error kind is [`Error::OutOfBounds`].

use crate::error::{Error, Result};

/// Deletes `buf[start..start+len]`, shifting the tail left.
pub fn remove(buf: &mut Vec<u8>, start: usize, len: usize) -> Result<()> {
    if start >= buf.len() {
        return Err(Error::OutOfBounds(format!(
            "start out of range (start={start}, len={})",
            buf.len()
        )));
    }
    if start + len > buf.len() {
        return Err(Error::OutOfBounds(format!(
            "end out of range (end={}, len={})",
            start + len,
            buf.len()
        )));
    }
    buf.drain(start..start + len);
    Ok(())
}

/// Inserts `src` before position `start`.
pub fn insert(buf: &mut Vec<u8>, start: usize, src: &[u8]) -> Result<()> {
    if start > buf.len() {
        return Err(Error::OutOfBounds(format!(
            "start out of range (start={start}, len={})",
            buf.len()
        )));
    }
    buf.splice(start..start, src.iter().copied());
    Ok(())
}

/// In-place, overlap-safe copy of `buf[src..src+len]` onto `buf[dst..dst+len]`.
pub fn copy(buf: &mut [u8], src: usize, dst: usize, len: usize) -> Result<()> {
    let buf_len = buf.len();
    if src >= buf_len && len > 0 {
        return Err(Error::OutOfBounds(format!(
            "source out of range (src={src}, len={buf_len})"
        )));
    }
    if src + len > buf_len {
        return Err(Error::OutOfBounds(format!(
            "source end out of range (end={}, len={buf_len})",
            src + len
        )));
    }
    if dst >= buf_len && len > 0 {
        return Err(Error::OutOfBounds(format!(
            "destination out of range (dst={dst}, len={buf_len})"
        )));
    }
    if dst + len > buf_len {
        return Err(Error::OutOfBounds(format!(
            "destination end out of range (end={}, len={buf_len})",
            dst + len
        )));
    }
    if len == 0 {
        return Ok(());
    }
    let chunk = buf[src..src + len].to_vec();
    buf[dst..dst + len].copy_from_slice(&chunk);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_shrinks_by_exact_length() {
        let mut buf = b"abcdef".to_vec();
        remove(&mut buf, 1, 3).unwrap();
        assert_eq!(buf, b"aef");
    }

    #[test]
    fn remove_rejects_out_of_range() {
        let mut buf = b"ab".to_vec();
        assert!(remove(&mut buf, 2, 1).is_err());
        assert!(remove(&mut buf, 0, 3).is_err());
    }

    #[test]
    fn insert_then_remove_restores_original() {
        let original = b"hello world".to_vec();
        let mut buf = original.clone();
        insert(&mut buf, 5, b"-inserted-").unwrap();
        remove(&mut buf, 5, "-inserted-".len()).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn insert_rejects_start_past_end() {
        let mut buf = b"ab".to_vec();
        assert!(insert(&mut buf, 3, b"x").is_err());
        insert(&mut buf, 2, b"x").unwrap();
        assert_eq!(buf, b"abx");
    }

    #[test]
    fn copy_never_changes_length() {
        let mut buf = b"abcdefgh".to_vec();
        let len_before = buf.len();
        copy(&mut buf, 0, 4, 3).unwrap();
        assert_eq!(buf.len(), len_before);
        assert_eq!(&buf[4..7], b"abc");
    }

    #[test]
    fn copy_handles_overlap_forward_and_backward() {
        let mut buf = b"abcdefgh".to_vec();
        copy(&mut buf, 0, 2, 4).unwrap();
        assert_eq!(buf, b"ababcdgh");

        let mut buf2 = b"abcdefgh".to_vec();
        copy(&mut buf2, 2, 0, 4).unwrap();
        assert_eq!(buf2, b"cdefefgh");
    }

    #[test]
    fn copy_rejects_escaping_ranges() {
        let mut buf = b"abcd".to_vec();
        assert!(copy(&mut buf, 0, 0, 5).is_err());
        assert!(copy(&mut buf, 3, 0, 2).is_err());
        assert!(copy(&mut buf, 0, 3, 2).is_err());
    }
}
