//! The 16 mutation operators.

use rand::Rng;

use super::constants::{DIGITS, INTERESTING16, INTERESTING32, INTERESTING8};
use super::params::*;
use crate::bytes;
use crate::error::{Error, Result};
use crate::mutator::Corpus;

/// One operator together with the parameter bag it draws from.
pub enum Operator {
    RemoveRange(RemoveRangeParams),
    InsertRange(InsertRangeParams),
    DuplicateRange(DuplicateRangeParams),
    CopyRange(CopyRangeParams),
    BitFlip(BitFlipParams),
    ByteXor(SingleBytePosParams),
    SwapTwoBytes(SwapTwoBytesParams),
    AddByte(SingleBytePosParams),
    AddU16(SingleBytePosParams),
    AddU32(SingleBytePosParams),
    AddU64(SingleBytePosParams),
    ReplaceByteInteresting(ReplaceInterestingParams<u8>),
    ReplaceU16Interesting(ReplaceInterestingParams<u16>),
    ReplaceU32Interesting(ReplaceInterestingParams<u32>),
    ReplaceAsciiDigit(ReplaceAsciiDigitParams),
    Splice(SpliceParams),
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::RemoveRange(_) => "remove-range",
            Operator::InsertRange(_) => "insert-range",
            Operator::DuplicateRange(_) => "duplicate-range",
            Operator::CopyRange(_) => "copy-range",
            Operator::BitFlip(_) => "bit-flip",
            Operator::ByteXor(_) => "byte-xor",
            Operator::SwapTwoBytes(_) => "swap-two-bytes",
            Operator::AddByte(_) => "add-byte",
            Operator::AddU16(_) => "add-u16",
            Operator::AddU32(_) => "add-u32",
            Operator::AddU64(_) => "add-u64",
            Operator::ReplaceByteInteresting(_) => "replace-byte-interesting",
            Operator::ReplaceU16Interesting(_) => "replace-u16-interesting",
            Operator::ReplaceU32Interesting(_) => "replace-u32-interesting",
            Operator::ReplaceAsciiDigit(_) => "replace-ascii-digit",
            Operator::Splice(_) => "splice",
        }
    }

    pub fn reinforce(&mut self, success: bool) {
        match self {
            Operator::RemoveRange(p) => p.update(success),
            Operator::InsertRange(p) => p.update(success),
            Operator::DuplicateRange(p) => p.update(success),
            Operator::CopyRange(p) => p.update(success),
            Operator::BitFlip(p) => p.update(success),
            Operator::ByteXor(p) => p.update(success),
            Operator::SwapTwoBytes(p) => p.update(success),
            Operator::AddByte(p) => p.update(success),
            Operator::AddU16(p) => p.update(success),
            Operator::AddU32(p) => p.update(success),
            Operator::AddU64(p) => p.update(success),
            Operator::ReplaceByteInteresting(p) => p.update(success),
            Operator::ReplaceU16Interesting(p) => p.update(success),
            Operator::ReplaceU32Interesting(p) => p.update(success),
            Operator::ReplaceAsciiDigit(p) => p.update(success),
            Operator::Splice(p) => p.update(success),
        }
    }

    /// Applies this operator to `buf` in place. Returns `Error::OutOfData`
    /// when the operator's precondition isn't met; the mutate loop treats
    /// that as a no-op and retries with a different draw.
    pub fn apply(
        &mut self,
        buf: &mut Vec<u8>,
        corpus: &mut Corpus,
        rng: &mut impl Rng,
    ) -> Result<()> {
        match self {
            Operator::RemoveRange(p) => remove_range(buf, p, rng),
            Operator::InsertRange(p) => insert_range(buf, p, rng),
            Operator::DuplicateRange(p) => duplicate_range(buf, p, rng),
            Operator::CopyRange(p) => copy_range(buf, p, rng),
            Operator::BitFlip(p) => bit_flip(buf, p, rng),
            Operator::ByteXor(p) => byte_xor(buf, p, rng),
            Operator::SwapTwoBytes(p) => swap_two_bytes(buf, p, rng),
            Operator::AddByte(p) => add_byte(buf, p, rng),
            Operator::AddU16(p) => add_multibyte::<2>(buf, p, rng),
            Operator::AddU32(p) => add_multibyte::<4>(buf, p, rng),
            Operator::AddU64(p) => add_multibyte::<8>(buf, p, rng),
            Operator::ReplaceByteInteresting(p) => replace_byte_interesting(buf, p, rng),
            Operator::ReplaceU16Interesting(p) => replace_u16_interesting(buf, p, rng),
            Operator::ReplaceU32Interesting(p) => replace_u32_interesting(buf, p, rng),
            Operator::ReplaceAsciiDigit(p) => replace_ascii_digit(buf, p, rng),
            Operator::Splice(p) => splice(buf, p, corpus, rng),
        }
    }
}

fn need(buf: &[u8], min_len: usize) -> Result<()> {
    if buf.len() < min_len {
        Err(Error::OutOfData)
    } else {
        Ok(())
    }
}

fn remove_range(buf: &mut Vec<u8>, p: &mut RemoveRangeParams, rng: &mut impl Rng) -> Result<()> {
    need(buf, 2)?;
    let start = p.start.sample(0, buf.len() as i64 - 1, rng)? as usize;
    let max_len = (buf.len() - start) as i64;
    let len = p.len.sample(1, max_len, rng)? as usize;
    bytes::remove(buf, start, len)
}

fn insert_range(buf: &mut Vec<u8>, p: &mut InsertRangeParams, rng: &mut impl Rng) -> Result<()> {
    let pos = p.pos.sample(0, buf.len() as i64, rng)? as usize;
    let len = p.len.sample(1, p.max_insert_length as i64, rng)? as usize;
    let src: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    bytes::insert(buf, pos, &src)
}

fn duplicate_range(
    buf: &mut Vec<u8>,
    p: &mut DuplicateRangeParams,
    rng: &mut impl Rng,
) -> Result<()> {
    need(buf, 2)?;
    let src = p.src.sample(0, buf.len() as i64 - 1, rng)? as usize;
    let max_len = (buf.len() - src) as i64;
    let len = p.len.sample(1, max_len, rng)? as usize;
    let dst_hi = (buf.len() - len) as i64;
    let dst = p.dst.sample(0, dst_hi.max(0), rng)? as usize;
    let chunk = buf[src..src + len].to_vec();
    bytes::insert(buf, dst, &chunk)
}

fn copy_range(buf: &mut Vec<u8>, p: &mut CopyRangeParams, rng: &mut impl Rng) -> Result<()> {
    need(buf, 2)?;
    let src = p.src.sample(0, buf.len() as i64 - 1, rng)? as usize;
    let max_len = (buf.len() - src) as i64;
    let len = p.len.sample(1, max_len, rng)? as usize;
    let dst_hi = (buf.len() - len) as i64;
    let dst = p.dst.sample(0, dst_hi.max(0), rng)? as usize;
    bytes::copy(buf, src, dst, len)
}

fn bit_flip(buf: &mut [u8], p: &mut BitFlipParams, rng: &mut impl Rng) -> Result<()> {
    need(buf, 1)?;
    let pos = p.pos.sample(0, buf.len() as i64 - 1, rng)? as usize;
    let bit = p.bit.sample(0, 7, rng)? as u32;
    buf[pos] ^= 1 << bit;
    Ok(())
}

fn byte_xor(buf: &mut [u8], p: &mut SingleBytePosParams, rng: &mut impl Rng) -> Result<()> {
    need(buf, 1)?;
    let pos = p.pos.sample(0, buf.len() as i64 - 1, rng)? as usize;
    let mask: u8 = loop {
        let v = rng.random::<u8>();
        if v != 0 {
            break v;
        }
    };
    buf[pos] ^= mask;
    Ok(())
}

fn swap_two_bytes(buf: &mut [u8], p: &mut SwapTwoBytesParams, rng: &mut impl Rng) -> Result<()> {
    need(buf, 2)?;
    let a = p.a.sample(0, buf.len() as i64 - 1, rng)? as usize;
    let b = p.b.sample(0, buf.len() as i64 - 1, rng)? as usize;
    buf.swap(a, b);
    Ok(())
}

fn add_byte(buf: &mut [u8], p: &mut SingleBytePosParams, rng: &mut impl Rng) -> Result<()> {
    need(buf, 1)?;
    let pos = p.pos.sample(0, buf.len() as i64 - 1, rng)? as usize;
    let delta: u8 = rng.random();
    buf[pos] = buf[pos].wrapping_add(delta);
    Ok(())
}

/// Adds a random `N`-byte addend to `N` consecutive bytes, byte-wise modulo
/// 256 without carry propagation — a deliberately weakened emulation of
/// multi-byte arithmetic, kept for compatibility with the source behavior
/// this operator set was ported from.
fn add_multibyte<const N: usize>(
    buf: &mut [u8],
    p: &mut SingleBytePosParams,
    rng: &mut impl Rng,
) -> Result<()> {
    need(buf, N)?;
    let pos = p.pos.sample(0, buf.len() as i64 - N as i64, rng)? as usize;
    for b in &mut buf[pos..pos + N] {
        let delta: u8 = rng.random();
        *b = b.wrapping_add(delta);
    }
    Ok(())
}

fn replace_byte_interesting(
    buf: &mut [u8],
    p: &mut ReplaceInterestingParams<u8>,
    rng: &mut impl Rng,
) -> Result<()> {
    need(buf, 1)?;
    let pos = p.pos.sample(0, buf.len() as i64 - 1, rng)? as usize;
    buf[pos] = p.choice.sample(rng);
    Ok(())
}

fn replace_u16_interesting(
    buf: &mut [u8],
    p: &mut ReplaceInterestingParams<u16>,
    rng: &mut impl Rng,
) -> Result<()> {
    need(buf, 2)?;
    let pos = p.pos.sample(0, buf.len() as i64 - 2, rng)? as usize;
    let v = p.choice.sample(rng);
    let bytes = if rng.random_bool(0.5) {
        v.to_le_bytes()
    } else {
        v.to_be_bytes()
    };
    buf[pos..pos + 2].copy_from_slice(&bytes);
    Ok(())
}

fn replace_u32_interesting(
    buf: &mut [u8],
    p: &mut ReplaceInterestingParams<u32>,
    rng: &mut impl Rng,
) -> Result<()> {
    need(buf, 4)?;
    let pos = p.pos.sample(0, buf.len() as i64 - 4, rng)? as usize;
    let v = p.choice.sample(rng);
    let bytes = if rng.random_bool(0.5) {
        v.to_le_bytes()
    } else {
        v.to_be_bytes()
    };
    buf[pos..pos + 4].copy_from_slice(&bytes);
    Ok(())
}

fn replace_ascii_digit(
    buf: &mut [u8],
    p: &mut ReplaceAsciiDigitParams,
    rng: &mut impl Rng,
) -> Result<()> {
    let digit_positions: Vec<usize> = buf
        .iter()
        .enumerate()
        .filter(|(_, b)| b.is_ascii_digit())
        .map(|(i, _)| i)
        .collect();
    if digit_positions.is_empty() {
        return Err(Error::OutOfData);
    }
    let idx = p.pos.sample(0, digit_positions.len() as i64 - 1, rng)? as usize;
    let pos = digit_positions[idx];
    let current = buf[pos];
    loop {
        let candidate = p.digit.sample(rng);
        if candidate != current {
            buf[pos] = candidate;
            return Ok(());
        }
    }
}

fn splice(
    buf: &mut Vec<u8>,
    p: &mut SpliceParams,
    corpus: &mut Corpus,
    rng: &mut impl Rng,
) -> Result<()> {
    need(buf, 1)?;
    let donor = corpus.random_non_empty_other(buf, rng).ok_or(Error::OutOfData)?;
    let cut = p.cut.sample(0, buf.len() as i64 - 1, rng)? as usize;
    let tail_start = rng.random_range(0..donor.len());
    let mut result = buf[..cut].to_vec();
    result.extend_from_slice(&donor[tail_start..]);
    *buf = result;
    Ok(())
}

pub(super) fn interesting8() -> Vec<u8> {
    INTERESTING8.to_vec()
}

pub(super) fn interesting16() -> Vec<u16> {
    INTERESTING16.to_vec()
}

pub(super) fn interesting32() -> Vec<u32> {
    INTERESTING32.to_vec()
}

pub(super) fn digits() -> Vec<u8> {
    DIGITS.to_vec()
}
