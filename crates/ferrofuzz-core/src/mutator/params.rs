//! Per-operator parameter bags: each operator owns the adaptive samplers it
//! draws its random choices from, and reinforcing the operator reinforces
//! every sampler it used.
//!
//! This is a static-dispatch alternative to a dynamic attribute-bag
//! design: one concrete struct per operator instead of one dynamically
//! typed bag class reused for all of them.

use crate::error::Result;
use crate::sampler::{AdaptiveChoice, AdaptiveRange};

/// Forwards a reinforcement signal to every sampler a params bag owns.
pub trait Reinforce {
    fn update(&mut self, success: bool);
}

macro_rules! reinforce_fields {
    ($self:ident, $success:ident, $($field:ident),+ $(,)?) => {
        $( $self.$field.update($success); )+
    };
}

pub struct RemoveRangeParams {
    pub start: AdaptiveRange,
    pub len: AdaptiveRange,
}

impl RemoveRangeParams {
    pub fn new(max_input_size: usize, adaptive: bool) -> Result<Self> {
        Ok(Self {
            start: AdaptiveRange::new(0, max_input_size as i64, adaptive)?,
            len: AdaptiveRange::new(1, max_input_size as i64, adaptive)?,
        })
    }
}

impl Reinforce for RemoveRangeParams {
    fn update(&mut self, success: bool) {
        reinforce_fields!(self, success, start, len);
    }
}

pub struct InsertRangeParams {
    pub pos: AdaptiveRange,
    pub len: AdaptiveRange,
    pub max_insert_length: usize,
}

impl InsertRangeParams {
    pub fn new(max_input_size: usize, max_insert_length: usize, adaptive: bool) -> Result<Self> {
        let max_insert_length = max_insert_length.max(1);
        Ok(Self {
            pos: AdaptiveRange::new(0, max_input_size as i64, adaptive)?,
            len: AdaptiveRange::new(1, max_insert_length as i64, adaptive)?,
            max_insert_length,
        })
    }
}

impl Reinforce for InsertRangeParams {
    fn update(&mut self, success: bool) {
        reinforce_fields!(self, success, pos, len);
    }
}

pub struct DuplicateRangeParams {
    pub src: AdaptiveRange,
    pub len: AdaptiveRange,
    pub dst: AdaptiveRange,
}

impl DuplicateRangeParams {
    pub fn new(max_input_size: usize, adaptive: bool) -> Result<Self> {
        Ok(Self {
            src: AdaptiveRange::new(0, max_input_size as i64, adaptive)?,
            len: AdaptiveRange::new(1, max_input_size as i64, adaptive)?,
            dst: AdaptiveRange::new(0, max_input_size as i64, adaptive)?,
        })
    }
}

impl Reinforce for DuplicateRangeParams {
    fn update(&mut self, success: bool) {
        reinforce_fields!(self, success, src, len, dst);
    }
}

pub struct CopyRangeParams {
    pub src: AdaptiveRange,
    pub len: AdaptiveRange,
    pub dst: AdaptiveRange,
}

impl CopyRangeParams {
    pub fn new(max_input_size: usize, adaptive: bool) -> Result<Self> {
        Ok(Self {
            src: AdaptiveRange::new(0, max_input_size as i64, adaptive)?,
            len: AdaptiveRange::new(1, max_input_size as i64, adaptive)?,
            dst: AdaptiveRange::new(0, max_input_size as i64, adaptive)?,
        })
    }
}

impl Reinforce for CopyRangeParams {
    fn update(&mut self, success: bool) {
        reinforce_fields!(self, success, src, len, dst);
    }
}

pub struct BitFlipParams {
    pub pos: AdaptiveRange,
    pub bit: AdaptiveRange,
}

impl BitFlipParams {
    pub fn new(max_input_size: usize, adaptive: bool) -> Result<Self> {
        Ok(Self {
            pos: AdaptiveRange::new(0, max_input_size as i64, adaptive)?,
            bit: AdaptiveRange::new(0, 7, adaptive)?,
        })
    }
}

impl Reinforce for BitFlipParams {
    fn update(&mut self, success: bool) {
        reinforce_fields!(self, success, pos, bit);
    }
}

pub struct SingleBytePosParams {
    pub pos: AdaptiveRange,
}

impl SingleBytePosParams {
    pub fn new(max_input_size: usize, adaptive: bool) -> Result<Self> {
        Ok(Self {
            pos: AdaptiveRange::new(0, max_input_size as i64, adaptive)?,
        })
    }
}

impl Reinforce for SingleBytePosParams {
    fn update(&mut self, success: bool) {
        reinforce_fields!(self, success, pos);
    }
}

pub struct SwapTwoBytesParams {
    pub a: AdaptiveRange,
    pub b: AdaptiveRange,
}

impl SwapTwoBytesParams {
    pub fn new(max_input_size: usize, adaptive: bool) -> Result<Self> {
        Ok(Self {
            a: AdaptiveRange::new(0, max_input_size as i64, adaptive)?,
            b: AdaptiveRange::new(0, max_input_size as i64, adaptive)?,
        })
    }
}

impl Reinforce for SwapTwoBytesParams {
    fn update(&mut self, success: bool) {
        reinforce_fields!(self, success, a, b);
    }
}

pub struct ReplaceInterestingParams<T> {
    pub pos: AdaptiveRange,
    pub choice: AdaptiveChoice<T>,
}

impl<T: Clone> ReplaceInterestingParams<T> {
    pub fn new(max_input_size: usize, values: Vec<T>, adaptive: bool) -> Result<Self> {
        Ok(Self {
            pos: AdaptiveRange::new(0, max_input_size as i64, adaptive)?,
            choice: AdaptiveChoice::new(values, adaptive)?,
        })
    }
}

impl<T: Clone> Reinforce for ReplaceInterestingParams<T> {
    fn update(&mut self, success: bool) {
        self.pos.update(success);
        self.choice.update(success);
    }
}

pub struct ReplaceAsciiDigitParams {
    pub pos: AdaptiveRange,
    pub digit: AdaptiveChoice<u8>,
}

impl ReplaceAsciiDigitParams {
    pub fn new(max_input_size: usize, adaptive: bool) -> Result<Self> {
        Ok(Self {
            pos: AdaptiveRange::new(0, max_input_size as i64, adaptive)?,
            digit: AdaptiveChoice::new(super::constants::DIGITS.to_vec(), adaptive)?,
        })
    }
}

impl Reinforce for ReplaceAsciiDigitParams {
    fn update(&mut self, success: bool) {
        self.pos.update(success);
        self.digit.update(success);
    }
}

pub struct SpliceParams {
    pub cut: AdaptiveRange,
}

impl SpliceParams {
    pub fn new(max_input_size: usize, adaptive: bool) -> Result<Self> {
        Ok(Self {
            cut: AdaptiveRange::new(0, max_input_size as i64, adaptive)?,
        })
    }
}

impl Reinforce for SpliceParams {
    fn update(&mut self, success: bool) {
        reinforce_fields!(self, success, cut);
    }
}
