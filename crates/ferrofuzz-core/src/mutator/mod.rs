//! Mutation engine: the input corpus, the 16 operators, and the adaptive
//! choice between them.

mod constants;
mod ops;
mod params;

pub use ops::Operator;
pub use params::Reinforce;

use rand::Rng;

use crate::error::{Error, Result};
use crate::sampler::{AdaptiveChoice, AdaptiveRange};

/// The mutator's input pool: an append-only list of byte strings, with
/// index 0 reserved for the empty input, so the mutator always has
/// something to draw from even if every seed is discarded.
/// Owns the adaptive choice used specifically by the `splice` operator;
/// `State::get_input` samples from the plain list uniformly instead.
pub struct Corpus {
    inputs: Vec<Vec<u8>>,
    splice_choice: Option<AdaptiveChoice<usize>>,
    adaptive: bool,
}

impl Corpus {
    pub fn new(adaptive: bool) -> Self {
        Self {
            inputs: Vec::new(),
            splice_choice: None,
            adaptive,
        }
    }

    pub fn push(&mut self, input: Vec<u8>) {
        self.inputs.push(input);
        let idx = self.inputs.len() - 1;
        match &mut self.splice_choice {
            Some(c) => c.push(idx),
            None => {
                self.splice_choice =
                    AdaptiveChoice::new(vec![idx], self.adaptive).ok();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&[u8]> {
        self.inputs.get(idx).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.inputs.iter().map(Vec::as_slice)
    }

    /// Uniformly picks one pool entry, the way `State::get_input` selects
    /// the base input to mutate.
    pub fn random_input(&self, rng: &mut impl Rng) -> &[u8] {
        let idx = rng.random_range(0..self.inputs.len());
        &self.inputs[idx]
    }

    /// Draws a non-empty donor for `splice`, via the adaptive choice over
    /// indices. `Err(OutOfData)` when the draw lands on an empty input or
    /// the pool holds nothing else to splice from.
    pub(super) fn random_non_empty_other(
        &mut self,
        _current: &[u8],
        rng: &mut impl Rng,
    ) -> Option<Vec<u8>> {
        let choice = self.splice_choice.as_mut()?;
        let idx = choice.sample(rng);
        let donor = self.inputs.get(idx)?;
        if donor.is_empty() {
            None
        } else {
            Some(donor.clone())
        }
    }

    fn update_splice(&mut self, success: bool) {
        if let Some(c) = &mut self.splice_choice {
            c.update(success);
        }
    }
}

/// Owns the operator set, the input pool, and the per-mutation modification
/// count sampler.
pub struct Mutator {
    operators: Vec<Operator>,
    op_choice: AdaptiveChoice<usize>,
    mod_count: AdaptiveRange,
    corpus: Corpus,
    max_modifications: usize,
    max_input_size: usize,
    last_op_idx: Option<usize>,
}

impl Mutator {
    pub fn new(
        max_input_size: usize,
        max_modifications: usize,
        max_insert_length: usize,
        adaptive: bool,
    ) -> Result<Self> {
        let operators = build_operators(max_input_size, max_insert_length, adaptive)?;
        let op_choice = AdaptiveChoice::new((0..operators.len()).collect(), adaptive)?;
        let mod_count = AdaptiveRange::new(1, max_modifications.max(1) as i64, adaptive)?;
        Ok(Self {
            operators,
            op_choice,
            mod_count,
            corpus: Corpus::new(adaptive),
            max_modifications: max_modifications.max(1),
            max_input_size,
            last_op_idx: None,
        })
    }

    pub fn put_input(&mut self, input: Vec<u8>) {
        self.corpus.push(input);
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn corpus_len(&self) -> usize {
        self.corpus.len()
    }

    /// Returns a freshly mutated variant of a randomly chosen corpus input.
    pub fn get_input(&mut self, rng: &mut impl Rng) -> Result<Vec<u8>> {
        if self.corpus.is_empty() {
            return Err(Error::InternalBug("mutator input pool is empty".into()));
        }
        let base = self.corpus.random_input(rng).to_vec();
        self.mutate(&base, rng)
    }

    /// Applies `mod_count` successful operator draws to a copy of `input`.
    pub fn mutate(&mut self, input: &[u8], rng: &mut impl Rng) -> Result<Vec<u8>> {
        let mut res = input.to_vec();
        let n = self.mod_count.sample(1, self.max_modifications as i64, rng)? as usize;

        let mut applied = 0usize;
        let mut attempts = 0usize;
        // A generous cap, not a spec requirement: guards against an
        // adversarial config where every operator's precondition always
        // fails (e.g. max_modifications on a 0-byte max_input_size).
        let attempt_cap = (n + 1) * 64;
        while applied < n && attempts < attempt_cap {
            attempts += 1;
            let idx = self.op_choice.sample(rng);
            let operators = &mut self.operators;
            let corpus = &mut self.corpus;
            match operators[idx].apply(&mut res, corpus, rng) {
                Ok(()) => {
                    applied += 1;
                    self.last_op_idx = Some(idx);
                }
                Err(Error::OutOfData) => continue,
                Err(other) => return Err(other),
            }
        }

        if res.len() > self.max_input_size {
            res.truncate(self.max_input_size);
        }
        Ok(res)
    }

    /// Reinforces or demotes the last-used operator, the splice
    /// input-choice sampler, and the modification-count sampler.
    pub fn update(&mut self, success: bool) {
        if let Some(idx) = self.last_op_idx {
            self.operators[idx].reinforce(success);
            if matches!(self.operators[idx], Operator::Splice(_)) {
                self.corpus.update_splice(success);
            }
        }
        self.mod_count.update(success);
    }
}

fn build_operators(
    max_input_size: usize,
    max_insert_length: usize,
    adaptive: bool,
) -> Result<Vec<Operator>> {
    Ok(vec![
        Operator::RemoveRange(params::RemoveRangeParams::new(max_input_size, adaptive)?),
        Operator::InsertRange(params::InsertRangeParams::new(
            max_input_size,
            max_insert_length,
            adaptive,
        )?),
        Operator::DuplicateRange(params::DuplicateRangeParams::new(max_input_size, adaptive)?),
        Operator::CopyRange(params::CopyRangeParams::new(max_input_size, adaptive)?),
        Operator::BitFlip(params::BitFlipParams::new(max_input_size, adaptive)?),
        Operator::ByteXor(params::SingleBytePosParams::new(max_input_size, adaptive)?),
        Operator::SwapTwoBytes(params::SwapTwoBytesParams::new(max_input_size, adaptive)?),
        Operator::AddByte(params::SingleBytePosParams::new(max_input_size, adaptive)?),
        Operator::AddU16(params::SingleBytePosParams::new(max_input_size, adaptive)?),
        Operator::AddU32(params::SingleBytePosParams::new(max_input_size, adaptive)?),
        Operator::AddU64(params::SingleBytePosParams::new(max_input_size, adaptive)?),
        Operator::ReplaceByteInteresting(params::ReplaceInterestingParams::new(
            max_input_size,
            ops::interesting8(),
            adaptive,
        )?),
        Operator::ReplaceU16Interesting(params::ReplaceInterestingParams::new(
            max_input_size,
            ops::interesting16(),
            adaptive,
        )?),
        Operator::ReplaceU32Interesting(params::ReplaceInterestingParams::new(
            max_input_size,
            ops::interesting32(),
            adaptive,
        )?),
        Operator::ReplaceAsciiDigit(params::ReplaceAsciiDigitParams::new(
            max_input_size,
            adaptive,
        )?),
        Operator::Splice(params::SpliceParams::new(max_input_size, adaptive)?),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn mutating_tiny_inputs_never_panics() {
        let mut m = Mutator::new(64, 4, 8, true).unwrap();
        m.put_input(Vec::new());
        m.put_input(vec![0x2a]);
        let mut rng = rng();
        for _ in 0..500 {
            let out = m.get_input(&mut rng).unwrap();
            assert!(out.len() <= 64);
            m.update(rng.random_bool(0.3));
        }
    }

    #[test]
    fn output_never_exceeds_max_input_size() {
        let mut m = Mutator::new(16, 10, 16, true).unwrap();
        m.put_input(vec![1; 16]);
        let mut rng = rng();
        for _ in 0..300 {
            let out = m.get_input(&mut rng).unwrap();
            assert!(out.len() <= 16);
        }
    }

    #[test]
    fn corpus_grows_with_put_input() {
        let mut m = Mutator::new(32, 2, 4, false).unwrap();
        m.put_input(Vec::new());
        assert_eq!(m.corpus_len(), 1);
        m.put_input(vec![1, 2, 3]);
        assert_eq!(m.corpus_len(), 2);
    }
}
