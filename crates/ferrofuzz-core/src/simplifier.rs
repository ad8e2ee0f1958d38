//! Crash minimization: shrink a crash artifact while preserving the edge
//! set it triggers.
//!
//! Modeled as an in-process `std::thread::scope` worker pool rather than
//! the fuzzing controller's OS-process workers — simplification is a
//! CPU-bound minimization of one artifact at a time with no need for the
//! adaptive-sampler cross-process isolation the fuzzing loop wants. This
//! divergence from the controller's OS-process worker model is recorded
//! in `DESIGN.md`.

use std::time::{Duration, Instant};

use rand::Rng;
use std::sync::Mutex;

use crate::edge::CoverageSet;
use crate::error::{Error, Result};
use crate::sampler::AdaptiveChoice;
use crate::target::{RunOutcome, Target, run_once};
use crate::tracer::Tracer;

/// `[len, newline_count]`. Dominance is componentwise `<=` with at least
/// one strict `<`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metrics {
    pub len: usize,
    pub newlines: usize,
}

impl Metrics {
    pub fn of(data: &[u8]) -> Self {
        Self {
            len: data.len(),
            newlines: data.iter().filter(|&&b| b == b'\n').count(),
        }
    }

    pub fn dominates(&self, other: &Metrics) -> bool {
        self.len <= other.len && self.newlines <= other.newlines && self != other
    }
}

fn run_and_get_signature(
    target: &dyn Target,
    tracer: &dyn Tracer,
    data: &[u8],
) -> Result<Option<CoverageSet>> {
    tracer.reset();
    match run_once(target, data)? {
        RunOutcome::Crashed { backtrace, .. } => {
            Ok(Some(tracer.covered_from_backtrace(&backtrace)))
        }
        RunOutcome::Clean => Ok(None),
    }
}

enum SimplifyOp {
    RemoveLines,
    RemoveCharacters,
    ShortenToken,
}

fn apply_op(op: &SimplifyOp, data: &[u8], rng: &mut impl Rng) -> Option<Vec<u8>> {
    match op {
        SimplifyOp::RemoveLines => remove_lines(data, rng),
        SimplifyOp::RemoveCharacters => remove_characters(data, rng),
        SimplifyOp::ShortenToken => shorten_token(data, rng),
    }
}

/// Splits `data` into newline-delimited chunks, each chunk retaining its
/// trailing `\n` (if any), and removes a random contiguous subrange of
/// them.
fn line_spans(data: &[u8]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0usize;
    for (i, &b) in data.iter().enumerate() {
        if b == b'\n' {
            spans.push((start, i + 1));
            start = i + 1;
        }
    }
    if start < data.len() {
        spans.push((start, data.len()));
    }
    spans
}

fn remove_lines(data: &[u8], rng: &mut impl Rng) -> Option<Vec<u8>> {
    let spans = line_spans(data);
    if spans.len() < 2 {
        return None;
    }
    let start = rng.random_range(0..spans.len());
    let count = rng.random_range(1..=(spans.len() - start));
    let remove_from = spans[start].0;
    let remove_to = spans[start + count - 1].1;
    let mut out = Vec::with_capacity(data.len() - (remove_to - remove_from));
    out.extend_from_slice(&data[..remove_from]);
    out.extend_from_slice(&data[remove_to..]);
    Some(out)
}

fn remove_characters(data: &[u8], rng: &mut impl Rng) -> Option<Vec<u8>> {
    if data.is_empty() {
        return None;
    }
    let start = rng.random_range(0..data.len());
    let max_len = (data.len() - start).min(9);
    if max_len == 0 {
        return None;
    }
    let len = rng.random_range(1..=max_len);
    try_remove_characters_at(data, start, len)
}

/// The refusal logic behind `remove-characters`: never cross a line break,
/// never strip the leading whitespace of a line.
fn try_remove_characters_at(data: &[u8], start: usize, len: usize) -> Option<Vec<u8>> {
    let range = &data[start..start + len];
    if range.contains(&b'\n') {
        return None;
    }

    // Leading whitespace of a line: everything from the line's start up
    // to `start` is whitespace.
    let line_start = data[..start]
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|p| p + 1)
        .unwrap_or(0);
    if data[line_start..start].iter().all(|b| b.is_ascii_whitespace()) {
        return None;
    }

    let mut out = Vec::with_capacity(data.len() - len);
    out.extend_from_slice(&data[..start]);
    out.extend_from_slice(&data[start + len..]);
    Some(out)
}

fn is_word_byte(b: u8, underscore_is_word: bool) -> bool {
    b.is_ascii_alphanumeric() || (underscore_is_word && b == b'_')
}

fn tokens(data: &[u8], underscore_is_word: bool) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut i = 0usize;
    while i < data.len() {
        if is_word_byte(data[i], underscore_is_word) {
            let start = i;
            while i < data.len() && is_word_byte(data[i], underscore_is_word) {
                i += 1;
            }
            if i - start > 1 {
                spans.push((start, i));
            }
        } else {
            i += 1;
        }
    }
    spans
}

fn shorten_token(data: &[u8], rng: &mut impl Rng) -> Option<Vec<u8>> {
    let underscore_is_word = rng.random_bool(0.5);
    let spans = tokens(data, underscore_is_word);
    if spans.is_empty() {
        return None;
    }

    let mut unique: Vec<&[u8]> = Vec::new();
    for &(s, e) in &spans {
        let text = &data[s..e];
        if !unique.contains(&text) {
            unique.push(text);
        }
    }
    let chosen = unique[rng.random_range(0..unique.len())];

    let mut occurrences: Vec<(usize, usize)> = spans
        .into_iter()
        .filter(|&(s, e)| &data[s..e] == chosen)
        .collect();
    occurrences.sort_by_key(|&(s, _)| std::cmp::Reverse(s));

    let mut out = data.to_vec();
    for (s, e) in occurrences {
        out.remove(e - 1);
        let _ = s;
    }
    Some(out)
}

struct WorkerState {
    op_choice: AdaptiveChoice<usize>,
}

impl WorkerState {
    fn new() -> Result<Self> {
        Ok(Self {
            op_choice: AdaptiveChoice::new(vec![0, 1, 2], true)?,
        })
    }

    fn pick(&mut self, rng: &mut impl Rng) -> (usize, SimplifyOp) {
        let idx = self.op_choice.sample(rng);
        let op = match idx {
            0 => SimplifyOp::RemoveLines,
            1 => SimplifyOp::RemoveCharacters,
            _ => SimplifyOp::ShortenToken,
        };
        (idx, op)
    }

    fn reinforce(&mut self, success: bool) {
        self.op_choice.update(success);
    }
}

/// Shrinks `data` for up to `time_budget`, preserving `target`'s crash and
/// edge signature. `data` itself must already crash; returns
/// [`Error::InvalidSample`] otherwise.
pub fn simplify(
    target: &dyn Target,
    tracer: &dyn Tracer,
    data: &[u8],
    time_budget: Duration,
    num_workers: usize,
) -> Result<Vec<u8>> {
    let baseline_signature = run_and_get_signature(target, tracer, data)?
        .ok_or_else(|| Error::InvalidSample("artifact no longer crashes".into()))?;

    let best = Mutex::new(data.to_vec());
    let deadline = Instant::now() + time_budget;

    std::thread::scope(|scope| {
        for _ in 0..num_workers.max(1) {
            scope.spawn(|| {
                let mut rng = rand::rng();
                let mut worker = match WorkerState::new() {
                    Ok(w) => w,
                    Err(_) => return,
                };
                while Instant::now() < deadline {
                    let candidate = best.lock().unwrap().clone();
                    let (op_idx, op) = worker.pick(&mut rng);
                    let Some(mutated) = apply_op(&op, &candidate, &mut rng) else {
                        worker.reinforce(false);
                        continue;
                    };
                    let candidate_metrics = Metrics::of(&candidate);
                    let mutated_metrics = Metrics::of(&mutated);
                    if !mutated_metrics.dominates(&candidate_metrics) {
                        worker.reinforce(false);
                        continue;
                    }
                    match run_and_get_signature(target, tracer, &mutated) {
                        Ok(Some(sig)) if sig == baseline_signature => {
                            let mut guard = best.lock().unwrap();
                            let current_metrics = Metrics::of(&guard);
                            if mutated_metrics.dominates(&current_metrics) {
                                *guard = mutated;
                            }
                            drop(guard);
                            worker.reinforce(true);
                        }
                        _ => {
                            worker.reinforce(false);
                            let _ = op_idx;
                        }
                    }
                }
            });
        }
    });

    Ok(best.into_inner().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn rejects_an_artifact_that_no_longer_crashes() {
        let target: Arc<dyn Target> = Arc::new(|_: &[u8]| {});
        let tracer = crate::tracer::ManualTracer::new();
        let result = simplify(target.as_ref(), &tracer, b"anything", Duration::from_millis(50), 2);
        assert!(matches!(result, Err(Error::InvalidSample(_))));
    }

    #[test]
    fn shrinks_toward_minimal_witness() {
        let target: Arc<dyn Target> = Arc::new(|data: &[u8]| {
            let text = String::from_utf8_lossy(data);
            if text.starts_with("START") && text.ends_with("END") && text.contains("CRASH") {
                panic!("matched");
            }
        });
        let tracer = crate::tracer::ManualTracer::new();
        let input = b"START\nUNRELATED\nCRASH\nEND".to_vec();
        let result = simplify(target.as_ref(), &tracer, &input, Duration::from_millis(500), 4).unwrap();

        let text = String::from_utf8_lossy(&result);
        assert!(text.starts_with("START"));
        assert!(text.ends_with("END"));
        assert!(text.contains("CRASH"));
        assert!(result.len() <= input.len());
    }

    #[test]
    fn remove_characters_refuses_to_cross_a_newline() {
        let data = b"line1\nline2";
        // Position 5 is the newline itself; removing it must be refused.
        assert!(try_remove_characters_at(data, 5, 1).is_none());
        // A removal entirely inside "line2" is fine.
        assert!(try_remove_characters_at(data, 7, 2).is_some());
    }

    #[test]
    fn remove_characters_refuses_leading_whitespace() {
        let data = b"line1\n   indented";
        // Positions 6..9 are the leading spaces of the second line.
        assert!(try_remove_characters_at(data, 6, 2).is_none());
        // Once past the leading run, removal is fine.
        assert!(try_remove_characters_at(data, 9, 2).is_some());
    }

    #[test]
    fn metrics_dominance_requires_strict_improvement() {
        let a = Metrics { len: 5, newlines: 1 };
        let b = Metrics { len: 5, newlines: 1 };
        assert!(!a.dominates(&b));
        let c = Metrics { len: 4, newlines: 1 };
        assert!(c.dominates(&a));
    }
}
