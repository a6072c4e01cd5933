//! Parallel batch evaluation
//!
//! Splits a batch of frames into contiguous chunks, one per worker thread.
//! Every worker owns a [`Matcher`] and borrows the same rule slice; results
//! are returned in input order.

use crate::core::error::DecodeError;
use crate::core::firewall::{Action, CompiledRule};
use crate::core::matcher::Matcher;
use std::num::NonZeroUsize;
use tracing::trace;

/// Outcome for one frame: the winning action, no match, or a decode failure.
pub type Verdict<'r> = Result<Option<&'r Action>, DecodeError>;

/// Number of workers to use when none is configured.
pub fn default_workers() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

/// Evaluates every frame against `rules` on up to `workers` threads.
///
/// The result has one [`Verdict`] per frame, in the order of `frames`.
pub fn evaluate_frames<'r, F>(
    rules: &'r [CompiledRule],
    frames: &[F],
    workers: NonZeroUsize,
) -> Vec<Verdict<'r>>
where
    F: AsRef<[u8]> + Sync,
{
    let workers = workers.get().min(frames.len());
    if workers <= 1 {
        return evaluate_chunk(rules, frames, 0);
    }

    let chunk_size = frames.len().div_ceil(workers);
    std::thread::scope(|scope| {
        let handles: Vec<_> = frames
            .chunks(chunk_size)
            .enumerate()
            .map(|(i, chunk)| scope.spawn(move || evaluate_chunk(rules, chunk, i * chunk_size)))
            .collect();

        let mut verdicts = Vec::with_capacity(frames.len());
        for handle in handles {
            match handle.join() {
                Ok(chunk) => verdicts.extend(chunk),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        verdicts
    })
}

fn evaluate_chunk<'r, F: AsRef<[u8]>>(
    rules: &'r [CompiledRule],
    frames: &[F],
    first_index: usize,
) -> Vec<Verdict<'r>> {
    let mut matcher = Matcher::new();
    frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            let verdict = matcher.check(frame.as_ref(), rules);
            if let Err(e) = &verdict {
                trace!("Frame {} not evaluated: {}", first_index + i, e);
            }
            verdict
        })
        .collect()
}
