//! Block convolution with a carried tail.

/*
Block Convolution
=================

Convolving a signal x with a filter h (the impulse response) produces

    y[m] = Σ  x[n] × h[m - n]
           n

Every input sample launches a scaled copy of h that rings for N samples.

Vocabulary
----------

  impulse response   The filter itself, N taps long. Feeding a single 1.0
  (IR)               sample through the filter returns exactly these taps.

  tail               The part of a block's output that falls past the end of
                     the block. A block of L samples convolved with N taps
                     spans L + N - 1 samples, so N - 1 samples spill over.

  overlap-add        Processing a stream block by block: compute each block's
                     full convolution, emit the first L samples, and add the
                     spill-over into the start of the following blocks.


Why the Tail Matters
--------------------

Audio arrives in fixed blocks but the filter does not care where blocks
start. An impulse near the end of one block must keep ringing into the next:

    block k                       block k+1
    ┌──────────────────────┐     ┌──────────────────────┐
    │                  ▲   │     │                      │
    │                  │╲  │     │                      │
    │                  │ ╲╱╲__ tail ╲╱╲_____            │
    └──────────────────────┘     └──────────────────────┘

Dropping the tail puts a discontinuity at every block edge. Carrying it makes
block k, sample i equal to the unbroken convolution at global index k·L + i.


How It Works
------------

The convolver keeps N - 1 tail samples between calls. Per block:

    1. Add the resident tail into the start of the output.
    2. Shift the tail forward by L (the part just emitted is gone).
    3. For every input sample, add its scaled copy of h: the portion inside
       the block goes to the output, the rest accumulates into the tail.

Output is ADDED, never overwritten, so several sources can share one output
buffer. Cost is L × N multiply-adds per block; zero input samples are skipped.
*/

/// Per-channel overlap-add state for one impulse response.
///
/// The convolver owns only the tail; the IR is passed on every call so one
/// set of taps can be shared read-only.
#[derive(Debug, Clone)]
pub struct TailConvolver {
    tail: Vec<f32>,
}

impl TailConvolver {
    /// Allocate a zeroed tail for an IR of `ir_len` taps.
    pub fn new(ir_len: usize) -> Self {
        Self {
            tail: vec![0.0; ir_len.saturating_sub(1)],
        }
    }

    /// Samples carried into the next block.
    pub fn tail(&self) -> &[f32] {
        &self.tail
    }

    pub fn ir_len(&self) -> usize {
        self.tail.len() + 1
    }

    /// Convolve `input` with `ir` and add the result into `out`.
    ///
    /// `ir` must have the length this convolver was built for, and `out` must
    /// be at least as long as `input`.
    pub fn process_add(&mut self, ir: &[f32], input: &[f32], out: &mut [f32]) {
        debug_assert_eq!(ir.len(), self.ir_len());
        let len = input.len();
        if len == 0 || ir.is_empty() {
            return;
        }
        let out = &mut out[..len];
        let tail_len = self.tail.len();

        // 1. Emit what is already ringing.
        let emit = len.min(tail_len);
        for (o, &t) in out[..emit].iter_mut().zip(&self.tail[..emit]) {
            *o += t;
        }

        // 2. Slide the tail forward by one block.
        for j in 0..tail_len {
            self.tail[j] = if j + len < tail_len { self.tail[j + len] } else { 0.0 };
        }

        // 3. Launch this block's contributions.
        for (n, &x) in input.iter().enumerate() {
            if x == 0.0 {
                continue;
            }
            let inside = ir.len().min(len - n);
            for (o, &h) in out[n..n + inside].iter_mut().zip(&ir[..inside]) {
                *o += x * h;
            }
            if inside == ir.len() {
                continue;
            }
            // n + inside == len here, so the spill starts at the head of the tail
            for (t, &h) in self.tail.iter_mut().zip(&ir[inside..]) {
                *t += x * h;
            }
        }
    }

    /// Forget everything that is ringing.
    pub fn reset(&mut self) {
        self.tail.fill(0.0);
    }
}

/// Reference full-length linear convolution (`x.len() + h.len() - 1` samples).
pub fn convolve_full(x: &[f32], h: &[f32]) -> Vec<f32> {
    if x.is_empty() || h.is_empty() {
        return Vec::new();
    }
    let mut y = vec![0.0; x.len() + h.len() - 1];
    for (n, &xn) in x.iter().enumerate() {
        for (k, &hk) in h.iter().enumerate() {
            y[n + k] += xn * hk;
        }
    }
    y
}
