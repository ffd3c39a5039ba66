//! Random-phase impulse response synthesis.

/*
Decorrelation Filters
=====================

Copying one mono signal to many speakers gives a phantom image that collapses
to the nearest speaker. Filtering each copy with a different all-pass filter
keeps every copy sounding the same (same magnitude spectrum) while making the
copies statistically unrelated, so the sound spreads instead of localizing.

Vocabulary
----------

  magnitude-flat    Every frequency passes at the same level. The filter
                    changes timing (phase) only, never tone.

  random phase      Each frequency bin gets an independent, uniformly drawn
                    phase in [0, 2π). Two filters with different draws are
                    decorrelated.

  Hermitian         X[N - k] = conj(X[k]). A spectrum with this symmetry
  symmetry          inverts to a purely real signal. DC (k = 0) and, for even
                    N, Nyquist (k = N/2) are their own mirror, so they must be
                    real: ±1.


Synthesis
---------

For one channel of length N:

    X[0]       = ±1                      (random sign)
    X[k]       = e^(iφₖ), φₖ ~ U[0, 2π)   for 1 ≤ k < N/2 (rounded up)
    X[N - k]   = conj(X[k])
    X[N/2]     = ±1                      (even N only)

    h[n]       = (1/N) × Re( IFFT(X)[n] )

Parseval ties the two domains together: with |X[k]| = 1 for every bin, the
unnormalized inverse transform carries energy N², so the 1/N scale leaves every
channel with exactly unit energy (Σ h[n]² = 1). Loudness is identical across
channels no matter what the phases are.


Seeding
-------

The master seed is spread to each channel through a splitmix64 mix of
(seed, channel). Neighbouring master seeds therefore never hand out the same
filter to a shifted channel, and any (N, seed, channel) triple always yields
the same taps. Phases are drawn from ChaCha12 by name, so the taps do not
depend on which generator a rand release picks for StdRng.
*/

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Shortest impulse response that can be synthesized.
pub const MIN_IR_LENGTH: usize = 16;

static SEED_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Derive the seed for one output channel from the master seed.
pub fn channel_seed(master: u64, channel: usize) -> u64 {
    let mut z = master.wrapping_add(0x9E37_79B9_7F4A_7C15u64.wrapping_mul(channel as u64 + 1));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// A master seed for engines built without one.
///
/// Mixes wall-clock time with a process-wide counter so two engines created
/// back to back still differ.
pub fn fresh_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let count = SEED_COUNTER.fetch_add(1, Ordering::Relaxed);
    channel_seed(nanos, count as usize)
}

/// Builds unit-energy, magnitude-flat, random-phase impulse responses.
pub struct IrSynth {
    len: usize,
    fft: Arc<dyn Fft<f64>>,
    spectrum: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl IrSynth {
    pub fn new(len: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_inverse(len);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            len,
            fft,
            spectrum: vec![Complex::new(0.0, 0.0); len],
            scratch,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Synthesize the taps for one channel seed.
    pub fn render(&mut self, seed: u64) -> Vec<f32> {
        let n = self.len;
        if n == 0 {
            return Vec::new();
        }
        let mut rng = ChaCha12Rng::seed_from_u64(seed);

        self.spectrum[0] = Complex::new(random_sign(&mut rng), 0.0);
        for k in 1..n.div_ceil(2) {
            let phase = rng.gen::<f64>() * TAU;
            let bin = Complex::from_polar(1.0, phase);
            self.spectrum[k] = bin;
            self.spectrum[n - k] = bin.conj();
        }
        if n % 2 == 0 {
            self.spectrum[n / 2] = Complex::new(random_sign(&mut rng), 0.0);
        }

        self.fft.process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let scale = 1.0 / n as f64;
        self.spectrum.iter().map(|c| (c.re * scale) as f32).collect()
    }
}

#[inline]
fn random_sign(rng: &mut ChaCha12Rng) -> f64 {
    if rng.gen::<bool>() {
        1.0
    } else {
        -1.0
    }
}
