//! Decorrelation filter bank.
//!
//! Spreads one bus or input channel across many outputs by convolving it with
//! a different random-phase, unit-energy impulse response per output. The
//! filter bank is an [`AudioStage`] and is registered in an
//! [`AudioIo`] chain like any other, and can be reached again for
//! [`reseed`](Decorrelation::reseed) through [`AudioIo::stage_mut`].

/*
Routing
=======

    bus[input_channel]  (or input[input_channel])
          │
          ├──► IR 0 ──► out[first_output + 0]  (+=)
          ├──► IR 1 ──► out[first_output + 1]  (+=)
          │     ⋮
          └──► IR M-1 ─► out[first_output + M-1] (+=)

Every output is accumulated into, never overwritten, so the bank can share
outputs with other stages. Each output keeps its own N-1 sample tail, so a
block boundary is invisible in the result.

A bank built with an IR shorter than MIN_IR_LENGTH or with zero outputs is
inert: it allocates nothing and passes every block through untouched. That is
a configuration outcome, not an error.

Routing problems found while streaming (a missing source channel, outputs past
the end of the buffer) are never reported from the audio thread. The missing
part is skipped. `configure` checks the routing up front and warns.
*/

mod ir;

use std::any::Any;

use log::{debug, warn};

pub use ir::{channel_seed, fresh_seed, IrSynth, MIN_IR_LENGTH};

use crate::dsp::TailConvolver;
use crate::io::{AudioBuffers, AudioIo, AudioStage};

/// Where the bank reads its signal from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Bus,
    Input,
}

/// Multi-output decorrelation filter bank.
pub struct Decorrelation {
    ir_len: usize,
    input_channel: usize,
    num_outputs: usize,
    seed: u64,
    source: Source,
    first_output: usize,
    irs: Vec<Vec<f32>>,
    convolvers: Vec<TailConvolver>,
}

impl Decorrelation {
    /// Build a bank of `num_outputs` filters, `ir_len` taps each.
    ///
    /// `input_channel` is read from the bus by default (see
    /// [`configure`](Self::configure)). A `seed` of `None` derives one from
    /// the clock; [`current_seed`](Self::current_seed) reports it either way.
    pub fn new(ir_len: usize, input_channel: usize, num_outputs: usize, seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(fresh_seed);
        let mut bank = Self {
            ir_len,
            input_channel,
            num_outputs,
            seed,
            source: Source::Bus,
            first_output: 0,
            irs: Vec::new(),
            convolvers: Vec::new(),
        };

        if bank.is_inert() {
            debug!("decorrelation inert: ir_len={ir_len}, outputs={num_outputs}");
            return bank;
        }
        bank.build();
        bank
    }

    /// IR length, or 0 for an inert bank.
    pub fn size(&self) -> usize {
        if self.is_inert() {
            0
        } else {
            self.ir_len
        }
    }

    pub fn current_seed(&self) -> u64 {
        self.seed
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    pub fn input_channel(&self) -> usize {
        self.input_channel
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn first_output(&self) -> usize {
        self.first_output
    }

    /// Taps for output `channel`. `None` when inert or out of range.
    pub fn ir(&self, channel: usize) -> Option<&[f32]> {
        self.irs.get(channel).map(Vec::as_slice)
    }

    /// True when the bank was built too short or with no outputs.
    pub fn is_inert(&self) -> bool {
        self.ir_len < MIN_IR_LENGTH || self.num_outputs == 0
    }

    /// Route the bank for `io`.
    ///
    /// Outputs go to `first_output..first_output + num_outputs`; the signal is
    /// read from bus channel `input_channel` when `input_is_bus`, otherwise
    /// from the device input channel. Routing that `io` cannot satisfy is
    /// logged and applied anyway; missing channels are skipped while
    /// processing.
    pub fn configure(&mut self, io: &AudioIo, first_output: usize, input_is_bus: bool) {
        self.first_output = first_output;
        self.source = if input_is_bus { Source::Bus } else { Source::Input };

        let (available, label) = match self.source {
            Source::Bus => (io.channels_bus(), "bus"),
            Source::Input => (io.channels_in(), "input"),
        };
        if self.input_channel >= available {
            warn!(
                "decorrelation reads {label} channel {} but only {available} are configured",
                self.input_channel
            );
        }
        if first_output + self.num_outputs > io.channels_out() {
            warn!(
                "decorrelation writes outputs {}..{} but only {} are configured",
                first_output,
                first_output + self.num_outputs,
                io.channels_out()
            );
        }
    }

    /// Rebuild every IR from a new master seed and clear history.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        if !self.is_inert() {
            self.build();
        }
    }

    /// Clear convolution history, keeping the IRs.
    pub fn reset(&mut self) {
        for convolver in &mut self.convolvers {
            convolver.reset();
        }
    }

    fn build(&mut self) {
        let mut synth = IrSynth::new(self.ir_len);
        self.irs = (0..self.num_outputs)
            .map(|c| synth.render(channel_seed(self.seed, c)))
            .collect();
        self.convolvers = (0..self.num_outputs).map(|_| TailConvolver::new(self.ir_len)).collect();
    }
}

impl AudioStage for Decorrelation {
    fn process(&mut self, io: &mut AudioBuffers) {
        if self.irs.is_empty() {
            return;
        }
        let available = match self.source {
            Source::Bus => io.channels_bus(),
            Source::Input => io.channels_in(),
        };
        if self.input_channel >= available {
            return;
        }

        let outputs = io.channels_out();
        for (c, (ir, convolver)) in self.irs.iter().zip(self.convolvers.iter_mut()).enumerate() {
            let out_channel = self.first_output + c;
            if out_channel >= outputs {
                break;
            }
            let (input, out) = match self.source {
                Source::Bus => io.bus_and_output_mut(self.input_channel, out_channel),
                Source::Input => io.input_and_output_mut(self.input_channel, out_channel),
            };
            convolver.process_add(ir, input, out);
        }
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}

impl std::fmt::Debug for Decorrelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decorrelation")
            .field("size", &self.size())
            .field("input_channel", &self.input_channel)
            .field("num_outputs", &self.num_outputs)
            .field("seed", &self.seed)
            .field("source", &self.source)
            .field("first_output", &self.first_output)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_size_and_seed() {
        let bank = Decorrelation::new(32, 1, 1, Some(1000));
        assert_eq!(bank.current_seed(), 1000);
        assert_eq!(bank.size(), 32);
        assert_eq!(bank.ir(0).map(<[f32]>::len), Some(32));

        let bank = Decorrelation::new(1024, 1, 32, Some(1001));
        assert_eq!(bank.current_seed(), 1001);
        assert_eq!(bank.size(), 1024);
        assert!(bank.ir(31).is_some());
        assert!(bank.ir(32).is_none());
    }

    #[test]
    fn test_short_ir_is_inert() {
        let bank = Decorrelation::new(10, 1, 8, Some(1001));
        assert_eq!(bank.current_seed(), 1001);
        assert_eq!(bank.size(), 0);
        assert!(bank.ir(0).is_none());
    }

    #[test]
    fn test_no_outputs_is_inert() {
        let bank = Decorrelation::new(32, 1, 0, None);
        assert_eq!(bank.size(), 0);
    }

    #[test]
    fn test_min_length_is_not_inert() {
        let bank = Decorrelation::new(MIN_IR_LENGTH, 0, 1, Some(3));
        assert_eq!(bank.size(), MIN_IR_LENGTH);
    }

    #[test]
    fn test_inert_bank_leaves_output_alone() {
        let mut bank = Decorrelation::new(8, 0, 2, Some(1));
        let mut io = AudioBuffers::new(16, 48_000.0);
        io.set_channels_bus(1);
        io.set_channels_out(2);
        io.bus_mut(0)[0] = 1.0;
        io.output_mut(1).fill(0.25);

        bank.process(&mut io);

        assert!(io.output(0).iter().all(|&s| s == 0.0));
        assert!(io.output(1).iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_unseeded_banks_differ() {
        let a = Decorrelation::new(64, 0, 1, None);
        let b = Decorrelation::new(64, 0, 1, None);
        assert_ne!(a.current_seed(), b.current_seed());
    }

    #[test]
    fn test_reseed_rebuilds() {
        let mut bank = Decorrelation::new(64, 0, 2, Some(5));
        let before = bank.ir(0).map(<[f32]>::to_vec);
        bank.reseed(6);
        assert_eq!(bank.current_seed(), 6);
        assert_ne!(bank.ir(0).map(<[f32]>::to_vec), before);

        bank.reseed(5);
        assert_eq!(bank.ir(0).map(<[f32]>::to_vec), before);
    }

    #[test]
    fn test_missing_source_channel_is_skipped() {
        let mut bank = Decorrelation::new(32, 3, 1, Some(1));
        let mut io = AudioBuffers::new(16, 48_000.0);
        io.set_channels_bus(1);
        io.set_channels_out(1);

        bank.process(&mut io);

        assert!(io.output(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_outputs_past_buffer_are_skipped() {
        let mut bank = Decorrelation::new(32, 0, 4, Some(1));
        let mut io = AudioBuffers::new(16, 48_000.0);
        io.set_channels_bus(1);
        io.set_channels_out(2);
        io.bus_mut(0)[0] = 1.0;

        bank.process(&mut io);

        let ir0 = bank.ir(0).unwrap();
        assert_eq!(io.output(0), &ir0[..16]);
    }
}
