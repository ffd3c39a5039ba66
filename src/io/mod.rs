//! Block-synchronous audio I/O.
//!
//! [`AudioIo`] is the control-thread handle: lifecycle, configuration and
//! stage registration. [`Processor`] is what actually runs each block, and
//! [`AudioBuffers`] is the view of the block every stage receives.

/*
One Block
=========

Each device callback is split into fixed blocks of `frames_per_buffer` frames.
Every block runs the same eight steps, in this order:

    device input (interleaved)
        │
        ▼
    1. deinterleave ──────────► input buffers
    2. zero outputs             (auto-zero, default on)
    3. legacy callback          (if one is set)
    4. stages, in chain order   read input/bus, accumulate into outputs
    5. gain ramp                (gain control on; previous → target)
    6. non-finite → 0.0         (NaN guard, default on)
    7. clip to [-1, +1]         (default on)
    8. interleave ──────────► device output (interleaved)

Steps 5-7 run after every stage, so stages never see a gained, guarded or
clipped buffer.

States
------

    Closed ──open──► Open ──start──► Running
      ▲               ▲ │               │
      └────close──────┘ └◄────stop──────┘

`start` from Closed opens first. `close` from Running stops first. Channel
counts and block size can only change while Closed; the stage chain can only
change while not Running.
*/

mod buffers;
mod engine;
mod processor;
mod stage;

pub use buffers::AudioBuffers;
pub use engine::AudioIo;
pub use processor::{Callback, Controls, Processor};
pub use stage::{AudioStage, StageChain, StageId};
