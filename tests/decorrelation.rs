//! Decorrelation filter bank driven through the I/O engine.

use approx::assert_abs_diff_eq;
use saavy_decorr::dsp::convolve::convolve_full;
use saavy_decorr::{AudioBuffers, AudioIo, AudioStage, Decorrelation, Error, IoConfig};

const FRAMES: usize = 64;

fn engine(outputs: i32, inputs: i32, bus: usize) -> AudioIo {
    let config = IoConfig::dummy(FRAMES, 44_100.0, outputs, inputs).bus_channels(bus);
    AudioIo::new(config).unwrap()
}

fn energy(ir: &[f32]) -> f64 {
    ir.iter().map(|&s| (s as f64) * (s as f64)).sum()
}

/// Normalized correlation at zero lag.
fn correlation(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(&x, &y)| x as f64 * y as f64).sum();
    dot / (energy(a).sqrt() * energy(b).sqrt())
}

#[test]
fn test_impulse_then_tail_across_blocks() {
    let mut io = engine(2, 2, 1);
    let mut bank = Decorrelation::new(64, 0, 1, Some(1000));
    bank.configure(&io, 0, true);
    let ir = bank.ir(0).unwrap().to_vec();
    io.append(Box::new(bank)).unwrap();

    // Block 1: impulse at frame 1
    {
        let buffers = io.buffers_mut().unwrap();
        buffers.zero_bus();
        buffers.bus_mut(0)[1] = 1.0;
    }
    io.process_audio().unwrap();

    let out = io.buffers().unwrap().output(0).to_vec();
    assert_eq!(out[0], 0.0);
    for i in 1..FRAMES {
        assert_abs_diff_eq!(out[i], ir[i - 1], epsilon = 1e-6);
    }

    // Block 2: half-scale impulse at frame 6, plus the last tap still ringing
    {
        let buffers = io.buffers_mut().unwrap();
        buffers.zero_output();
        buffers.zero_bus();
        buffers.bus_mut(0)[6] = 0.5;
    }
    io.process_audio().unwrap();

    let out = io.buffers().unwrap().output(0).to_vec();
    assert_abs_diff_eq!(out[0], ir[63], epsilon = 1e-6);
    for &s in &out[1..6] {
        assert_eq!(s, 0.0);
    }
    for i in 6..FRAMES {
        assert_abs_diff_eq!(out[i], 0.5 * ir[i - 6], epsilon = 1e-6);
    }
}

#[test]
fn test_matches_full_convolution_over_many_blocks() {
    const BLOCKS: usize = 12;
    const IR_LEN: usize = 150;
    const OUTPUTS: usize = 3;

    let signal: Vec<f32> = (0..FRAMES * BLOCKS)
        .map(|i| ((i * 37 % 101) as f32 / 101.0 - 0.5) * 0.05)
        .collect();

    let mut io = engine(OUTPUTS as i32, 0, 1);
    io.set_clip_out(false);

    let source = signal.clone();
    let mut cursor = 0;
    io.append(Box::new(move |b: &mut AudioBuffers| {
        let frames = b.frames_per_buffer();
        b.bus_mut(0).copy_from_slice(&source[cursor..cursor + frames]);
        cursor += frames;
    }))
    .unwrap();

    let mut bank = Decorrelation::new(IR_LEN, 0, OUTPUTS, Some(77));
    bank.configure(&io, 0, true);
    let irs: Vec<Vec<f32>> = (0..OUTPUTS).map(|c| bank.ir(c).unwrap().to_vec()).collect();
    io.append(Box::new(bank)).unwrap();

    let mut rendered = vec![Vec::new(); OUTPUTS];
    let mut block = vec![0.0f32; FRAMES * OUTPUTS];
    for _ in 0..BLOCKS {
        io.process_block(&[], &mut block).unwrap();
        for frame in block.chunks_exact(OUTPUTS) {
            for (c, &s) in frame.iter().enumerate() {
                rendered[c].push(s);
            }
        }
    }

    for c in 0..OUTPUTS {
        let expected = convolve_full(&signal, &irs[c]);
        for (i, (&got, &want)) in rendered[c].iter().zip(&expected).enumerate() {
            assert!((got - want).abs() <= 1e-6, "output {c}, sample {i}: {got} vs {want}");
        }
    }
}

#[test]
fn test_output_is_accumulated() {
    let mut io = engine(1, 0, 1);
    io.append(Box::new(|b: &mut AudioBuffers| b.output_mut(0).fill(0.25))).unwrap();

    let mut bank = Decorrelation::new(32, 0, 1, Some(1));
    bank.configure(&io, 0, true);
    let ir = bank.ir(0).unwrap().to_vec();
    io.append(Box::new(bank)).unwrap();

    io.buffers_mut().unwrap().bus_mut(0)[0] = 1.0;
    io.process_audio().unwrap();

    let out = io.buffers().unwrap().output(0);
    for i in 0..32 {
        assert_abs_diff_eq!(out[i], 0.25 + ir[i], epsilon = 1e-6);
    }
    assert_eq!(out[40], 0.25);
}

#[test]
fn test_first_output_offset() {
    let mut io = engine(4, 0, 1);
    let mut bank = Decorrelation::new(32, 0, 2, Some(9));
    bank.configure(&io, 2, true);
    let irs = [bank.ir(0).unwrap().to_vec(), bank.ir(1).unwrap().to_vec()];
    io.append(Box::new(bank)).unwrap();

    io.buffers_mut().unwrap().bus_mut(0)[0] = 1.0;
    io.process_audio().unwrap();

    let buffers = io.buffers().unwrap();
    assert!(buffers.output(0).iter().all(|&s| s == 0.0));
    assert!(buffers.output(1).iter().all(|&s| s == 0.0));
    assert_eq!(&buffers.output(2)[..32], irs[0].as_slice());
    assert_eq!(&buffers.output(3)[..32], irs[1].as_slice());
}

#[test]
fn test_reads_device_input() {
    let mut io = engine(2, 1, 0);
    let mut bank = Decorrelation::new(16, 0, 2, Some(4));
    bank.configure(&io, 0, false);
    let irs = [bank.ir(0).unwrap().to_vec(), bank.ir(1).unwrap().to_vec()];
    io.append(Box::new(bank)).unwrap();
    io.set_clip_out(false);

    let mut input = vec![0.0f32; FRAMES];
    input[0] = 1.0;
    let mut output = vec![0.0f32; FRAMES * 2];
    io.process_block(&input, &mut output).unwrap();

    for i in 0..16 {
        assert_abs_diff_eq!(output[i * 2], irs[0][i], epsilon = 1e-6);
        assert_abs_diff_eq!(output[i * 2 + 1], irs[1][i], epsilon = 1e-6);
    }
}

#[test]
fn test_same_seed_same_filters() {
    let a = Decorrelation::new(256, 0, 4, Some(1234));
    let b = Decorrelation::new(256, 0, 4, Some(1234));
    for c in 0..4 {
        let (x, y) = (a.ir(c).unwrap(), b.ir(c).unwrap());
        for (&p, &q) in x.iter().zip(y) {
            assert_abs_diff_eq!(p, q, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_channels_are_decorrelated() {
    let bank = Decorrelation::new(1024, 0, 8, Some(1001));
    for i in 0..8 {
        for j in (i + 1)..8 {
            let (a, b) = (bank.ir(i).unwrap(), bank.ir(j).unwrap());
            assert_ne!(a, b);
            let r = correlation(a, b);
            assert!(r.abs() < 0.25, "channels {i} and {j} correlate at {r}");
        }
    }
}

#[test]
fn test_every_channel_has_unit_energy() {
    let bank = Decorrelation::new(512, 0, 6, Some(55));
    for c in 0..6 {
        assert_abs_diff_eq!(energy(bank.ir(c).unwrap()), 1.0, epsilon = 1e-4);
    }
}

#[test]
fn test_reset_silences_tail() {
    let mut io = engine(1, 0, 1);
    let mut bank = Decorrelation::new(128, 0, 1, Some(3));
    bank.configure(&io, 0, true);

    // Ring the bank, then reset it before the tail is emitted
    {
        let buffers = io.buffers_mut().unwrap();
        buffers.bus_mut(0)[FRAMES - 1] = 1.0;
        bank.process(buffers);
        buffers.zero_output();
        buffers.zero_bus();
    }
    bank.reset();
    io.append(Box::new(bank)).unwrap();
    io.process_audio().unwrap();

    assert!(io.buffers().unwrap().output(0).iter().all(|&s| s == 0.0));
}

#[test]
fn test_registered_bank_reseeds_while_stopped() {
    let mut io = engine(1, 0, 1);
    io.set_clip_out(false);
    let mut bank = Decorrelation::new(32, 0, 1, Some(10));
    bank.configure(&io, 0, true);
    let id = io.append(Box::new(bank)).unwrap();

    io.start().unwrap();
    assert!(matches!(
        io.stage_mut::<Decorrelation>(id),
        Err(Error::StreamActive { .. })
    ));
    io.stop().unwrap();

    let ir = {
        let bank = io.stage_mut::<Decorrelation>(id).unwrap().unwrap();
        assert_eq!(bank.current_seed(), 10);
        bank.reseed(11);
        bank.ir(0).unwrap().to_vec()
    };
    assert_eq!(Decorrelation::new(32, 0, 1, Some(11)).ir(0).unwrap(), ir.as_slice());

    io.buffers_mut().unwrap().bus_mut(0)[0] = 1.0;
    io.process_audio().unwrap();
    assert_eq!(&io.buffers().unwrap().output(0)[..32], ir.as_slice());
}
