//! decorrelate - spread a noise burst across every output
//!
//! Run with: cargo run --bin decorrelate [seconds] [ir_len]
//!
//! Feeds periodic noise bursts into bus 0 and decorrelates the bus across
//! all device outputs. Each speaker plays the same burst through a different
//! all-pass filter, so the sound fills the room instead of sitting in one
//! speaker. Logs at info level by default; override with RUST_LOG.

use std::thread;
use std::time::{Duration, Instant};

use color_eyre::eyre::{eyre, WrapErr};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use saavy_decorr::{AudioBuffers, AudioIo, Decorrelation, Direction, IoConfig, ALL_CHANNELS};

const DEFAULT_SECONDS: u64 = 6;
const DEFAULT_IR_LEN: usize = 1024;

/// Burst on-time and period, in seconds.
const BURST_ON: f64 = 0.25;
const BURST_PERIOD: f64 = 1.0;
const BURST_LEVEL: f32 = 0.2;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let seconds = match args.next() {
        Some(s) => s.parse().wrap_err("seconds must be a whole number")?,
        None => DEFAULT_SECONDS,
    };
    let ir_len = match args.next() {
        Some(s) => s.parse().wrap_err("ir_len must be a whole number")?,
        None => DEFAULT_IR_LEN,
    };

    let config = IoConfig::default()
        .frames_per_buffer(256)
        .channels(ALL_CHANNELS, 0)
        .bus_channels(1);
    let mut io = AudioIo::new(config).wrap_err("failed to create audio engine")?;
    if io.channels_out() == 0 {
        return Err(eyre!("default device has no output channels"));
    }
    // Run at the device's own rate
    let native = io.device(Direction::Output).default_sample_rate;
    if native > 0.0 {
        io.set_sample_rate(native)?;
    }

    let sample_rate = io.sample_rate();
    let outputs = io.channels_out();
    println!("=== decorrelate ===");
    println!("Device: {}", io.device(Direction::Output).name);
    println!("Sample rate: {} Hz", sample_rate);
    println!("Outputs: {}", outputs);
    println!("IR length: {} taps", ir_len);

    // Noise bursts into bus 0
    let mut rng = StdRng::seed_from_u64(7);
    let on_frames = (BURST_ON * sample_rate) as u64;
    let period_frames = (BURST_PERIOD * sample_rate) as u64;
    let mut frame = 0u64;
    io.append(Box::new(move |b: &mut AudioBuffers| {
        for s in b.bus_mut(0).iter_mut() {
            *s = if frame % period_frames < on_frames {
                rng.gen_range(-BURST_LEVEL..BURST_LEVEL)
            } else {
                0.0
            };
            frame += 1;
        }
    }))?;

    let mut bank = Decorrelation::new(ir_len, 0, outputs, None);
    bank.configure(&io, 0, true);
    println!("Seed: {}", bank.current_seed());
    io.append(Box::new(bank))?;

    io.start().wrap_err("failed to start audio stream")?;
    println!("Playing for {seconds} s...");

    let started = Instant::now();
    while started.elapsed() < Duration::from_secs(seconds) {
        thread::sleep(Duration::from_millis(500));
        info!("cpu load {:.1}%", io.cpu_load() * 100.0);
    }

    io.stop()?;
    println!("Average CPU load at stop: {:.1}%", io.cpu_load() * 100.0);
    Ok(())
}
