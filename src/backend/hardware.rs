//! cpal-backed device backend.

/*
Callback Ownership
==================

While a stream runs, the cpal callback is the only thing that touches the
Processor. There is no lock: the processor is moved into the callback closure
on `start` and moved back on `stop`.

    control thread                         audio thread
    ──────────────                         ────────────
    start: slot.take() ──── move ────────► CallbackState { processor }
                                                │ every block: process
    stop:  drop(stream) ─────────────────► drop(CallbackState)
           returns.pop() ◄─── rtrb push ───── Drop pushes processor home

Dropping the stream drops the closure, and CallbackState's Drop impl pushes
the processor into a one-slot ring the control side is waiting on. A failed
`build_output_stream` drops the closure too, so the processor comes home on
every path.

Block Size
----------

cpal picks its own callback length, which rarely equals frames_per_buffer.
The callback keeps one rendered interleaved block pending and copies out of
it, rendering a new block whenever it runs dry. The processor therefore
always sees exactly frames_per_buffer frames.

Input arrives on a separate cpal stream and is handed over through an rtrb
ring. Missing input reads as silence.
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use log::{debug, error, info, warn};
use rtrb::{Consumer, Producer, RingBuffer};

use super::{resolve_channel_request, Backend, BackendKind, Direction, ProcessorSlot};
use crate::device::DeviceInfo;
use crate::io::Processor;
use crate::{Error, Result};

const RETURN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How long a stream may take to hand the processor back before it is logged.
const SLOW_RETURN: Duration = Duration::from_secs(1);

/// Blocks of input buffered between the input and output callbacks.
const INPUT_RING_BLOCKS: usize = 4;

/// Smoothing factor for the CPU load moving average.
const LOAD_SMOOTHING: f64 = 0.1;

/// Backend for the host's default input and output devices.
pub struct HardwareBackend {
    host: cpal::Host,
    output_device: Option<cpal::Device>,
    input_device: Option<cpal::Device>,
    output_info: DeviceInfo,
    input_info: DeviceInfo,
    out_channels: usize,
    in_channels: usize,
    open: bool,
    stream: Option<ActiveStream>,
    cpu_load: Arc<AtomicU64>,
}

struct ActiveStream {
    output: cpal::Stream,
    _input: Option<cpal::Stream>,
    returns: Consumer<Box<Processor>>,
}

impl HardwareBackend {
    /// Acquire the default host and its default devices.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let output_device = host.default_output_device();
        let input_device = host.default_input_device();

        if output_device.is_none() && input_device.is_none() {
            error!("no audio devices on host {:?}", host.id());
            return Err(Error::DeviceUnavailable);
        }

        let output_info = output_device
            .as_ref()
            .map(|d| describe(d, Direction::Output))
            .unwrap_or_else(DeviceInfo::none);
        let input_info = input_device
            .as_ref()
            .map(|d| describe(d, Direction::Input))
            .unwrap_or_else(DeviceInfo::none);

        info!(
            "hardware backend: output '{}' ({} ch), input '{}' ({} ch)",
            output_info.name, output_info.max_output_channels, input_info.name, input_info.max_input_channels
        );

        Ok(Self {
            host,
            out_channels: output_info.max_output_channels.min(2),
            in_channels: 0,
            output_device,
            input_device,
            output_info,
            input_info,
            open: false,
            stream: None,
            cpu_load: Arc::new(AtomicU64::new(0f64.to_bits())),
        })
    }

    pub fn host_id(&self) -> cpal::HostId {
        self.host.id()
    }

    fn build_output(&self, sample_rate: f64, state: CallbackState) -> Result<cpal::Stream> {
        let device = self.output_device.as_ref().ok_or(Error::DeviceUnavailable)?;
        let config = cpal::StreamConfig {
            channels: self.out_channels as u16,
            sample_rate: cpal::SampleRate(sample_rate as u32),
            buffer_size: cpal::BufferSize::Default,
        };

        match device.default_output_config()?.sample_format() {
            SampleFormat::F32 => output_stream::<f32>(device, &config, state),
            SampleFormat::I16 => output_stream::<i16>(device, &config, state),
            SampleFormat::U16 => output_stream::<u16>(device, &config, state),
            format => Err(Error::Backend(format!("unsupported output sample format: {format:?}"))),
        }
    }

    #[allow(clippy::type_complexity)]
    fn build_input(
        &self,
        sample_rate: f64,
        frames_per_buffer: usize,
    ) -> Result<(Option<cpal::Stream>, Option<Consumer<f32>>)> {
        if self.in_channels == 0 {
            return Ok((None, None));
        }
        let device = self.input_device.as_ref().ok_or(Error::DeviceUnavailable)?;
        let config = cpal::StreamConfig {
            channels: self.in_channels as u16,
            sample_rate: cpal::SampleRate(sample_rate as u32),
            buffer_size: cpal::BufferSize::Default,
        };
        let (tx, rx) = RingBuffer::<f32>::new(frames_per_buffer * self.in_channels * INPUT_RING_BLOCKS);

        let stream = match device.default_input_config()?.sample_format() {
            SampleFormat::F32 => input_stream::<f32>(device, &config, tx)?,
            SampleFormat::I16 => input_stream::<i16>(device, &config, tx)?,
            SampleFormat::U16 => input_stream::<u16>(device, &config, tx)?,
            format => return Err(Error::Backend(format!("unsupported input sample format: {format:?}"))),
        };
        Ok((Some(stream), Some(rx)))
    }

    fn max_channels(&self, direction: Direction) -> usize {
        match direction {
            Direction::Input => self.input_info.max_input_channels,
            Direction::Output => self.output_info.max_output_channels,
        }
    }
}

impl Backend for HardwareBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Hardware
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    fn open(&mut self, sample_rate: f64, frames_per_buffer: usize) -> Result<()> {
        if self.output_device.is_none() {
            return Err(Error::DeviceUnavailable);
        }
        if !self.supports_sample_rate(sample_rate) {
            return Err(Error::UnsupportedSampleRate(sample_rate));
        }
        debug!(
            "hardware backend open: {sample_rate} Hz, {frames_per_buffer} frames, {} out / {} in",
            self.out_channels, self.in_channels
        );
        self.open = true;
        Ok(())
    }

    fn start(&mut self, sample_rate: f64, frames_per_buffer: usize, slot: &mut ProcessorSlot) -> Result<()> {
        let opened_here = !self.open;
        if opened_here {
            self.open(sample_rate, frames_per_buffer)?;
        }
        if self.out_channels == 0 {
            if opened_here {
                self.open = false;
            }
            return Err(Error::Backend("no output channels configured".to_string()));
        }
        let Some(processor) = slot.take() else {
            if opened_here {
                self.open = false;
            }
            return Err(Error::Backend("no processor to run".to_string()));
        };

        let (home, mut returns) = RingBuffer::<Box<Processor>>::new(1);
        let result = self.launch(sample_rate, frames_per_buffer, processor, home);
        match result {
            Ok((output, input)) => {
                self.stream = Some(ActiveStream {
                    output,
                    _input: input,
                    returns,
                });
                info!("audio stream started");
                Ok(())
            }
            Err(e) => {
                *slot = Some(wait_for_return(&mut returns));
                if opened_here {
                    self.open = false;
                }
                Err(e)
            }
        }
    }

    fn stop(&mut self, slot: &mut ProcessorSlot) -> Result<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        let ActiveStream {
            output,
            _input: input,
            mut returns,
        } = stream;
        if let Err(e) = output.pause() {
            warn!("failed to pause output stream: {e}");
        }
        drop(input);
        drop(output);

        // Every path that drops CallbackState pushes the processor home, so
        // this always ends
        *slot = Some(wait_for_return(&mut returns));
        info!("audio stream stopped");
        Ok(())
    }

    fn close(&mut self, slot: &mut ProcessorSlot) -> Result<()> {
        self.stop(slot)?;
        self.open = false;
        Ok(())
    }

    fn configure_channels(&mut self, count: i32, direction: Direction) {
        if self.open {
            warn!("cannot change {} channels while the stream is open", direction.label());
            return;
        }
        let max = self.max_channels(direction);
        if max == 0 {
            warn!("device has no {} channels, ignoring request for {count}", direction.label());
            return;
        }
        let granted = resolve_channel_request(count, max);
        if count >= 0 && granted < count as usize {
            warn!(
                "{} channel request {count} clamped to device maximum {max}",
                direction.label()
            );
        }
        match direction {
            Direction::Input => self.in_channels = granted,
            Direction::Output => self.out_channels = granted,
        }
    }

    fn device_channels(&self, direction: Direction) -> usize {
        match direction {
            Direction::Input => self.in_channels,
            Direction::Output => self.out_channels,
        }
    }

    fn device(&self, direction: Direction) -> DeviceInfo {
        match direction {
            Direction::Input => self.input_info.clone(),
            Direction::Output => self.output_info.clone(),
        }
    }

    fn supports_sample_rate(&self, sample_rate: f64) -> bool {
        let Some(device) = self.output_device.as_ref() else {
            return false;
        };
        let rate = sample_rate as u32;
        match device.supported_output_configs() {
            Ok(mut configs) => configs.any(|c| c.min_sample_rate().0 <= rate && rate <= c.max_sample_rate().0),
            Err(e) => {
                warn!("failed to query supported output configs: {e}");
                false
            }
        }
    }

    fn cpu_load(&self) -> f64 {
        f64::from_bits(self.cpu_load.load(Ordering::Relaxed))
    }
}

impl HardwareBackend {
    fn launch(
        &self,
        sample_rate: f64,
        frames_per_buffer: usize,
        processor: Box<Processor>,
        home: Producer<Box<Processor>>,
    ) -> Result<(cpal::Stream, Option<cpal::Stream>)> {
        let (input, input_rx) = match self.build_input(sample_rate, frames_per_buffer) {
            Ok(pair) => pair,
            Err(e) => {
                // Never reached the callback: dropping the state sends it home
                drop(CallbackState::new(
                    processor,
                    home,
                    None,
                    0,
                    0,
                    frames_per_buffer,
                    sample_rate,
                    self.cpu_load.clone(),
                ));
                return Err(e);
            }
        };

        let mut processor = processor;
        processor.set_device_channels(self.in_channels, self.out_channels);
        let state = CallbackState::new(
            processor,
            home,
            input_rx,
            self.in_channels,
            self.out_channels,
            frames_per_buffer,
            sample_rate,
            self.cpu_load.clone(),
        );

        let output = self.build_output(sample_rate, state)?;
        output.play()?;
        if let Some(input) = input.as_ref() {
            input.play()?;
        }
        Ok((output, input))
    }
}

/// Everything the output callback owns.
struct CallbackState {
    processor: Option<Box<Processor>>,
    home: Producer<Box<Processor>>,
    input_rx: Option<Consumer<f32>>,
    input_block: Vec<f32>,
    pending: Vec<f32>,
    cursor: usize,
    block_period: f64,
    load: Arc<AtomicU64>,
}

impl CallbackState {
    #[allow(clippy::too_many_arguments)]
    fn new(
        processor: Box<Processor>,
        home: Producer<Box<Processor>>,
        input_rx: Option<Consumer<f32>>,
        in_channels: usize,
        out_channels: usize,
        frames_per_buffer: usize,
        sample_rate: f64,
        load: Arc<AtomicU64>,
    ) -> Self {
        let pending = vec![0.0; frames_per_buffer * out_channels];
        Self {
            processor: Some(processor),
            home,
            input_rx,
            input_block: vec![0.0; frames_per_buffer * in_channels],
            cursor: pending.len(),
            pending,
            block_period: frames_per_buffer as f64 / sample_rate,
            load,
        }
    }

    fn render(&mut self) {
        let Some(processor) = self.processor.as_mut() else {
            self.pending.fill(0.0);
            return;
        };
        let started = Instant::now();

        match self.input_rx.as_mut() {
            Some(rx) => {
                for sample in self.input_block.iter_mut() {
                    *sample = rx.pop().unwrap_or(0.0);
                }
            }
            None => self.input_block.fill(0.0),
        }
        processor.process_interleaved(&self.input_block, &mut self.pending);

        let load = started.elapsed().as_secs_f64() / self.block_period;
        let previous = f64::from_bits(self.load.load(Ordering::Relaxed));
        let smoothed = previous + LOAD_SMOOTHING * (load - previous);
        self.load.store(smoothed.to_bits(), Ordering::Relaxed);
    }

    fn fill<T>(&mut self, data: &mut [T])
    where
        T: SizedSample + FromSample<f32>,
    {
        if self.pending.is_empty() {
            data.fill(T::EQUILIBRIUM);
            return;
        }
        let mut written = 0;
        while written < data.len() {
            if self.cursor == self.pending.len() {
                self.render();
                self.cursor = 0;
            }
            let n = (data.len() - written).min(self.pending.len() - self.cursor);
            for (d, &s) in data[written..written + n]
                .iter_mut()
                .zip(&self.pending[self.cursor..self.cursor + n])
            {
                *d = T::from_sample(s);
            }
            written += n;
            self.cursor += n;
        }
    }
}

impl Drop for CallbackState {
    fn drop(&mut self) {
        if let Some(processor) = self.processor.take() {
            let _ = self.home.push(processor);
        }
    }
}

fn output_stream<T>(device: &cpal::Device, config: &cpal::StreamConfig, mut state: CallbackState) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| state.fill(data)));
            if result.is_err() {
                data.fill(T::EQUILIBRIUM);
            }
        },
        |err| error!("audio output stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

fn input_stream<T>(device: &cpal::Device, config: &cpal::StreamConfig, mut tx: Producer<f32>) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for &sample in data {
                // Full ring: the output side is behind, drop the newest input
                if tx.push(sample.to_sample::<f32>()).is_err() {
                    break;
                }
            }
        },
        |err| error!("audio input stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

fn wait_for_return<T>(returns: &mut Consumer<T>) -> T {
    let started = Instant::now();
    let mut warned = false;
    loop {
        if let Ok(item) = returns.pop() {
            return item;
        }
        if !warned && started.elapsed() >= SLOW_RETURN {
            warn!("still waiting for the audio callback to release the processor");
            warned = true;
        }
        thread::sleep(RETURN_POLL_INTERVAL);
    }
}

/// Capability record for one cpal device.
fn describe(device: &cpal::Device, direction: Direction) -> DeviceInfo {
    let name = device.name().unwrap_or_else(|e| {
        warn!("failed to read device name: {e}");
        "unknown".to_string()
    });

    let (max_channels, default_rate) = match direction {
        Direction::Output => (
            device
                .supported_output_configs()
                .map(|configs| configs.map(|c| c.channels() as usize).max().unwrap_or(0))
                .unwrap_or(0),
            device
                .default_output_config()
                .map(|c| c.sample_rate().0 as f64)
                .unwrap_or(0.0),
        ),
        Direction::Input => (
            device
                .supported_input_configs()
                .map(|configs| configs.map(|c| c.channels() as usize).max().unwrap_or(0))
                .unwrap_or(0),
            device
                .default_input_config()
                .map(|c| c.sample_rate().0 as f64)
                .unwrap_or(0.0),
        ),
    };

    match direction {
        Direction::Output => DeviceInfo::new(0, name, 0, max_channels, default_rate),
        Direction::Input => DeviceInfo::new(1, name, max_channels, 0, default_rate),
    }
}
