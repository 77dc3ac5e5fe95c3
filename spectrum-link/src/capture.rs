//! Audio capture adapter.
//!
//! Backends deliver interleaved buffers of whatever size they like. The
//! adapter keeps the first channel only and re-chunks it into exact
//! `block_size` sample blocks before handing them to the pipeline, all on
//! the backend's capture thread.

use std::sync::mpsc::Sender;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SupportedBufferSize, SupportedStreamConfig};
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::{LinkError, Result};

/// Called once per complete sample block on the capture thread.
pub type BlockHandler = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Out-of-band reports from the capture backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Backend status such as an overflow. The stream keeps running.
    Warning(String),
    /// The device is gone. Streaming must stop.
    Fatal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureParams {
    pub sample_rate: u32,
    pub channels: u16,
    pub block_size: usize,
    pub device: Option<String>,
}

impl CaptureParams {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: 1,
            block_size: config.block_size,
            device: config.device.clone(),
        }
    }
}

/// A running capture stream.
pub trait CaptureStream {
    /// Stop delivering blocks and release the device. Later calls are no-ops.
    fn close(&mut self) -> Result<()>;
}

/// Something that can open a block-delivering capture stream.
pub trait CaptureDevice {
    type Stream: CaptureStream;

    fn open(
        &self,
        params: &CaptureParams,
        on_block: BlockHandler,
        events: Sender<CaptureEvent>,
    ) -> Result<Self::Stream>;
}

/// Collects the first channel of interleaved frames into fixed-size blocks.
pub struct BlockAssembler {
    block: Vec<f32>,
    filled: usize,
    channels: usize,
    pcm: Vec<f32>,
}

impl BlockAssembler {
    pub fn new(block_size: usize, channels: usize) -> Self {
        Self {
            block: vec![0.0; block_size],
            filled: 0,
            channels: channels.max(1),
            pcm: Vec::new(),
        }
    }

    /// Feed interleaved 16-bit PCM, normalized to `[-1.0, 1.0]`.
    pub fn push_pcm(&mut self, data: &[i16], emit: impl FnMut(&[f32])) {
        let mut pcm = std::mem::take(&mut self.pcm);
        pcm.resize(data.len(), 0.0);
        spectrum_dsp::normalize_samples(data, &mut pcm);
        self.push_interleaved(&pcm, |s| s, emit);
        self.pcm = pcm;
    }

    /// Feed interleaved samples, calling `emit` for every completed block.
    ///
    /// A trailing partial frame is ignored.
    pub fn push_interleaved<T: Copy>(
        &mut self,
        data: &[T],
        convert: impl Fn(T) -> f32,
        mut emit: impl FnMut(&[f32]),
    ) {
        for frame in data.chunks_exact(self.channels) {
            self.block[self.filled] = convert(frame[0]);
            self.filled += 1;

            if self.filled == self.block.len() {
                emit(&self.block);
                self.filled = 0;
            }
        }
    }

    /// Samples waiting for the current block to complete.
    pub fn pending(&self) -> usize {
        self.filled
    }
}

/// Sample formats the capture path accepts.
pub trait CaptureSample: cpal::SizedSample + Send + 'static {
    fn feed(assembler: &mut BlockAssembler, data: &[Self], emit: impl FnMut(&[f32]));
}

impl CaptureSample for f32 {
    fn feed(assembler: &mut BlockAssembler, data: &[f32], emit: impl FnMut(&[f32])) {
        assembler.push_interleaved(data, |s| s, emit);
    }
}

impl CaptureSample for i16 {
    fn feed(assembler: &mut BlockAssembler, data: &[i16], emit: impl FnMut(&[f32])) {
        assembler.push_pcm(data, emit);
    }
}

/// Capture from a `cpal` input device.
#[derive(Debug, Default, Clone)]
pub struct CpalCapture;

impl CpalCapture {
    pub fn new() -> Self {
        Self
    }

    fn select_device(name: Option<&str>) -> Result<Device> {
        let host = cpal::default_host();
        match name {
            None => host
                .default_input_device()
                .ok_or_else(|| LinkError::Device("no default input device found".to_string())),
            Some(wanted) => {
                let devices = host
                    .input_devices()
                    .map_err(|e| LinkError::Device(format!("cannot list input devices: {}", e)))?;
                for device in devices {
                    if device.name().map(|n| n == wanted).unwrap_or(false) {
                        return Ok(device);
                    }
                }
                Err(LinkError::Device(format!("input device '{}' not found", wanted)))
            }
        }
    }

    /// Pick the config with the fewest channels that supports the sample
    /// rate, preferring f32 samples.
    fn select_config(device: &Device, params: &CaptureParams) -> Result<SupportedStreamConfig> {
        let configs = device
            .supported_input_configs()
            .map_err(|e| LinkError::Device(format!("cannot query input configs: {}", e)))?;

        let best = configs
            .filter(|c| {
                c.min_sample_rate().0 <= params.sample_rate
                    && c.max_sample_rate().0 >= params.sample_rate
                    && matches!(c.sample_format(), SampleFormat::F32 | SampleFormat::I16)
            })
            .min_by_key(|c| (c.channels(), c.sample_format() != SampleFormat::F32))
            .ok_or_else(|| {
                LinkError::Device(format!(
                    "no input config supports {} Hz",
                    params.sample_rate
                ))
            })?;

        Ok(best.with_sample_rate(cpal::SampleRate(params.sample_rate)))
    }

    fn buffer_size(supported: &SupportedStreamConfig, block_size: usize) -> cpal::BufferSize {
        let frames = block_size as u32;
        match supported.buffer_size() {
            SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames) => {
                cpal::BufferSize::Fixed(frames)
            }
            SupportedBufferSize::Range { min, max } => {
                debug!(
                    "Block size {} outside backend range {}..={}, using default buffer",
                    frames, min, max
                );
                cpal::BufferSize::Default
            }
            SupportedBufferSize::Unknown => cpal::BufferSize::Default,
        }
    }

    fn build_stream<T: CaptureSample>(
        device: &Device,
        config: &cpal::StreamConfig,
        block_size: usize,
        mut on_block: BlockHandler,
        events: Sender<CaptureEvent>,
    ) -> Result<cpal::Stream> {
        let mut assembler = BlockAssembler::new(block_size, config.channels as usize);

        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    T::feed(&mut assembler, data, |block| on_block(block));
                },
                move |err| {
                    let _ = events.send(classify_stream_error(err));
                },
                None,
            )
            .map_err(|e| LinkError::Device(format!("failed to build input stream: {}", e)))
    }
}

fn classify_stream_error(err: cpal::StreamError) -> CaptureEvent {
    match err {
        cpal::StreamError::DeviceNotAvailable => {
            CaptureEvent::Fatal("input device no longer available".to_string())
        }
        other => CaptureEvent::Warning(other.to_string()),
    }
}

impl CaptureDevice for CpalCapture {
    type Stream = CpalStream;

    fn open(
        &self,
        params: &CaptureParams,
        on_block: BlockHandler,
        events: Sender<CaptureEvent>,
    ) -> Result<CpalStream> {
        let device = Self::select_device(params.device.as_deref())?;
        let supported = Self::select_config(&device, params)?;
        let sample_format = supported.sample_format();

        let mut config: cpal::StreamConfig = supported.config();
        config.buffer_size = Self::buffer_size(&supported, params.block_size);

        info!(
            "Capture: {} @ {} Hz, {} channel(s), {:?}, buffer {:?}",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate.0,
            config.channels,
            sample_format,
            config.buffer_size
        );
        if config.channels > params.channels {
            debug!("Using channel 0 of {}", config.channels);
        }

        let stream = match sample_format {
            SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config, params.block_size, on_block, events)?
            }
            SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config, params.block_size, on_block, events)?
            }
            other => {
                return Err(LinkError::Device(format!(
                    "unsupported sample format: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| LinkError::Device(format!("failed to start input stream: {}", e)))?;

        Ok(CpalStream {
            stream: Some(stream),
        })
    }
}

/// Handle on a playing `cpal` input stream.
pub struct CpalStream {
    stream: Option<cpal::Stream>,
}

impl CaptureStream for CpalStream {
    fn close(&mut self) -> Result<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        let paused = stream.pause();
        // Dropping the stream joins the backend's capture thread
        drop(stream);
        if let Err(e) = paused {
            warn!("Input stream did not pause cleanly: {}", e);
        }
        Ok(())
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
