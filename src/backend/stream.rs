use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::{
    AudioBackend, BackendCallback, BackendError, BufferAttributes, MAX_BLOCK_FRAMES, MAX_CHANNELS,
};
use crate::dsp;

/// Cooperative, event-driven backend: the audio service wakes its own thread
/// and pulls a buffer's worth of samples from us whenever the device needs a
/// refill.
///
/// The callback lives behind a mutex shared with the stream thread. The
/// render path only ever *tries* the lock; `start`/`stop` take it for real,
/// which is what guarantees lifecycle calls never overlap a render.
pub struct StreamBackend {
    callback: Arc<Mutex<Box<dyn BackendCallback>>>,
    active: Arc<AtomicBool>,
    stream: Option<cpal::Stream>,
    attrs: BufferAttributes,
}

impl StreamBackend {
    pub fn new(callback: Box<dyn BackendCallback>) -> Self {
        Self {
            callback: Arc::new(Mutex::new(callback)),
            active: Arc::new(AtomicBool::new(false)),
            stream: None,
            attrs: BufferAttributes {
                sample_rate: 0.0,
                channels: 0,
                buffer_frames: 0,
            },
        }
    }

    fn build_stream(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        channels: usize,
    ) -> Result<cpal::Stream, cpal::BuildStreamError> {
        let callback = Arc::clone(&self.callback);
        let active = Arc::clone(&self.active);
        // Planar working buffers for the engine; interleaving happens last.
        let mut planar = [[0.0f32; MAX_BLOCK_FRAMES]; MAX_CHANNELS];

        device.build_output_stream(
            config,
            move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                render_block(&callback, &active, &mut planar, data, channels, info);
            },
            |err| eprintln!("audio stream error: {err}"),
            None,
        )
    }
}

impl AudioBackend for StreamBackend {
    fn init(&mut self, _sample_rate: f32, channels: usize) -> Result<(), BackendError> {
        if self.stream.is_some() {
            return Err(BackendError::AlreadyInitialized);
        }
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(BackendError::Negotiation(format!(
                "unsupported channel count {channels}"
            )));
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| BackendError::Negotiation("no default output device".into()))?;

        let supported = device.default_output_config()?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(BackendError::Negotiation(format!(
                "device sample format is {:?}, need f32",
                supported.sample_format()
            )));
        }

        let mut config: cpal::StreamConfig = supported.into();
        config.channels = channels as u16;
        let sample_rate = config.sample_rate as f32;
        let buffer_frames = BufferAttributes::latency_frames(sample_rate);
        config.buffer_size = cpal::BufferSize::Fixed(buffer_frames as u32);

        // The service is free to reject the requested buffering; fall back
        // to whatever it prefers rather than failing negotiation outright.
        let stream = match self.build_stream(&device, &config, channels) {
            Ok(stream) => stream,
            Err(_) => {
                config.buffer_size = cpal::BufferSize::Default;
                self.build_stream(&device, &config, channels)?
            }
        };

        // Corked until start().
        stream.pause()?;

        match self.callback.lock() {
            Ok(mut cb) => cb.set_backend_parameters(sample_rate, channels, MAX_BLOCK_FRAMES),
            Err(_) => return Err(BackendError::Device("callback mutex poisoned".into())),
        }

        self.attrs = BufferAttributes {
            sample_rate,
            channels,
            buffer_frames,
        };
        self.stream = Some(stream);
        Ok(())
    }

    fn start(&mut self) -> Result<(), BackendError> {
        let stream = self.stream.as_ref().ok_or(BackendError::NotInitialized)?;
        if self.active.load(Ordering::Acquire) {
            return Err(BackendError::AlreadyStarted);
        }

        // Holding the lock keeps the render callback away while the engine
        // resets its state.
        match self.callback.lock() {
            Ok(mut cb) => cb.on_backend_start(),
            Err(_) => return Err(BackendError::Device("callback mutex poisoned".into())),
        }
        self.active.store(true, Ordering::Release);

        // Uncork. play() returns once the service has acknowledged.
        if let Err(err) = stream.play() {
            self.active.store(false, Ordering::Release);
            return Err(err.into());
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        let stream = self.stream.as_ref().ok_or(BackendError::NotInitialized)?;
        if !self.active.load(Ordering::Acquire) {
            return Err(BackendError::NotStarted);
        }

        // Cork first; only notify the engine once the output path is muted.
        stream.pause()?;
        self.active.store(false, Ordering::Release);

        match self.callback.lock() {
            Ok(mut cb) => cb.on_backend_stop(),
            Err(_) => return Err(BackendError::Device("callback mutex poisoned".into())),
        }
        Ok(())
    }

    fn sample_rate(&self) -> f32 {
        self.attrs.sample_rate
    }

    fn num_channels(&self) -> usize {
        self.attrs.channels
    }
}

/// One device callback: render the requested frames in bounded sub-blocks,
/// interleave, and report latency. Any fault degrades to silence; there is
/// no recovery path inside a device callback.
fn render_block(
    callback: &Mutex<Box<dyn BackendCallback>>,
    active: &AtomicBool,
    planar: &mut [[f32; MAX_BLOCK_FRAMES]; MAX_CHANNELS],
    data: &mut [f32],
    channels: usize,
    info: &cpal::OutputCallbackInfo,
) {
    if !active.load(Ordering::Acquire) {
        data.fill(0.0);
        return;
    }

    // start()/stop() own the lock during transitions; contention means a
    // transition is in flight, so this cycle plays silence.
    let Ok(mut cb) = callback.try_lock() else {
        data.fill(0.0);
        return;
    };

    let mut frames = data.len() / channels;
    let mut offset = 0;
    let (left, right) = planar.split_at_mut(1);
    while frames != 0 {
        let block = frames.min(MAX_BLOCK_FRAMES);
        cb.mix_samples(&mut left[0][..block], &mut right[0][..block]);

        if channels == 2 {
            dsp::interleave_stereo(
                &mut data[offset..offset + block * 2],
                &left[0][..block],
                &right[0][..block],
            );
        } else {
            data[offset..offset + block].copy_from_slice(&left[0][..block]);
        }

        offset += block * channels;
        frames -= block;
    }

    let timestamp = info.timestamp();
    if let Some(latency) = timestamp.playback.duration_since(&timestamp.callback) {
        cb.set_latency_usec(latency.as_micros() as u32);
    }
}
