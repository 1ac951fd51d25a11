use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::{
    AudioBackend, BackendCallback, BackendError, BufferAttributes, MAX_BLOCK_FRAMES, MAX_CHANNELS,
};
use crate::dsp;

/// Exclusive polling backend: one dedicated render thread pushes frames into
/// the device-side write buffer, blocking whenever the buffer is full and
/// waking when the device has consumed some. A wake is only a hint; the
/// thread re-checks availability every time.
///
/// The device side is a [`ShareBuffer`] drained by the platform stream's own
/// callback. `with_sink` swaps that stream for an externally drained buffer,
/// which is also how the state machine is exercised in tests.
pub struct PollingBackend {
    callback: Option<Box<dyn BackendCallback>>,
    sink: Option<Arc<ShareBuffer>>,
    external_sink: bool,
    stream: Option<cpal::Stream>,
    thread: Option<JoinHandle<Box<dyn BackendCallback>>>,
    dead: Arc<AtomicBool>,
    attrs: BufferAttributes,
    initialized: bool,
    active: bool,
}

impl PollingBackend {
    pub fn new(callback: Box<dyn BackendCallback>) -> Self {
        Self {
            callback: Some(callback),
            sink: None,
            external_sink: false,
            stream: None,
            thread: None,
            dead: Arc::new(AtomicBool::new(false)),
            attrs: BufferAttributes {
                sample_rate: 0.0,
                channels: 0,
                buffer_frames: 0,
            },
            initialized: false,
            active: false,
        }
    }

    /// Render into a caller-supplied buffer instead of a system device. The
    /// caller owns draining it.
    pub fn with_sink(callback: Box<dyn BackendCallback>, sink: Arc<ShareBuffer>) -> Self {
        let mut backend = Self::new(callback);
        backend.sink = Some(sink);
        backend.external_sink = true;
        backend
    }

    fn negotiate_device(
        &mut self,
        channels: usize,
    ) -> Result<(Arc<ShareBuffer>, cpal::Stream, f32, usize), BackendError> {
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

        let sink = Arc::new(ShareBuffer::new(buffer_frames, channels));
        let stream = match build_drain_stream(&device, &config, &sink, channels) {
            Ok(stream) => stream,
            Err(_) => {
                config.buffer_size = cpal::BufferSize::Default;
                build_drain_stream(&device, &config, &sink, channels)?
            }
        };
        stream.pause()?;

        Ok((sink, stream, sample_rate, buffer_frames))
    }
}

/// The platform stream only empties the share buffer; any shortfall is
/// submitted as silence, never stale memory. Buffer-attribute changes from
/// the service (larger pulls than negotiated) are absorbed into the frame
/// accounting on the fly.
fn build_drain_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sink: &Arc<ShareBuffer>,
    channels: usize,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    let sink = Arc::clone(sink);
    device.build_output_stream(
        config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            if frames > sink.buffer_frames() {
                sink.set_buffer_frames(frames);
            }
            sink.drain_into(data);
        },
        |err| eprintln!("audio stream error: {err}"),
        None,
    )
}

impl AudioBackend for PollingBackend {
    fn init(&mut self, sample_rate: f32, channels: usize) -> Result<(), BackendError> {
        if self.initialized {
            return Err(BackendError::AlreadyInitialized);
        }
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(BackendError::Negotiation(format!(
                "unsupported channel count {channels}"
            )));
        }

        let attrs = if self.external_sink {
            let sink = self.sink.as_ref().ok_or(BackendError::NotInitialized)?;
            if sink.channels() != channels {
                return Err(BackendError::Negotiation(format!(
                    "sink has {} channels, requested {channels}",
                    sink.channels()
                )));
            }
            BufferAttributes {
                sample_rate,
                channels,
                buffer_frames: sink.buffer_frames(),
            }
        } else {
            let (sink, stream, rate, buffer_frames) = self.negotiate_device(channels)?;
            self.sink = Some(sink);
            self.stream = Some(stream);
            BufferAttributes {
                sample_rate: rate,
                channels,
                buffer_frames,
            }
        };

        match self.callback.as_mut() {
            Some(cb) => cb.set_backend_parameters(attrs.sample_rate, channels, MAX_BLOCK_FRAMES),
            None => return Err(BackendError::NotInitialized),
        }

        self.attrs = attrs;
        self.initialized = true;
        Ok(())
    }

    fn start(&mut self) -> Result<(), BackendError> {
        if !self.initialized {
            return Err(BackendError::NotInitialized);
        }
        if self.active {
            return Err(BackendError::AlreadyStarted);
        }

        let sink = Arc::clone(self.sink.as_ref().ok_or(BackendError::NotInitialized)?);
        sink.open();
        self.dead.store(false, Ordering::Relaxed);

        if let Some(stream) = &self.stream {
            stream.play()?;
        }

        let mut cb = self.callback.take().ok_or(BackendError::NotStarted)?;
        cb.on_backend_start();

        let dead = Arc::clone(&self.dead);
        let channels = self.attrs.channels;
        let buffer_frames = self.attrs.buffer_frames;
        self.thread = Some(std::thread::spawn(move || {
            render_loop(cb, sink, dead, channels, buffer_frames)
        }));
        self.active = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        if !self.active {
            return Err(BackendError::NotStarted);
        }

        self.dead.store(true, Ordering::Relaxed);
        if let Some(sink) = &self.sink {
            sink.close();
        }
        if let Some(thread) = self.thread.take() {
            match thread.join() {
                Ok(cb) => self.callback = Some(cb),
                Err(_) => return Err(BackendError::Device("render thread panicked".into())),
            }
        }

        if let Some(stream) = &self.stream {
            if let Err(err) = stream.pause() {
                eprintln!("failed to cork output stream: {err}");
            }
        }

        if let Some(cb) = self.callback.as_mut() {
            cb.on_backend_stop();
        }
        self.active = false;
        Ok(())
    }

    fn sample_rate(&self) -> f32 {
        self.attrs.sample_rate
    }

    fn num_channels(&self) -> usize {
        self.attrs.channels
    }
}

/// Dedicated render thread: block until the write buffer has room, fill
/// exactly that much in bounded sub-blocks, interleave, push. Returns the
/// callback to the thread that joins us.
fn render_loop(
    mut cb: Box<dyn BackendCallback>,
    sink: Arc<ShareBuffer>,
    dead: Arc<AtomicBool>,
    channels: usize,
    buffer_frames: usize,
) -> Box<dyn BackendCallback> {
    let mut left = [0.0f32; MAX_BLOCK_FRAMES];
    let mut right = [0.0f32; MAX_BLOCK_FRAMES];
    let mut interleaved = vec![0.0f32; buffer_frames.max(MAX_BLOCK_FRAMES) * channels];

    while !dead.load(Ordering::Relaxed) {
        let mut avail = sink.write_avail();
        if avail == 0 {
            avail = sink.wait_writable();
        }
        if avail == 0 {
            // Spurious wake or shutdown; the loop condition decides.
            continue;
        }

        let total = avail.min(interleaved.len() / channels);
        let mut frames = total;
        let mut offset = 0;
        while frames != 0 {
            let block = frames.min(MAX_BLOCK_FRAMES);
            cb.mix_samples(&mut left[..block], &mut right[..block]);

            if channels == 2 {
                dsp::interleave_stereo(
                    &mut interleaved[offset..offset + block * 2],
                    &left[..block],
                    &right[..block],
                );
            } else {
                interleaved[offset..offset + block].copy_from_slice(&left[..block]);
            }
            offset += block * channels;
            frames -= block;
        }

        if !sink.submit(&interleaved[..total * channels]) {
            break;
        }
    }

    cb
}

struct ShareState {
    queue: VecDeque<f32>,
    capacity_samples: usize,
    closed: bool,
}

/// Bounded FIFO of interleaved samples standing in for the device's write
/// buffer: the render thread fills it, the platform stream (or an external
/// consumer) drains it. Capacity tracks the negotiated buffer size.
pub struct ShareBuffer {
    inner: Mutex<ShareState>,
    writable: Condvar,
    channels: usize,
}

impl ShareBuffer {
    pub fn new(buffer_frames: usize, channels: usize) -> Self {
        Self {
            inner: Mutex::new(ShareState {
                queue: VecDeque::with_capacity(buffer_frames * channels),
                capacity_samples: buffer_frames * channels,
                closed: false,
            }),
            writable: Condvar::new(),
            channels,
        }
    }

    fn state(&self) -> MutexGuard<'_, ShareState> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn buffer_frames(&self) -> usize {
        self.state().capacity_samples / self.channels
    }

    /// Absorb a buffer-attribute change from the audio service.
    pub fn set_buffer_frames(&self, frames: usize) {
        self.state().capacity_samples = frames * self.channels;
        self.writable.notify_one();
    }

    /// Frames of room left for the producer.
    pub fn write_avail(&self) -> usize {
        let state = self.state();
        state.capacity_samples.saturating_sub(state.queue.len()) / self.channels
    }

    /// Block until there is room for at least one frame, the buffer closes,
    /// or a wake arrives. Returns the frames available right now; callers
    /// must treat 0 as "check again".
    pub fn wait_writable(&self) -> usize {
        let mut state = self.state();
        while !state.closed && state.capacity_samples.saturating_sub(state.queue.len()) < self.channels
        {
            state = self
                .writable
                .wait(state)
                .unwrap_or_else(|err| err.into_inner());
        }
        if state.closed {
            0
        } else {
            state.capacity_samples.saturating_sub(state.queue.len()) / self.channels
        }
    }

    /// Append rendered samples. Returns false once closed.
    pub fn submit(&self, interleaved: &[f32]) -> bool {
        let mut state = self.state();
        if state.closed {
            return false;
        }
        state.queue.extend(interleaved.iter().copied());
        true
    }

    /// Consumer side: move queued samples out, zero-filling any shortfall,
    /// and wake the producer.
    pub fn drain_into(&self, out: &mut [f32]) -> usize {
        let taken;
        {
            let mut state = self.state();
            taken = out.len().min(state.queue.len());
            for (dst, src) in out[..taken].iter_mut().zip(state.queue.drain(..taken)) {
                *dst = src;
            }
        }
        out[taken..].fill(0.0);
        self.writable.notify_one();
        taken
    }

    /// Reset for a new start: discard leftovers and accept submissions again.
    pub fn open(&self) {
        let mut state = self.state();
        state.queue.clear();
        state.closed = false;
    }

    /// Reject further submissions and wake any blocked producer.
    pub fn close(&self) {
        self.state().closed = true;
        self.writable.notify_all();
    }
}
