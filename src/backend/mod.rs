pub mod polling;
pub mod stream;

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use polling::{PollingBackend, ShareBuffer};
pub use stream::StreamBackend;

/// Most channels any backend negotiates.
pub const MAX_CHANNELS: usize = 2;

/// Render sub-block size. Backends always call `mix_samples` with at most
/// this many frames because the engine's working buffers are bounded.
pub const MAX_BLOCK_FRAMES: usize = 256;

/// Buffer-size negotiation target.
pub const TARGET_LATENCY: Duration = Duration::from_millis(20);

/// The capability a backend drives. Implemented by the synthesis engine.
///
/// `set_backend_parameters` is called exactly once, after successful
/// negotiation and before any render. `on_backend_start`/`on_backend_stop`
/// bracket an active render period and run on whichever thread performs the
/// transition, never concurrently with `mix_samples`.
pub trait BackendCallback: Send {
    fn set_backend_parameters(&mut self, sample_rate: f32, channels: usize, max_block_frames: usize);

    fn on_backend_start(&mut self);

    fn on_backend_stop(&mut self);

    /// Real-time render call; the frame count is the slice length. Runs on
    /// the audio thread only and must not allocate, lock, block, or fail.
    fn mix_samples(&mut self, left: &mut [f32], right: &mut [f32]);

    /// Advisory pipeline latency report. Default: ignored.
    fn set_latency_usec(&mut self, _usec: u32) {}
}

/// Format and buffering negotiated with the audio service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferAttributes {
    pub sample_rate: f32,
    pub channels: usize,
    pub buffer_frames: usize,
}

impl BufferAttributes {
    pub fn latency_frames(sample_rate: f32) -> usize {
        ((TARGET_LATENCY.as_secs_f32() * sample_rate) as usize).max(MAX_BLOCK_FRAMES)
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend is not initialized")]
    NotInitialized,
    #[error("backend is already initialized")]
    AlreadyInitialized,
    #[error("backend is already started")]
    AlreadyStarted,
    #[error("backend is not started")]
    NotStarted,
    #[error("negotiation failed: {0}")]
    Negotiation(String),
    #[error("audio device error: {0}")]
    Device(String),
    #[error(transparent)]
    StreamConfig(#[from] cpal::DefaultStreamConfigError),
    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error(transparent)]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error(transparent)]
    PauseStream(#[from] cpal::PauseStreamError),
}

/// The backend state machine: Uninitialized → Ready → Started ⇄ Stopped.
///
/// `init` performs device connection and format negotiation; failure leaves
/// no partial state. `start`/`stop` block until the device acknowledges the
/// transition and must not be called from the audio thread. Calling `start`
/// while started (or `stop` while stopped) fails without side effects.
pub trait AudioBackend {
    fn init(&mut self, sample_rate: f32, channels: usize) -> Result<(), BackendError>;

    fn start(&mut self) -> Result<(), BackendError>;

    fn stop(&mut self) -> Result<(), BackendError>;

    /// Valid only after a successful `init`.
    fn sample_rate(&self) -> f32;

    /// Valid only after a successful `init`.
    fn num_channels(&self) -> usize;
}

/// Which concurrency model drives the render loop. Both satisfy the same
/// state machine and callback contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The audio service invokes a render callback on its own thread.
    #[default]
    Stream,
    /// A dedicated render thread polls the device buffer for room.
    Polling,
}

pub fn create_backend(kind: BackendKind, callback: Box<dyn BackendCallback>) -> Box<dyn AudioBackend> {
    match kind {
        BackendKind::Stream => Box::new(StreamBackend::new(callback)),
        BackendKind::Polling => Box::new(PollingBackend::new(callback)),
    }
}
