pub mod envelope;
pub mod oscillator;
pub mod patch;
pub mod split;
pub mod voice;
pub mod voice_pool;

use std::sync::Arc;

use crate::backend::BackendCallback;
use crate::ring::{NoteCommand, NoteKind, NoteRing, RING_CAPACITY};

use patch::SplitPatch;
use split::Split;

/// Upper bound on voice-groups. The split index is masked against the actual
/// count on the audio thread, so a stray index can never go out of bounds.
pub const MAX_SPLITS: usize = 2;

/// The synthesis engine. Owned by the audio backend, driven only from the
/// audio thread (plus the lifecycle calls bracketing it). The producer side
/// lives in the paired [`SynthHandle`].
pub struct Synth {
    ring: Arc<NoteRing>,
    splits: Vec<Split>,
    num_splits: usize,
    running: bool,
}

/// Producer-thread entry points. Deliberately not `Clone`: the event queue
/// supports exactly one producer, and handing out a second handle would
/// silently break that contract.
pub struct SynthHandle {
    ring: Arc<NoteRing>,
}

impl Synth {
    pub fn new(num_splits: usize) -> (Synth, SynthHandle) {
        let num_splits = num_splits.clamp(1, MAX_SPLITS);
        let ring = Arc::new(NoteRing::new(RING_CAPACITY));
        let engine = Synth {
            ring: Arc::clone(&ring),
            splits: Vec::new(),
            num_splits,
            running: false,
        };
        (engine, SynthHandle { ring })
    }
}

impl SynthHandle {
    pub fn post_note_on(&self, split: usize, note: u8) {
        self.ring.enqueue(NoteCommand::note_on(split, note));
    }

    pub fn post_note_off(&self, split: usize, note: u8) {
        self.ring.enqueue(NoteCommand::note_off(split, note));
    }
}

impl BackendCallback for Synth {
    fn set_backend_parameters(&mut self, sample_rate: f32, _channels: usize, _max_block_frames: usize) {
        self.splits = (0..self.num_splits)
            .map(|i| Split::new(sample_rate, SplitPatch::for_split(i)))
            .collect();
    }

    fn on_backend_start(&mut self) {
        self.ring.reset();
        for (i, split) in self.splits.iter_mut().enumerate() {
            split.apply_patch(SplitPatch::for_split(i));
            split.silence();
        }
        self.running = true;
    }

    fn on_backend_stop(&mut self) {
        // Audio already handed to the device plays out on its own.
        self.running = false;
    }

    fn mix_samples(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len());

        left.fill(0.0);
        right.fill(0.0);

        if !self.running || self.splits.is_empty() {
            return;
        }

        // Apply queued commands before rendering so a note posted before this
        // callback affects the whole block. Block granularity is the timing
        // precision of this design.
        let splits = &mut self.splits;
        let mask = splits.len() - 1;
        self.ring.drain(|cmd| {
            let split = &mut splits[cmd.split & mask];
            match cmd.kind {
                NoteKind::On => split.note_on(cmd.note),
                NoteKind::Off => split.note_off(cmd.note),
            }
        });

        for split in splits {
            split.mix_into(left, right);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured_synth(num_splits: usize) -> (Synth, SynthHandle) {
        let (mut synth, handle) = Synth::new(num_splits);
        synth.set_backend_parameters(48000.0, 2, 256);
        (synth, handle)
    }

    fn render(synth: &mut Synth, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.1f32; frames];
        let mut right = vec![0.1f32; frames];
        synth.mix_samples(&mut left, &mut right);
        (left, right)
    }

    #[test]
    fn test_silence_before_start() {
        let (mut synth, handle) = configured_synth(1);
        handle.post_note_on(0, 60);

        let (left, right) = render(&mut synth, 256);
        assert!(left.iter().all(|&s| s == 0.0));
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_silence_before_any_note() {
        let (mut synth, _handle) = configured_synth(2);
        synth.on_backend_start();

        let (left, right) = render(&mut synth, 256);
        assert!(left.iter().all(|&s| s == 0.0));
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_end_to_end_note_on_then_off() {
        let (mut synth, handle) = configured_synth(1);
        synth.on_backend_start();

        handle.post_note_on(0, 60);
        let (left, _) = render(&mut synth, 256);
        assert!(left.iter().any(|&s| s.abs() > 0.0));

        handle.post_note_off(0, 60);
        // Render until well past the 1.5 s release tail; the output must
        // return to exact silence.
        for _ in 0..400 {
            render(&mut synth, 256);
        }
        let (left, right) = render(&mut synth, 256);
        assert!(left.iter().all(|&s| s == 0.0));
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_splits_layer_into_same_buffers() {
        let (mut synth, handle) = configured_synth(2);
        synth.on_backend_start();

        handle.post_note_on(0, 60);
        let (solo, _) = render(&mut synth, 256);
        synth.on_backend_start(); // reset

        handle.post_note_on(0, 60);
        handle.post_note_on(1, 60);
        let (layered, _) = render(&mut synth, 256);

        let solo_energy: f32 = solo.iter().map(|s| s * s).sum();
        let layered_energy: f32 = layered.iter().map(|s| s * s).sum();
        assert!(layered_energy > solo_energy);
    }

    #[test]
    fn test_out_of_range_split_is_masked() {
        let (mut synth, handle) = configured_synth(2);
        synth.on_backend_start();

        // Split 7 masks to split 1 with two splits configured; must not panic
        // and must make sound.
        handle.post_note_on(7, 64);
        let (left, _) = render(&mut synth, 256);
        assert!(left.iter().any(|&s| s.abs() > 0.0));
    }

    #[test]
    fn test_restart_clears_pending_and_held() {
        let (mut synth, handle) = configured_synth(1);
        synth.on_backend_start();
        handle.post_note_on(0, 60);
        render(&mut synth, 256);

        synth.on_backend_stop();
        synth.on_backend_start();
        let (left, _) = render(&mut synth, 256);
        assert!(left.iter().all(|&s| s == 0.0));
    }
}
