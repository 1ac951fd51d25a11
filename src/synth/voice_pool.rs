use super::oscillator::Waveform;
use super::voice::Voice;

/// Fixed polyphony per split.
pub const MAX_VOICES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Idle,
    Held { note: u8 },
}

struct PoolVoice {
    voice: Voice,
    slot: Slot,
    age: u64,
}

impl PoolVoice {
    fn new(sample_rate: f32) -> Self {
        Self {
            voice: Voice::new(sample_rate),
            slot: Slot::Idle,
            age: 0,
        }
    }

    fn is_idle(&self) -> bool {
        self.slot == Slot::Idle
    }

    fn is_releasing(&self) -> bool {
        !self.is_idle() && !self.voice.is_active()
    }
}

/// Pre-allocated voice pool. Allocation order: idle, then releasing, then
/// the oldest held voice gets stolen.
pub struct VoicePool {
    voices: [PoolVoice; MAX_VOICES],
    next_age: u64,
}

impl VoicePool {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            voices: std::array::from_fn(|_| PoolVoice::new(sample_rate)),
            next_age: 0,
        }
    }

    /// Trigger a note. A repeated note-on for a note that is already held
    /// simply claims another voice; deduplication is the caller's problem.
    pub fn note_on(&mut self, note: u8, frequency: f32) {
        let idx = self.allocate();
        let pv = &mut self.voices[idx];
        pv.voice.note_on(frequency);
        pv.slot = Slot::Held { note };
        pv.age = self.next_age;
        self.next_age += 1;
    }

    /// Release every voice currently holding this note.
    pub fn note_off(&mut self, note: u8) {
        for pv in &mut self.voices {
            if pv.slot == (Slot::Held { note }) {
                pv.voice.note_off();
                // Slot stays Held until the release tail finishes.
            }
        }
    }

    fn allocate(&mut self) -> usize {
        if let Some(idx) = self.voices.iter().position(PoolVoice::is_idle) {
            return idx;
        }
        if let Some(idx) = self.voices.iter().position(PoolVoice::is_releasing) {
            return idx;
        }
        self.voices
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.age)
            .map(|(idx, _)| idx)
            .unwrap_or(0)
    }

    fn retire_finished(&mut self) {
        for pv in &mut self.voices {
            if !pv.is_idle() && !pv.voice.is_active() {
                pv.slot = Slot::Idle;
            }
        }
    }

    pub fn set_adsr(&mut self, attack: f32, decay: f32, sustain: f32, release: f32) {
        for pv in &mut self.voices {
            pv.voice.set_adsr(attack, decay, sustain, release);
        }
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        for pv in &mut self.voices {
            pv.voice.set_waveform(waveform);
        }
    }

    pub fn set_gain(&mut self, gain: f32) {
        for pv in &mut self.voices {
            pv.voice.set_gain(gain);
        }
    }

    /// Hard-silence every voice. Used on backend start, not for note-off.
    pub fn silence(&mut self) {
        for pv in &mut self.voices {
            pv.voice.reset();
            pv.slot = Slot::Idle;
        }
    }

    /// Render and accumulate into both channel buffers. The caller zeroes
    /// the buffers once per block; pools are additive so splits layer.
    pub fn mix_into(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.retire_finished();

        let scale = 1.0 / (MAX_VOICES as f32).sqrt();
        for pv in &mut self.voices {
            if pv.is_idle() {
                continue;
            }
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                let sample = pv.voice.next_sample() * scale;
                *l += sample;
                *r += sample;
            }
        }
    }

    #[cfg(test)]
    pub fn held_notes(&self) -> Vec<u8> {
        self.voices
            .iter()
            .filter_map(|pv| match pv.slot {
                Slot::Held { note } => Some(note),
                Slot::Idle => None,
            })
            .collect()
    }
}
