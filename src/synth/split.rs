use super::patch::SplitPatch;
use super::voice_pool::VoicePool;

/// Convert a note number to a frequency in Hz, A440 equal temperament.
pub fn note_to_frequency(note: u8) -> f32 {
    const A4: f32 = 440.0;
    const A4_NOTE: i32 = 69;
    let semitones = i32::from(note) - A4_NOTE;
    A4 * 2.0_f32.powf(semitones as f32 / 12.0)
}

/// One voice-group: a voice pool plus its fixed patch. Splits are addressed
/// by the split index of a note command and mix additively into the block.
pub struct Split {
    pool: VoicePool,
    patch: SplitPatch,
}

impl Split {
    pub fn new(sample_rate: f32, patch: SplitPatch) -> Self {
        let mut split = Self {
            pool: VoicePool::new(sample_rate),
            patch,
        };
        split.apply_patch(patch);
        split
    }

    pub fn apply_patch(&mut self, patch: SplitPatch) {
        self.patch = patch;
        self.pool
            .set_adsr(patch.attack, patch.decay, patch.sustain, patch.release);
        self.pool.set_waveform(patch.waveform);
        self.pool.set_gain(patch.volume);
    }

    /// Every note-on is full velocity; this system has no velocity
    /// sensitivity.
    pub fn note_on(&mut self, note: u8) {
        let frequency = note_to_frequency(note) * self.patch.pitch_scale;
        self.pool.note_on(note, frequency);
    }

    pub fn note_off(&mut self, note: u8) {
        self.pool.note_off(note);
    }

    /// Cut all held notes and release tails immediately.
    pub fn silence(&mut self) {
        self.pool.silence();
    }

    pub fn mix_into(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.pool.mix_into(left, right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a4_is_440() {
        assert!((note_to_frequency(69) - 440.0).abs() < 0.01);
    }

    #[test]
    fn test_middle_c() {
        assert!((note_to_frequency(60) - 261.63).abs() < 0.01);
    }

    #[test]
    fn test_octave_doubles() {
        let a3 = note_to_frequency(57);
        let a4 = note_to_frequency(69);
        assert!((a4 / a3 - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_split_renders_after_note_on() {
        let mut split = Split::new(48000.0, SplitPatch::for_split(0));
        split.note_on(60);

        let mut left = [0.0f32; 256];
        let mut right = [0.0f32; 256];
        split.mix_into(&mut left, &mut right);
        assert!(left.iter().any(|&s| s.abs() > 0.0));
    }

    #[test]
    fn test_silence_cuts_held_notes() {
        let mut split = Split::new(48000.0, SplitPatch::for_split(1));
        split.note_on(72);
        split.silence();

        let mut left = [0.0f32; 64];
        let mut right = [0.0f32; 64];
        split.mix_into(&mut left, &mut right);
        assert!(left.iter().all(|&s| s == 0.0));
    }
}
