use super::oscillator::Waveform;

/// Fixed per-split voicing. This is deterministic engine configuration, not
/// a user surface; patches are reapplied on every backend start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitPatch {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
    /// Frequency multiplier on top of equal temperament, so the same logical
    /// note can sound at a different pitch per split.
    pub pitch_scale: f32,
    pub volume: f32,
    pub waveform: Waveform,
}

impl SplitPatch {
    /// Split 0 carries the lead, split 1 a brighter harmony an octave up
    /// with envelope times scaled down to 75%.
    pub fn for_split(index: usize) -> Self {
        match index {
            0 => Self {
                attack: 0.01,
                decay: 0.25,
                sustain: 0.55,
                release: 1.5,
                pitch_scale: 1.0,
                volume: 0.1,
                waveform: Waveform::Sine,
            },
            _ => Self {
                attack: 0.0075,
                decay: 0.19,
                sustain: 0.45,
                release: 1.125,
                pitch_scale: 2.0,
                volume: 0.1,
                waveform: Waveform::Triangle,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harmony_split_is_an_octave_up() {
        let lead = SplitPatch::for_split(0);
        let harmony = SplitPatch::for_split(1);
        assert_eq!(lead.pitch_scale, 1.0);
        assert_eq!(harmony.pitch_scale, 2.0);
        assert!(harmony.release < lead.release);
    }
}
