use std::f32::consts::PI;

/// Oscillator waveform. Each split's patch picks one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
    Sawtooth,
    Square,
}

impl Waveform {
    /// Sample the waveform at a phase in [0.0, 1.0).
    fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (phase * 2.0 * PI).sin(),
            Waveform::Triangle => {
                if phase < 0.5 {
                    4.0 * phase - 1.0
                } else {
                    3.0 - 4.0 * phase
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

/// Phase-accumulator oscillator.
pub struct Oscillator {
    phase: f32,
    phase_delta: f32,
    sample_rate: f32,
    waveform: Waveform,
}

impl Oscillator {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            phase_delta: 0.0,
            sample_rate,
            waveform: Waveform::default(),
        }
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.phase_delta = frequency / self.sample_rate;
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    /// Restart the cycle so every attack begins at the same phase.
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    pub fn next_sample(&mut self) -> f32 {
        let out = self.waveform.sample(self.phase);
        self.phase += self.phase_delta;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_starts_at_zero() {
        let mut osc = Oscillator::new(48000.0);
        osc.set_frequency(440.0);
        assert!(osc.next_sample().abs() < 0.001);
    }

    #[test]
    fn test_waveform_ranges() {
        for wf in [
            Waveform::Sine,
            Waveform::Triangle,
            Waveform::Sawtooth,
            Waveform::Square,
        ] {
            for i in 0..100 {
                let s = wf.sample(i as f32 / 100.0);
                assert!((-1.0..=1.0).contains(&s), "{wf:?} out of range: {s}");
            }
        }
    }

    #[test]
    fn test_phase_wraps() {
        let mut osc = Oscillator::new(100.0);
        osc.set_frequency(30.0);
        for _ in 0..1000 {
            let s = osc.next_sample();
            assert!(s.is_finite());
        }
        assert!(osc.phase < 1.0);
    }
}
