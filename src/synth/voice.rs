use super::envelope::Envelope;
use super::oscillator::{Oscillator, Waveform};

/// One synthesizer voice: oscillator shaped by an ADSR envelope, scaled by
/// the split's gain.
pub struct Voice {
    oscillator: Oscillator,
    envelope: Envelope,
    gain: f32,
}

impl Voice {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            oscillator: Oscillator::new(sample_rate),
            envelope: Envelope::new(sample_rate),
            gain: 1.0,
        }
    }

    pub fn note_on(&mut self, frequency: f32) {
        self.oscillator.set_frequency(frequency);
        self.oscillator.reset();
        self.envelope.note_on();
    }

    pub fn note_off(&mut self) {
        self.envelope.note_off();
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.oscillator.set_waveform(waveform);
    }

    pub fn set_adsr(&mut self, attack: f32, decay: f32, sustain: f32, release: f32) {
        self.envelope.set_adsr(attack, decay, sustain, release);
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
    }

    /// Active until the release stage finishes.
    pub fn is_active(&self) -> bool {
        self.envelope.is_active()
    }

    pub fn next_sample(&mut self) -> f32 {
        let osc = self.oscillator.next_sample();
        let env = self.envelope.next_sample();
        osc * env * self.gain
    }

    pub fn reset(&mut self) {
        self.envelope.reset();
        self.oscillator.reset();
    }
}
