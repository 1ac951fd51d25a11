/// ADSR envelope generator, one per voice.
///
/// Linear segments are fine for this use; the stage position is tracked as a
/// per-stage sample counter so retriggering restarts cleanly.
pub struct Envelope {
    stage: Stage,
    elapsed: u32,
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,
    level: f32,
    sample_rate: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    /// Remembers the level at note-off so the ramp starts where the
    /// envelope actually was, not at the sustain level.
    Release { from: f32 },
}

impl Envelope {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            stage: Stage::Idle,
            elapsed: 0,
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
            level: 0.0,
            sample_rate,
        }
    }

    pub fn set_adsr(&mut self, attack: f32, decay: f32, sustain: f32, release: f32) {
        // Floor the ramp times at 1 ms to avoid clicks.
        self.attack = attack.max(0.001);
        self.decay = decay.max(0.001);
        self.sustain = sustain.clamp(0.0, 1.0);
        self.release = release.max(0.001);
    }

    pub fn note_on(&mut self) {
        self.stage = Stage::Attack;
        self.elapsed = 0;
    }

    pub fn note_off(&mut self) {
        if self.stage != Stage::Idle {
            self.stage = Stage::Release { from: self.level };
            self.elapsed = 0;
        }
    }

    pub fn is_active(&self) -> bool {
        self.stage != Stage::Idle
    }

    fn samples(&self, seconds: f32) -> u32 {
        (seconds * self.sample_rate) as u32
    }

    pub fn next_sample(&mut self) -> f32 {
        match self.stage {
            Stage::Idle => {
                self.level = 0.0;
            }
            Stage::Attack => {
                let total = self.samples(self.attack);
                if self.elapsed >= total {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                    self.elapsed = 0;
                } else {
                    self.level = self.elapsed as f32 / total as f32;
                }
            }
            Stage::Decay => {
                let total = self.samples(self.decay);
                if self.elapsed >= total {
                    self.level = self.sustain;
                    self.stage = Stage::Sustain;
                    self.elapsed = 0;
                } else {
                    let progress = self.elapsed as f32 / total as f32;
                    self.level = 1.0 - progress * (1.0 - self.sustain);
                }
            }
            Stage::Sustain => {
                self.level = self.sustain;
            }
            Stage::Release { from } => {
                let total = self.samples(self.release);
                if self.elapsed >= total {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                    self.elapsed = 0;
                } else {
                    let progress = self.elapsed as f32 / total as f32;
                    self.level = from * (1.0 - progress);
                }
            }
        }

        self.elapsed = self.elapsed.saturating_add(1);
        self.level
    }

    /// Hard-silence the envelope (backend start, patch reapplication).
    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
        self.elapsed = 0;
        self.level = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        let env = Envelope::new(48000.0);
        assert!(!env.is_active());
    }

    #[test]
    fn test_attack_ramps_up() {
        let mut env = Envelope::new(48000.0);
        env.set_adsr(0.1, 0.1, 0.7, 0.3);
        env.note_on();

        let a = env.next_sample();
        let b = env.next_sample();
        assert!(b > a);
        assert!((0.0..=1.0).contains(&a));
    }

    #[test]
    fn test_release_reaches_idle() {
        let mut env = Envelope::new(1000.0);
        env.set_adsr(0.001, 0.001, 0.5, 0.01);
        env.note_on();
        for _ in 0..100 {
            env.next_sample();
        }
        env.note_off();
        for _ in 0..100 {
            env.next_sample();
        }
        assert!(!env.is_active());
        assert_eq!(env.next_sample(), 0.0);
    }

    #[test]
    fn test_retrigger_restarts_attack() {
        let mut env = Envelope::new(1000.0);
        env.set_adsr(0.05, 0.05, 0.7, 0.1);
        env.note_on();
        for _ in 0..40 {
            env.next_sample();
        }
        env.note_on();
        let restarted = env.next_sample();
        assert!(restarted < 0.1);
    }
}
