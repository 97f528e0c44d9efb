use crate::MIN_TIME;

/*
ADSR Envelope Generator
=======================

A control-rate ADSR that drives the level of a mixing stage. It does not
run per sample: a periodic tick (tens of Hz) asks it for the current gain,
and the gain is published to the render side.

Timing is measured against a clock, not counted in ticks. Each stage
remembers when it was entered; on every tick the elapsed time `t` since
that moment decides the gain. A late or dropped tick therefore never
stretches a stage, it just samples the ramp more coarsely.

The Shape
---------

  Gain
    1.0 ┐     ╱╲
        │    ╱  ╲___________
    S   │   ╱               ╲
        │  ╱                 ╲
    0.0 └─╱───────────────────╲──→ Time
        Attack Decay  Sustain  Release

  attack   gain = t / A                   → decay when t ≥ A (gain 1)
  decay    gain = 1 - (t / D) * (1 - S)   → sustain when t ≥ D (gain S)
  sustain  gain = S
  release  gain = g0 * (1 - t / R)        → idle when t ≥ R (gain 0)

`g0` is whatever the gain was when the last key went up, so releasing in
the middle of the attack ramps down from there instead of jumping.

Paraphony
---------

One envelope serves every note of the patch. It counts held keys:

  - the first key down (count 0 → 1) starts the attack
  - further keys only bump the count; the envelope is not retriggered
  - the release starts only when the last key goes up (count → 0)

So a legato line keeps the sustain level instead of re-attacking on every
overlap.

Guards
------

A, D and R are floored at MIN_TIME so no stage divides by zero, S is
clamped to [0, 1], and the published gain is clamped to [0, 1].
*/

/// Stage of the envelope state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

pub struct EnvelopeGenerator {
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,

    state: EnvelopeState,
    state_entered: f64,
    release_start: f32,
    gain: f32,
    active_keys: u32,
}

impl EnvelopeGenerator {
    pub fn new() -> Self {
        Self::adsr(0.1, 0.1, 0.5, 0.5)
    }

    pub fn adsr(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: floor_time(attack),
            decay: floor_time(decay),
            sustain: clamp_level(sustain),
            release: floor_time(release),

            state: EnvelopeState::Idle,
            state_entered: 0.0,
            release_start: 0.0,
            gain: 0.0,
            active_keys: 0,
        }
    }

    /// A key went down at `now`.
    pub fn note_on(&mut self, now: f64) {
        self.active_keys = self.active_keys.saturating_add(1);
        if self.active_keys == 1 {
            self.enter(EnvelopeState::Attack, now);
        }
    }

    /// A key went up at `now`. Extra note-offs are ignored.
    pub fn note_off(&mut self, now: f64) {
        if self.active_keys == 0 {
            return;
        }
        self.active_keys -= 1;
        if self.active_keys == 0 && self.state != EnvelopeState::Idle {
            self.release_start = self.gain;
            self.enter(EnvelopeState::Release, now);
        }
    }

    /// Forget every held key and start releasing from the current gain.
    pub fn release_all(&mut self, now: f64) {
        if self.active_keys == 0 {
            return;
        }
        self.active_keys = 1;
        self.note_off(now);
    }

    /// Advance the state machine to `now` and return the gain to publish.
    pub fn tick(&mut self, now: f64) -> f32 {
        let t = (now - self.state_entered).max(0.0) as f32;

        let gain = match self.state {
            EnvelopeState::Idle => 0.0,
            EnvelopeState::Attack => {
                if t < self.attack {
                    t / self.attack
                } else {
                    self.enter(EnvelopeState::Decay, now);
                    1.0
                }
            }
            EnvelopeState::Decay => {
                if t < self.decay {
                    1.0 - (t / self.decay) * (1.0 - self.sustain)
                } else {
                    self.enter(EnvelopeState::Sustain, now);
                    self.sustain
                }
            }
            EnvelopeState::Sustain => self.sustain,
            EnvelopeState::Release => {
                if t < self.release {
                    self.release_start * (1.0 - t / self.release)
                } else {
                    self.enter(EnvelopeState::Idle, now);
                    0.0
                }
            }
        };

        self.gain = clamp_level(gain);
        self.gain
    }

    /// Back to idle with no held keys.
    pub fn reset(&mut self) {
        self.state = EnvelopeState::Idle;
        self.gain = 0.0;
        self.release_start = 0.0;
        self.active_keys = 0;
    }

    pub fn set_attack(&mut self, seconds: f32) {
        self.attack = floor_time(seconds);
    }

    pub fn set_decay(&mut self, seconds: f32) {
        self.decay = floor_time(seconds);
    }

    pub fn set_sustain(&mut self, level: f32) {
        self.sustain = clamp_level(level);
    }

    pub fn set_release(&mut self, seconds: f32) {
        self.release = floor_time(seconds);
    }

    pub fn attack(&self) -> f32 {
        self.attack
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    pub fn sustain(&self) -> f32 {
        self.sustain
    }

    pub fn release(&self) -> f32 {
        self.release
    }

    /// Gain computed by the last tick.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    pub fn active_keys(&self) -> u32 {
        self.active_keys
    }

    pub fn is_active(&self) -> bool {
        self.state != EnvelopeState::Idle
    }

    fn enter(&mut self, state: EnvelopeState, now: f64) {
        self.state = state;
        self.state_entered = now;
    }
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn floor_time(seconds: f32) -> f32 {
    if seconds.is_nan() {
        MIN_TIME
    } else {
        seconds.max(MIN_TIME)
    }
}

#[inline]
fn clamp_level(level: f32) -> f32 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Deliberately not a divisor of the stage lengths, so no tick lands on
    // a boundary.
    const TICK: f64 = 0.015;

    /// Tick every `TICK` seconds from `*now` until `duration` has passed,
    /// returning every published gain.
    fn run(env: &mut EnvelopeGenerator, now: &mut f64, duration: f64) -> Vec<f32> {
        let end = *now + duration;
        let mut gains = Vec::new();
        while *now + TICK <= end + 1e-9 {
            *now += TICK;
            gains.push(env.tick(*now));
        }
        gains
    }

    fn is_monotonic(gains: &[f32], rising: bool) -> bool {
        gains.windows(2).all(|w| {
            if rising {
                w[1] >= w[0]
            } else {
                w[1] <= w[0]
            }
        })
    }

    #[test]
    fn full_adsr_cycle() {
        let mut env = EnvelopeGenerator::adsr(0.1, 0.1, 0.5, 0.2);
        let mut now = 0.0;

        env.note_on(now);
        assert_eq!(env.state(), EnvelopeState::Attack);

        let attack = run(&mut env, &mut now, 0.1 + TICK);
        assert!(is_monotonic(&attack, true), "attack not rising: {attack:?}");
        assert_eq!(env.gain(), 1.0);
        assert_eq!(env.state(), EnvelopeState::Decay);

        let decay = run(&mut env, &mut now, 0.1 + TICK);
        assert!(is_monotonic(&decay, false), "decay not falling: {decay:?}");
        assert_eq!(env.gain(), 0.5);
        assert_eq!(env.state(), EnvelopeState::Sustain);

        let sustain = run(&mut env, &mut now, 5.0);
        assert!(sustain.iter().all(|&g| g == 0.5));

        env.note_off(now);
        assert_eq!(env.state(), EnvelopeState::Release);
        let release = run(&mut env, &mut now, 0.2 + TICK);
        assert!(is_monotonic(&release, false), "release not falling: {release:?}");
        assert_eq!(env.gain(), 0.0);
        assert_eq!(env.state(), EnvelopeState::Idle);

        let idle = run(&mut env, &mut now, 1.0);
        assert!(idle.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn overlapping_keys_do_not_release_early() {
        let mut env = EnvelopeGenerator::adsr(0.05, 0.05, 0.7, 0.2);
        let mut now = 0.0;

        env.note_on(now);
        run(&mut env, &mut now, 0.02);
        env.note_on(now);
        assert_eq!(env.active_keys(), 2);
        assert_eq!(env.state(), EnvelopeState::Attack, "second key must not retrigger");

        run(&mut env, &mut now, 0.3);
        env.note_off(now);
        assert_eq!(env.active_keys(), 1);
        assert_eq!(env.state(), EnvelopeState::Sustain);

        env.note_off(now);
        assert_eq!(env.active_keys(), 0);
        assert_eq!(env.state(), EnvelopeState::Release);
    }

    #[test]
    fn release_mid_attack_starts_from_current_gain() {
        let mut env = EnvelopeGenerator::adsr(1.0, 0.1, 0.5, 0.5);
        let mut now = 0.0;

        env.note_on(now);
        run(&mut env, &mut now, 0.5);
        let held = env.gain();
        assert!(held > 0.4 && held < 0.6);

        env.note_off(now);
        now += TICK;
        let first = env.tick(now);
        assert!(first < held && first > held * 0.9);
    }

    #[test]
    fn extra_note_off_is_ignored() {
        let mut env = EnvelopeGenerator::new();
        env.note_off(0.0);
        assert_eq!(env.active_keys(), 0);
        assert_eq!(env.state(), EnvelopeState::Idle);
    }

    #[test]
    fn setters_floor_and_clamp() {
        let mut env = EnvelopeGenerator::new();
        env.set_attack(0.0);
        env.set_decay(-3.0);
        env.set_release(f32::NAN);
        env.set_sustain(1.7);

        assert_eq!(env.attack(), MIN_TIME);
        assert_eq!(env.decay(), MIN_TIME);
        assert_eq!(env.release(), MIN_TIME);
        assert_eq!(env.sustain(), 1.0);

        env.note_on(0.0);
        let gain = env.tick(0.001);
        assert!(gain.is_finite() && (0.0..=1.0).contains(&gain));
    }
}
