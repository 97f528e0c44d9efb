//! Concrete node processors, one per [`NodeKind`].
//!
//! | kind       | unit        | capabilities                 |
//! | ---------- | ----------- | ---------------------------- |
//! | oscillator | source      | note-reactive, renderable    |
//! | envelope   | mixer       | note-reactive, automatable   |
//! | filter     | equalizer   | note-reactive, automatable   |
//! | reverb     | reverb      | none                         |
//! | distortion | distortion  | none                         |
//! | pitch      | time-pitch  | none                         |
//! | resonance  | peaking EQ  | none                         |
//! | output     | output gate | none                         |

use std::str::FromStr;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::dsp::automation::FilterAutomation;
use crate::dsp::distortion::DistortionPreset;
use crate::dsp::envelope::EnvelopeGenerator;
use crate::dsp::filter::FilterMode;
use crate::dsp::reverb::ReverbPreset;
use crate::dsp::{AtomicF32, Waveform};
use crate::engine::{
    DistortionParams, EqualizerParams, PeakParams, PitchParams, ProcessingUnit, ReverbParams,
    UnitHandle,
};
use crate::error::ParamError;
use crate::graph::node::{
    Automatable, Capabilities, NodeKind, NodeProcessor, NoteReactive, Renderable,
};
use crate::graph::params::{lookup, ParamSpec, ParamValue};
use crate::synth::OscillatorCore;

/// Build a fresh processor for `kind`. The output node is not buildable:
/// it wraps the backend's own output gate.
pub(crate) fn build(
    kind: NodeKind,
    sample_rate: f32,
    config: &EngineConfig,
) -> Option<Box<dyn NodeProcessor>> {
    let node: Box<dyn NodeProcessor> = match kind {
        NodeKind::Oscillator => Box::new(OscillatorNode::new(sample_rate, config)),
        NodeKind::Envelope => Box::new(EnvelopeNode::new(config)),
        NodeKind::Filter => Box::new(FilterNode::new(config)),
        NodeKind::Reverb => Box::new(ReverbNode::new()),
        NodeKind::Distortion => Box::new(DistortionNode::new()),
        NodeKind::Pitch => Box::new(PitchNode::new()),
        NodeKind::Resonance => Box::new(ResonanceNode::new()),
        NodeKind::Output => return None,
    };
    Some(node)
}

/// Validate `value` against the table and hand back the declared name and the
/// normalized value.
fn resolve(
    specs: &'static [ParamSpec],
    name: &str,
    value: ParamValue,
) -> Result<(&'static str, ParamValue), ParamError> {
    let spec = lookup(specs, name)?;
    Ok((spec.name, spec.accept(value)?))
}

fn choice<T: FromStr>(name: &'static str, value: &str) -> Result<T, ParamError> {
    value.parse().map_err(|_| ParamError::InvalidChoice {
        name,
        value: value.to_string(),
    })
}

fn number(value: f32) -> Option<ParamValue> {
    Some(ParamValue::Number(value))
}

fn named(name: &str) -> Option<ParamValue> {
    Some(ParamValue::Choice(name.to_string()))
}

// Oscillator

pub struct OscillatorNode {
    unit: UnitHandle,
    core: OscillatorCore,
}

impl OscillatorNode {
    const PARAMS: &'static [ParamSpec] = &[
        ParamSpec::choice("waveform", &["sine", "square", "triangle", "saw"]),
        ParamSpec::number("volume", 0.0, 0.5),
    ];

    pub fn new(sample_rate: f32, config: &EngineConfig) -> Self {
        let core = OscillatorCore::new(sample_rate);
        core.set_polyphony(config.max_polyphony);
        Self {
            unit: UnitHandle::new(ProcessingUnit::Source(core.clone())),
            core,
        }
    }

    pub fn core(&self) -> &OscillatorCore {
        &self.core
    }
}

impl NoteReactive for OscillatorNode {
    fn note_on(&mut self, frequency: f32, _now: f64) {
        self.core.note_on(frequency);
    }

    fn note_off(&mut self, frequency: f32, _now: f64) {
        self.core.note_off(frequency);
    }

    fn all_notes_off(&mut self, _now: f64) {
        self.core.all_notes_off();
    }
}

impl Renderable for OscillatorNode {
    fn render(&self, out: &mut [f32], channels: usize) {
        self.core.render(out, channels);
    }
}

impl NodeProcessor for OscillatorNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Oscillator
    }

    fn unit(&self) -> &UnitHandle {
        &self.unit
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NOTE_REACTIVE | Capabilities::RENDERABLE
    }

    fn as_note_reactive(&mut self) -> Option<&mut dyn NoteReactive> {
        Some(self)
    }

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }

    fn params(&self) -> &'static [ParamSpec] {
        Self::PARAMS
    }

    fn param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "waveform" => named(self.core.waveform().name()),
            "volume" => number(self.core.volume()),
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<(), ParamError> {
        match resolve(Self::PARAMS, name, value)? {
            (name @ "waveform", ParamValue::Choice(c)) => {
                self.core.set_waveform(choice::<Waveform>(name, &c)?)
            }
            (_, ParamValue::Number(x)) => self.core.set_volume(x),
            (name, _) => return Err(ParamError::WrongKind { name }),
        }
        Ok(())
    }
}

// Envelope

pub struct EnvelopeNode {
    unit: UnitHandle,
    gain: Arc<AtomicF32>,
    envelope: EnvelopeGenerator,
}

impl EnvelopeNode {
    const PARAMS: &'static [ParamSpec] = &[
        ParamSpec::number("attack", 0.01, 2.0),
        ParamSpec::number("decay", 0.01, 2.0),
        ParamSpec::number("sustain", 0.0, 1.0),
        ParamSpec::number("release", 0.01, 3.0),
    ];

    pub fn new(config: &EngineConfig) -> Self {
        let env = config.envelope;
        let gain = Arc::new(AtomicF32::new(0.0));
        Self {
            unit: UnitHandle::new(ProcessingUnit::Mixer(Arc::clone(&gain))),
            gain,
            envelope: EnvelopeGenerator::adsr(env.attack, env.decay, env.sustain, env.release),
        }
    }

    pub fn envelope(&self) -> &EnvelopeGenerator {
        &self.envelope
    }
}

impl NoteReactive for EnvelopeNode {
    fn note_on(&mut self, _frequency: f32, now: f64) {
        self.envelope.note_on(now);
    }

    fn note_off(&mut self, _frequency: f32, now: f64) {
        self.envelope.note_off(now);
    }

    fn all_notes_off(&mut self, now: f64) {
        self.envelope.release_all(now);
    }
}

impl Automatable for EnvelopeNode {
    fn tick(&mut self, now: f64) {
        self.gain.set(self.envelope.tick(now));
    }
}

impl NodeProcessor for EnvelopeNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Envelope
    }

    fn unit(&self) -> &UnitHandle {
        &self.unit
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NOTE_REACTIVE | Capabilities::AUTOMATABLE
    }

    fn as_note_reactive(&mut self) -> Option<&mut dyn NoteReactive> {
        Some(self)
    }

    fn as_automatable(&mut self) -> Option<&mut dyn Automatable> {
        Some(self)
    }

    fn params(&self) -> &'static [ParamSpec] {
        Self::PARAMS
    }

    fn param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "attack" => number(self.envelope.attack()),
            "decay" => number(self.envelope.decay()),
            "sustain" => number(self.envelope.sustain()),
            "release" => number(self.envelope.release()),
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<(), ParamError> {
        match resolve(Self::PARAMS, name, value)? {
            ("attack", ParamValue::Number(x)) => self.envelope.set_attack(x),
            ("decay", ParamValue::Number(x)) => self.envelope.set_decay(x),
            ("sustain", ParamValue::Number(x)) => self.envelope.set_sustain(x),
            ("release", ParamValue::Number(x)) => self.envelope.set_release(x),
            (name, _) => return Err(ParamError::WrongKind { name }),
        }
        Ok(())
    }

    fn meter(&self) -> Option<f32> {
        Some(self.gain.get())
    }
}

// Filter

pub struct FilterNode {
    unit: UnitHandle,
    params: Arc<EqualizerParams>,
    automation: FilterAutomation,
    /// Cutoff set by hand; automation overrides it while sweeping.
    cutoff: f32,
}

impl FilterNode {
    const PARAMS: &'static [ParamSpec] = &[
        ParamSpec::choice("mode", &["lowpass", "highpass", "bandpass"]),
        ParamSpec::number("cutoff", 20.0, 20_000.0),
        ParamSpec::number("resonance", 0.0, 10.0),
        ParamSpec::choice("automation", &["off", "on"]),
        ParamSpec::number("sweep_speed", 0.0, 1.0),
    ];

    pub fn new(config: &EngineConfig) -> Self {
        let params = Arc::new(EqualizerParams::new());
        let bounds = config.automation;
        Self {
            unit: UnitHandle::new(ProcessingUnit::Equalizer(Arc::clone(&params))),
            cutoff: params.cutoff(),
            params,
            automation: FilterAutomation::new(config.control_rate, bounds.min_hz, bounds.max_hz),
        }
    }

    pub fn automation(&self) -> &FilterAutomation {
        &self.automation
    }

    /// Cutoff the render side is using right now.
    pub fn live_cutoff(&self) -> f32 {
        self.params.cutoff()
    }
}

impl NoteReactive for FilterNode {
    fn note_on(&mut self, _frequency: f32, _now: f64) {
        self.automation.note_on();
    }

    fn note_off(&mut self, _frequency: f32, _now: f64) {}

    fn all_notes_off(&mut self, _now: f64) {}
}

impl Automatable for FilterNode {
    fn tick(&mut self, _now: f64) {
        if let Some(cutoff) = self.automation.tick() {
            self.params.set_cutoff(cutoff);
        }
    }
}

impl NodeProcessor for FilterNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Filter
    }

    fn unit(&self) -> &UnitHandle {
        &self.unit
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NOTE_REACTIVE | Capabilities::AUTOMATABLE
    }

    fn as_note_reactive(&mut self) -> Option<&mut dyn NoteReactive> {
        Some(self)
    }

    fn as_automatable(&mut self) -> Option<&mut dyn Automatable> {
        Some(self)
    }

    fn params(&self) -> &'static [ParamSpec] {
        Self::PARAMS
    }

    fn param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "mode" => named(self.params.mode().name()),
            "cutoff" => number(self.cutoff),
            "resonance" => number(self.params.resonance()),
            "automation" => named(if self.automation.is_enabled() { "on" } else { "off" }),
            "sweep_speed" => number(self.automation.speed()),
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<(), ParamError> {
        match resolve(Self::PARAMS, name, value)? {
            (name @ "mode", ParamValue::Choice(c)) => {
                self.params.set_mode(choice::<FilterMode>(name, &c)?)
            }
            ("cutoff", ParamValue::Number(x)) => {
                self.cutoff = x;
                if !self.automation.is_enabled() {
                    self.params.set_cutoff(x);
                }
            }
            ("resonance", ParamValue::Number(x)) => self.params.set_resonance(x),
            ("automation", ParamValue::Choice(c)) => {
                let enabled = c == "on";
                self.automation.set_enabled(enabled);
                if !enabled {
                    self.params.set_cutoff(self.cutoff);
                }
            }
            ("sweep_speed", ParamValue::Number(x)) => self.automation.set_speed(x),
            (name, _) => return Err(ParamError::WrongKind { name }),
        }
        Ok(())
    }

    fn meter(&self) -> Option<f32> {
        Some(self.live_cutoff())
    }
}

// Reverb

pub struct ReverbNode {
    unit: UnitHandle,
    params: Arc<ReverbParams>,
}

impl ReverbNode {
    const PARAMS: &'static [ParamSpec] = &[
        ParamSpec::choice(
            "preset",
            &["small_room", "medium_hall", "large_hall", "cathedral"],
        ),
        ParamSpec::number("mix", 0.0, 100.0),
    ];

    pub fn new() -> Self {
        let params = Arc::new(ReverbParams::new());
        Self {
            unit: UnitHandle::new(ProcessingUnit::Reverb(Arc::clone(&params))),
            params,
        }
    }
}

impl NodeProcessor for ReverbNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Reverb
    }

    fn unit(&self) -> &UnitHandle {
        &self.unit
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    fn params(&self) -> &'static [ParamSpec] {
        Self::PARAMS
    }

    fn param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "preset" => named(self.params.preset().name()),
            "mix" => number(self.params.mix()),
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<(), ParamError> {
        match resolve(Self::PARAMS, name, value)? {
            (name @ "preset", ParamValue::Choice(c)) => {
                self.params.set_preset(choice::<ReverbPreset>(name, &c)?)
            }
            ("mix", ParamValue::Number(x)) => self.params.set_mix(x),
            (name, _) => return Err(ParamError::WrongKind { name }),
        }
        Ok(())
    }
}

// Distortion

pub struct DistortionNode {
    unit: UnitHandle,
    params: Arc<DistortionParams>,
}

impl DistortionNode {
    const PARAMS: &'static [ParamSpec] = &[
        ParamSpec::choice("preset", &["tube", "crush", "cosmic"]),
        ParamSpec::number("drive", 0.0, 20.0),
        ParamSpec::number("mix", 0.0, 100.0),
    ];

    pub fn new() -> Self {
        let params = Arc::new(DistortionParams::new());
        Self {
            unit: UnitHandle::new(ProcessingUnit::Distortion(Arc::clone(&params))),
            params,
        }
    }
}

impl NodeProcessor for DistortionNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Distortion
    }

    fn unit(&self) -> &UnitHandle {
        &self.unit
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    fn params(&self) -> &'static [ParamSpec] {
        Self::PARAMS
    }

    fn param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "preset" => named(self.params.preset().name()),
            "drive" => number(self.params.drive()),
            "mix" => number(self.params.mix()),
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<(), ParamError> {
        match resolve(Self::PARAMS, name, value)? {
            (name @ "preset", ParamValue::Choice(c)) => {
                self.params.set_preset(choice::<DistortionPreset>(name, &c)?)
            }
            ("drive", ParamValue::Number(x)) => self.params.set_drive(x),
            ("mix", ParamValue::Number(x)) => self.params.set_mix(x),
            (name, _) => return Err(ParamError::WrongKind { name }),
        }
        Ok(())
    }
}

// Pitch

pub struct PitchNode {
    unit: UnitHandle,
    params: Arc<PitchParams>,
}

impl PitchNode {
    const PARAMS: &'static [ParamSpec] = &[
        ParamSpec::stepped("semitones", -24.0, 24.0, 1.0),
        ParamSpec::number("fine", -100.0, 100.0),
    ];

    pub fn new() -> Self {
        let params = Arc::new(PitchParams::new());
        Self {
            unit: UnitHandle::new(ProcessingUnit::TimePitch(Arc::clone(&params))),
            params,
        }
    }
}

impl NodeProcessor for PitchNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Pitch
    }

    fn unit(&self) -> &UnitHandle {
        &self.unit
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    fn params(&self) -> &'static [ParamSpec] {
        Self::PARAMS
    }

    fn param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "semitones" => number(self.params.semitones()),
            "fine" => number(self.params.cents()),
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<(), ParamError> {
        match resolve(Self::PARAMS, name, value)? {
            ("semitones", ParamValue::Number(x)) => self.params.set_semitones(x),
            ("fine", ParamValue::Number(x)) => self.params.set_cents(x),
            (name, _) => return Err(ParamError::WrongKind { name }),
        }
        Ok(())
    }
}

// Resonance

pub struct ResonanceNode {
    unit: UnitHandle,
    params: Arc<PeakParams>,
}

impl ResonanceNode {
    const PARAMS: &'static [ParamSpec] = &[
        ParamSpec::number("frequency", 20.0, 15_000.0),
        ParamSpec::number("gain", 0.0, 24.0),
        ParamSpec::number("width", 0.05, 2.0),
    ];

    pub fn new() -> Self {
        let params = Arc::new(PeakParams::new());
        Self {
            unit: UnitHandle::new(ProcessingUnit::ParametricEq(Arc::clone(&params))),
            params,
        }
    }
}

impl NodeProcessor for ResonanceNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Resonance
    }

    fn unit(&self) -> &UnitHandle {
        &self.unit
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    fn params(&self) -> &'static [ParamSpec] {
        Self::PARAMS
    }

    fn param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "frequency" => number(self.params.frequency()),
            "gain" => number(self.params.gain_db()),
            "width" => number(self.params.bandwidth()),
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<(), ParamError> {
        match resolve(Self::PARAMS, name, value)? {
            ("frequency", ParamValue::Number(x)) => self.params.set_frequency(x),
            ("gain", ParamValue::Number(x)) => self.params.set_gain_db(x),
            ("width", ParamValue::Number(x)) => self.params.set_bandwidth(x),
            (name, _) => return Err(ParamError::WrongKind { name }),
        }
        Ok(())
    }
}

// Output

pub struct OutputNode {
    unit: UnitHandle,
    gain: Arc<AtomicF32>,
}

impl OutputNode {
    const PARAMS: &'static [ParamSpec] = &[ParamSpec::number("volume", 0.0, 1.0)];

    /// Wrap the backend's output gate.
    pub fn new(unit: UnitHandle) -> Self {
        let gain = match unit.unit() {
            ProcessingUnit::Output(gain) | ProcessingUnit::Mixer(gain) => Arc::clone(gain),
            _ => Arc::new(AtomicF32::new(1.0)),
        };
        gain.set(1.0);
        Self { unit, gain }
    }
}

impl NodeProcessor for OutputNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Output
    }

    fn unit(&self) -> &UnitHandle {
        &self.unit
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    fn params(&self) -> &'static [ParamSpec] {
        Self::PARAMS
    }

    fn param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "volume" => number(self.gain.get()),
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<(), ParamError> {
        match resolve(Self::PARAMS, name, value)? {
            (_, ParamValue::Number(x)) => self.gain.set(x),
            (name, _) => return Err(ParamError::WrongKind { name }),
        }
        Ok(())
    }
}
