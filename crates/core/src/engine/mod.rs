use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    frame::GeneratedFrame,
    graph::KineticGraph,
    lookahead::{AudioFeatureSample, AudioLookaheadBuffer, EnergyTrend},
    mechanical,
};

/// How far a rising or falling trend shifts the energy used to choose the
/// next node, in energy units. This is what lets the engine commit to a
/// transition slightly ahead of a peak instead of after it.
const TREND_NUDGE: f32 = 0.15;
/// Bass level above which a peak-phase tick emits a stutter variant of the
/// selected frame.
const STUTTER_BASS_THRESHOLD: f32 = 0.75;
/// Phase boundaries applied to a node's band midpoint.
const BUILD_FLOOR: f32 = 0.35;
const PEAK_FLOOR: f32 = 0.7;

/// Whether the current node is driven by audio or by manual pattern
/// selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    Pattern,
    Kinetic,
}

/// Coarse intensity classification derived from the current node's energy
/// band. Never stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Ambient,
    Build,
    Peak,
}

/// Tuning knobs for the engine. Durations are milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Window consulted by the trend classifier each tick.
    pub lookahead_window_ms: u64,
    /// Window over which the instantaneous energy is smoothed.
    pub smoothing_window_ms: u64,
    /// Minimum dwell between audio-driven transitions.
    pub transition_cooldown_ms: u64,
    /// Retention horizon of the lookahead buffer.
    pub buffer_window_ms: u64,
    /// Hard cap on retained samples.
    pub buffer_max_samples: usize,
    pub default_bpm: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookahead_window_ms: 400,
            smoothing_window_ms: 250,
            transition_cooldown_ms: 600,
            buffer_window_ms: 2_000,
            buffer_max_samples: 256,
            default_bpm: 120.0,
        }
    }
}

/// Externally observable snapshot of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineState {
    pub current_node: String,
    pub phase: Phase,
    pub current_frame: Option<GeneratedFrame>,
    pub pattern: Option<String>,
    pub mode: EngineMode,
}

/// The trend and average that drove a tick's decision, exposed so UI
/// indicators can present it without recomputing.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LookaheadReport {
    pub trend: EnergyTrend,
    pub average_energy: f32,
}

/// Per-tick output consumed by the presentation layer.
#[derive(Debug, Clone)]
pub struct EngineUpdate {
    pub frame: Option<GeneratedFrame>,
    pub phase: Phase,
    pub lookahead: LookaheadReport,
}

/// Audio-reactive choreography state machine.
///
/// One engine instance is owned and driven by a single host loop: every
/// entry point is synchronous, takes `&mut self`, and completes in bounded
/// time, so the frame loop is never stalled. Anomalies (unknown manual
/// targets, empty frame pools, non-monotonic samples) all degrade to "hold
/// last good state" rather than erroring; a visible glitch is worse than a
/// brief stall.
#[derive(Debug)]
pub struct KineticEngine {
    graph: KineticGraph,
    buffer: AudioLookaheadBuffer,
    config: EngineConfig,
    mode: EngineMode,
    current_node: String,
    current_frame: Option<GeneratedFrame>,
    pattern: Option<String>,
    bpm: f32,
    /// Fractional beats elapsed, advanced from tick deltas at the current
    /// BPM. Keys the round-robin frame selection.
    beat_count: f32,
    last_update_ms: Option<u64>,
    last_transition_ms: Option<u64>,
}

impl KineticEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let buffer = AudioLookaheadBuffer::new(config.buffer_window_ms, config.buffer_max_samples);
        let bpm = config.default_bpm;
        Self {
            graph: KineticGraph::new(),
            buffer,
            config,
            mode: EngineMode::Kinetic,
            current_node: "idle".to_string(),
            current_frame: None,
            pattern: None,
            bpm,
            beat_count: 0.0,
            last_update_ms: None,
            last_transition_ms: None,
        }
    }

    /// Builds an engine over a custom graph topology.
    pub fn with_graph(graph: KineticGraph, config: EngineConfig) -> Self {
        let mut engine = Self::with_config(config);
        engine.graph = graph;
        engine
    }

    pub fn graph(&self) -> &KineticGraph {
        &self.graph
    }

    /// Loads (or reloads) the frame catalogue. Rebinds every node's pool,
    /// returns the state machine to `idle` with its first available frame,
    /// and clears the lookahead buffer. Safe to call repeatedly.
    pub fn initialize(&mut self, frames: &[GeneratedFrame]) {
        self.graph.assign_frames(frames);
        self.current_node = "idle".to_string();
        self.current_frame = self
            .graph
            .node("idle")
            .and_then(|node| node.frames.first())
            .cloned();
        self.pattern = None;
        self.buffer.clear();
        self.beat_count = 0.0;
        self.last_update_ms = None;
        self.last_transition_ms = None;

        debug!(
            catalogue = frames.len(),
            has_frame = self.current_frame.is_some(),
            "engine initialised"
        );
    }

    /// Per-tick entry point. Pushes the sample, reads the trend and the
    /// smoothed energy, advances the state machine when in kinetic mode,
    /// and reports the frame to present. Never fails for a well-formed
    /// sample; an empty transition set simply means "stay".
    pub fn update(&mut self, timestamp_ms: u64, sample: AudioFeatureSample) -> EngineUpdate {
        self.buffer.push(sample);
        self.advance_beat_clock(timestamp_ms);

        let trend = self.buffer.analyze_future(self.config.lookahead_window_ms);
        let average_energy = self.buffer.average_energy(self.config.smoothing_window_ms);

        if self.mode == EngineMode::Kinetic && self.cooldown_elapsed(timestamp_ms) {
            if let Some(target) = self.pick_transition(average_energy, trend) {
                debug!(
                    from = %self.current_node,
                    to = %target,
                    ?trend,
                    average_energy,
                    "audio-driven transition"
                );
                self.enter_node(&target, timestamp_ms);
            }
        }

        self.refresh_frame();

        let phase = self.phase();
        let frame = match &self.current_frame {
            Some(base) if phase == Phase::Peak && sample.bass > STUTTER_BASS_THRESHOLD => {
                Some(mechanical::stutter_variant(base, sample.bass))
            }
            other => other.clone(),
        };

        EngineUpdate {
            frame,
            phase,
            lookahead: LookaheadReport {
                trend,
                average_energy,
            },
        }
    }

    /// Manual override from the pattern joystick. A known target is entered
    /// unconditionally (the user outranks the energy gate) and resets the
    /// cooldown; an unknown id is a logged no-op because pattern ids come
    /// from a UI-controlled closed set.
    pub fn force_transition(&mut self, node_id: &str) {
        if self.graph.node(node_id).is_none() {
            warn!(node_id, "ignoring transition to unknown node");
            return;
        }

        let now = self.last_update_ms.unwrap_or(0);
        self.enter_node(node_id, now);
        self.pattern = Some(node_id.to_string());
        self.refresh_frame();
    }

    /// Updates the tempo reference driving beat bookkeeping. Any positive
    /// value is accepted as-is; non-positive or non-finite values are
    /// ignored with a warning.
    pub fn set_bpm(&mut self, bpm: f32) {
        if bpm > 0.0 && bpm.is_finite() {
            self.bpm = bpm;
        } else {
            warn!(bpm, "ignoring non-positive bpm");
        }
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    /// Switches between audio-driven and manually-driven node selection.
    pub fn set_mode(&mut self, mode: EngineMode) {
        self.mode = mode;
    }

    /// Read-only snapshot for UI read-back.
    pub fn state(&self) -> EngineState {
        EngineState {
            current_node: self.current_node.clone(),
            phase: self.phase(),
            current_frame: self.current_frame.clone(),
            pattern: self.pattern.clone(),
            mode: self.mode,
        }
    }

    fn phase(&self) -> Phase {
        let midpoint = self
            .graph
            .node(&self.current_node)
            .map(|node| node.band_midpoint())
            .unwrap_or(0.0);

        if midpoint < BUILD_FLOOR {
            Phase::Ambient
        } else if midpoint < PEAK_FLOOR {
            Phase::Build
        } else {
            Phase::Peak
        }
    }

    fn advance_beat_clock(&mut self, timestamp_ms: u64) {
        if let Some(last) = self.last_update_ms {
            if timestamp_ms > last {
                self.beat_count += (timestamp_ms - last) as f32 * self.bpm / 60_000.0;
            }
        }
        self.last_update_ms = Some(timestamp_ms);
    }

    fn cooldown_elapsed(&self, timestamp_ms: u64) -> bool {
        match self.last_transition_ms {
            None => true,
            Some(last) => timestamp_ms.saturating_sub(last) >= self.config.transition_cooldown_ms,
        }
    }

    /// Chooses the next node from the energy-gated candidate set, favouring
    /// the band the trend says we are heading into over the band we are in
    /// now. Ties go to the first candidate in declared edge order so the
    /// whole decision is reproducible.
    fn pick_transition(&self, average_energy: f32, trend: EnergyTrend) -> Option<String> {
        let candidates = self.graph.valid_transitions(&self.current_node, average_energy);
        if candidates.is_empty() {
            return None;
        }

        let projected = match trend {
            EnergyTrend::Rising => (average_energy + TREND_NUDGE).min(1.0),
            EnergyTrend::Falling => (average_energy - TREND_NUDGE).max(0.0),
            EnergyTrend::Stable => average_energy,
        };

        if let Some(anticipated) = candidates
            .iter()
            .find(|node| node.contains_energy(projected))
        {
            return Some(anticipated.id.clone());
        }

        let mut best: Option<(&str, f32)> = None;
        for node in &candidates {
            let distance = (node.band_midpoint() - projected).abs();
            if best.map(|(_, bd)| distance < bd).unwrap_or(true) {
                best = Some((&node.id, distance));
            }
        }
        best.map(|(id, _)| id.to_string())
    }

    fn enter_node(&mut self, node_id: &str, timestamp_ms: u64) {
        self.current_node = node_id.to_string();
        self.last_transition_ms = Some(timestamp_ms);
    }

    /// Round-robin selection keyed by the beat counter. An empty pool keeps
    /// the previous non-null frame so the renderer never sees a hole.
    fn refresh_frame(&mut self) {
        if let Some(node) = self.graph.node(&self.current_node) {
            if !node.frames.is_empty() {
                let index = self.beat_count as usize % node.frames.len();
                self.current_frame = Some(node.frames[index].clone());
            }
        }
    }
}

impl Default for KineticEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::EnergyTier;

    fn frame(pose: &str, energy: EnergyTier) -> GeneratedFrame {
        GeneratedFrame {
            url: format!("https://cdn.example/{pose}.png"),
            pose: pose.to_string(),
            energy,
            direction: "front".to_string(),
            kind: "dance".to_string(),
            role: None,
            is_virtual: false,
            mechanical_fx: None,
            virtual_zoom: None,
            virtual_offset_y: None,
        }
    }

    fn catalogue() -> Vec<GeneratedFrame> {
        vec![
            frame("idle_01", EnergyTier::Low),
            frame("idle_02", EnergyTier::Low),
            frame("lean_left_01", EnergyTier::Low),
            frame("lean_right_01", EnergyTier::Low),
            frame("groove_01", EnergyTier::Mid),
            frame("groove_02", EnergyTier::Mid),
            frame("step_touch_01", EnergyTier::Mid),
            frame("drop_01", EnergyTier::High),
            frame("chaos_01", EnergyTier::High),
        ]
    }

    fn sample(timestamp_ms: u64, energy: f32) -> AudioFeatureSample {
        AudioFeatureSample {
            bass: energy,
            mid: energy,
            high: energy,
            energy,
            timestamp_ms,
        }
    }

    #[test]
    fn starts_idle_and_ambient() {
        let engine = KineticEngine::new();
        let state = engine.state();

        assert_eq!(state.current_node, "idle");
        assert_eq!(state.phase, Phase::Ambient);
        assert!(state.current_frame.is_none());
        assert_eq!(state.mode, EngineMode::Kinetic);
    }

    #[test]
    fn initialize_selects_an_idle_frame() {
        let mut engine = KineticEngine::new();
        engine.initialize(&catalogue());

        let state = engine.state();
        assert_eq!(state.current_node, "idle");
        let frame = state.current_frame.expect("idle pool should have a frame");
        assert_eq!(frame.family(), "idle");
    }

    #[test]
    fn reinitialize_with_empty_catalogue_keeps_topology() {
        let mut engine = KineticEngine::new();
        engine.initialize(&catalogue());
        engine.initialize(&[]);

        assert!(engine.state().current_frame.is_none());
        assert!(engine.graph().can_transition("idle", "lean_left"));
        assert!(!engine.graph().can_transition("idle", "chaos"));
    }

    #[test]
    fn update_always_reports_phase_and_lookahead() {
        let mut engine = KineticEngine::new();

        // Even with no catalogue loaded at all.
        let update = engine.update(0, sample(0, 0.3));
        assert!(update.frame.is_none());
        assert_eq!(update.lookahead.trend, EnergyTrend::Stable);
        assert!(update.lookahead.average_energy > 0.0);
    }

    #[test]
    fn low_energy_sway_picks_first_declared_edge() {
        let mut engine = KineticEngine::new();
        engine.initialize(&catalogue());

        engine.update(0, sample(0, 0.1));
        // `lean_left` is the first idle edge whose band holds 0.1.
        assert_eq!(engine.state().current_node, "lean_left");
    }

    #[test]
    fn cooldown_suppresses_immediate_retransition() {
        let mut engine = KineticEngine::new();
        engine.initialize(&catalogue());

        engine.update(0, sample(0, 0.1));
        let after_first = engine.state().current_node;
        engine.update(100, sample(100, 0.1));
        assert_eq!(engine.state().current_node, after_first);

        engine.update(700, sample(700, 0.1));
        assert_ne!(engine.state().current_node, after_first);
    }

    #[test]
    fn rising_trend_prefers_the_band_ahead() {
        let mut engine = KineticEngine::new();
        engine.initialize(&catalogue());
        engine.current_node = "groove".to_string();

        // At 0.72 both step_touch (up to 0.8) and drop (0.7 and above) are
        // legal from groove. A rising trend projects past step_touch's band
        // and lands on drop; without it the first match wins.
        let rising = engine.pick_transition(0.72, EnergyTrend::Rising).unwrap();
        assert_eq!(rising, "drop");

        let stable = engine.pick_transition(0.72, EnergyTrend::Stable).unwrap();
        assert_eq!(stable, "step_touch");

        let falling = engine.pick_transition(0.72, EnergyTrend::Falling).unwrap();
        assert_eq!(falling, "step_touch");
    }

    #[test]
    fn rising_sweep_climbs_into_the_peak_nodes() {
        let mut engine = KineticEngine::new();
        engine.initialize(&catalogue());

        let mut now = 0u64;
        for i in 0..100u64 {
            now = i * 50;
            let energy = (0.1 + 0.01 * i as f32).min(1.0);
            engine.update(now, sample(now, energy));
        }
        // Hold the ceiling long enough for the last transitions to clear
        // their cooldowns.
        for i in 1..=20u64 {
            engine.update(now + i * 50, sample(now + i * 50, 0.95));
        }

        let state = engine.state();
        assert!(
            state.current_node == "drop" || state.current_node == "chaos",
            "expected a peak node, got {}",
            state.current_node
        );
        assert_eq!(state.phase, Phase::Peak);
    }

    #[test]
    fn force_transition_bypasses_energy_gate() {
        let mut engine = KineticEngine::new();
        engine.initialize(&catalogue());

        // No audio has been seen at all; the manual override still lands.
        engine.force_transition("groove");
        let state = engine.state();
        assert_eq!(state.current_node, "groove");
        assert_eq!(state.phase, Phase::Build);
        assert_eq!(state.current_frame.unwrap().family(), "groove");
        assert_eq!(state.pattern.as_deref(), Some("groove"));
    }

    #[test]
    fn force_transition_to_unknown_node_is_a_no_op() {
        let mut engine = KineticEngine::new();
        engine.initialize(&catalogue());
        let before = engine.state();

        engine.force_transition("moonwalk");
        let after = engine.state();

        assert_eq!(after.current_node, before.current_node);
        assert_eq!(after.pattern, before.pattern);
        assert_eq!(
            after.current_frame.map(|f| f.pose),
            before.current_frame.map(|f| f.pose)
        );
    }

    #[test]
    fn pattern_mode_ignores_audio_transitions() {
        let mut engine = KineticEngine::new();
        engine.initialize(&catalogue());
        engine.set_mode(EngineMode::Pattern);
        engine.force_transition("groove");

        for i in 0..20u64 {
            engine.update(i * 100, sample(i * 100, 0.1));
        }

        assert_eq!(engine.state().current_node, "groove");
        assert_eq!(engine.state().mode, EngineMode::Pattern);
    }

    #[test]
    fn empty_pool_holds_previous_frame() {
        let mut engine = KineticEngine::new();
        // Only idle has frames; everything else has an empty pool.
        engine.initialize(&[frame("idle_01", EnergyTier::Low)]);
        engine.set_mode(EngineMode::Pattern);
        engine.force_transition("lean_left");

        let state = engine.state();
        assert_eq!(state.current_node, "lean_left");
        assert_eq!(state.current_frame.unwrap().pose, "idle_01");
    }

    #[test]
    fn peak_phase_heavy_bass_emits_a_stutter_variant() {
        let mut engine = KineticEngine::new();
        engine.initialize(&catalogue());
        engine.set_mode(EngineMode::Pattern);
        engine.force_transition("drop");

        let update = engine.update(0, sample(0, 0.9));
        assert_eq!(update.phase, Phase::Peak);
        let frame = update.frame.expect("drop pool has a frame");
        assert!(frame.pose.ends_with("_stutter"));
        assert!(frame.is_virtual);

        // The synthetic frame is presentation-only: engine state keeps the
        // real pose.
        assert!(!engine.state().current_frame.unwrap().is_virtual);
    }

    #[test]
    fn identical_streams_produce_identical_node_sequences() {
        let run = |bpm: f32| -> Vec<String> {
            let mut engine = KineticEngine::new();
            engine.initialize(&catalogue());
            engine.set_bpm(bpm);

            let mut nodes = Vec::new();
            for i in 0..60u64 {
                let now = i * 50;
                let energy = 0.1 + 0.012 * i as f32;
                engine.update(now, sample(now, energy.min(1.0)));
                nodes.push(engine.state().current_node);
            }
            nodes
        };

        assert_eq!(run(120.0), run(120.0));
        assert_eq!(run(87.5), run(87.5));
    }

    #[test]
    fn set_bpm_rejects_non_positive_values() {
        let mut engine = KineticEngine::new();
        engine.set_bpm(174.0);
        assert_eq!(engine.bpm(), 174.0);

        engine.set_bpm(0.0);
        assert_eq!(engine.bpm(), 174.0);
        engine.set_bpm(-3.0);
        assert_eq!(engine.bpm(), 174.0);
        engine.set_bpm(f32::NAN);
        assert_eq!(engine.bpm(), 174.0);
    }

    #[test]
    fn beat_counter_cycles_frames_within_a_node() {
        let mut engine = KineticEngine::new();
        engine.initialize(&catalogue());
        engine.set_mode(EngineMode::Pattern);
        engine.force_transition("groove");
        engine.set_bpm(120.0); // one beat every 500 ms

        let first = engine
            .update(0, sample(0, 0.5))
            .frame
            .expect("groove has frames")
            .pose;
        let second = engine
            .update(600, sample(600, 0.5))
            .frame
            .expect("groove has frames")
            .pose;

        assert_ne!(first, second);
    }
}
