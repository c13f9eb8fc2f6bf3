//! Core library for the Dance Kinetic choreography engine.
//!
//! The crate converts a live stream of audio-feature samples into a
//! continuously updated choreography pose. Each module owns a distinct
//! subsystem: the transition graph that encodes which poses may follow
//! which, the lookahead buffer that turns recent history into a trend, the
//! engine state machine that ties them together once per tick, and the
//! mechanical multiplier that derives virtual frame variants. Feature
//! extraction, asset loading and rendering live outside this crate.

pub mod engine;
pub mod error;
pub mod frame;
pub mod graph;
pub mod lookahead;
pub mod mechanical;

pub use engine::{
    EngineConfig, EngineMode, EngineState, EngineUpdate, KineticEngine, LookaheadReport, Phase,
};
pub use error::{KineticError, Result};
pub use frame::{EnergyTier, GeneratedFrame};
pub use graph::{KineticGraph, KineticNode};
pub use lookahead::{AudioFeatureSample, AudioLookaheadBuffer, EnergyTrend};
