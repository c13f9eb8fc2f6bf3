use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use dance_kinetic_core::{
    AudioFeatureSample, EnergyTier, GeneratedFrame, KineticEngine, KineticGraph,
};
use tracing_subscriber::EnvFilter;

fn main() -> dance_kinetic_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            seconds,
            bpm,
            frames,
        } => run_demo(seconds, bpm, frames.as_deref()),
        Commands::Topology => run_topology(),
    }
}

/// Drives the engine with a synthetic energy sweep (rise to a peak, then
/// fall away) and logs every pose transition, so the decision logic can be
/// watched without a renderer attached.
fn run_demo(seconds: f32, bpm: f32, frames: Option<&Path>) -> dance_kinetic_core::Result<()> {
    tracing::info!(seconds, bpm, ?frames, "starting choreography demo");

    let catalogue = match frames {
        Some(path) => load_catalogue(path)?,
        None => demo_catalogue(),
    };

    let mut engine = KineticEngine::new();
    engine.set_bpm(bpm);
    engine.initialize(&catalogue);

    let tick_ms = 50u64;
    let ticks = ((seconds.max(0.0) * 1_000.0) / tick_ms as f32) as u64;
    let mut previous_node = engine.state().current_node;

    for i in 0..ticks {
        let now = i * tick_ms;
        let progress = i as f32 / ticks.max(1) as f32;
        // Triangle sweep: build to full energy at the midpoint, then decay.
        let energy = if progress < 0.5 {
            progress * 2.0
        } else {
            (1.0 - progress) * 2.0
        };
        let sample = AudioFeatureSample {
            bass: energy,
            mid: energy * 0.8,
            high: energy * 0.6,
            energy,
            timestamp_ms: now,
        };

        let update = engine.update(now, sample);
        let state = engine.state();
        if state.current_node != previous_node {
            tracing::info!(
                t_ms = now,
                from = %previous_node,
                to = %state.current_node,
                phase = ?update.phase,
                trend = ?update.lookahead.trend,
                energy = update.lookahead.average_energy,
                pose = update.frame.as_ref().map(|f| f.pose.as_str()),
                "transition"
            );
            previous_node = state.current_node;
        }
    }

    tracing::info!(final_node = %engine.state().current_node, "demo finished");
    Ok(())
}

/// Prints the default transition graph as JSON for diagnostics.
fn run_topology() -> dance_kinetic_core::Result<()> {
    let graph = KineticGraph::new();
    let json = serde_json::to_string_pretty(graph.all_nodes())?;
    println!("{json}");
    Ok(())
}

fn load_catalogue(path: &Path) -> dance_kinetic_core::Result<Vec<GeneratedFrame>> {
    let contents = std::fs::read_to_string(path)?;
    let frames = serde_json::from_str(&contents)?;
    Ok(frames)
}

/// Minimal built-in catalogue with one frame per pose family, enough to see
/// every node light up during the sweep.
fn demo_catalogue() -> Vec<GeneratedFrame> {
    let families = [
        ("idle", EnergyTier::Low),
        ("lean_left", EnergyTier::Low),
        ("lean_right", EnergyTier::Low),
        ("groove", EnergyTier::Mid),
        ("step_touch", EnergyTier::Mid),
        ("drop", EnergyTier::High),
        ("chaos", EnergyTier::High),
    ];

    families
        .iter()
        .map(|(family, energy)| GeneratedFrame {
            url: format!("https://cdn.example/{family}_01.png"),
            pose: format!("{family}_01"),
            energy: *energy,
            direction: "front".to_string(),
            kind: "dance".to_string(),
            role: None,
            is_virtual: false,
            mechanical_fx: None,
            virtual_zoom: None,
            virtual_offset_y: None,
        })
        .collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive choreography engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a synthetic energy sweep through the engine and log transitions.
    Demo {
        /// Duration of the sweep in seconds.
        #[arg(short, long, default_value_t = 8.0)]
        seconds: f32,
        /// Tempo used for beat bookkeeping.
        #[arg(short, long, default_value_t = 120.0)]
        bpm: f32,
        /// Optional JSON frame catalogue to load instead of the built-in
        /// demo poses.
        #[arg(short, long)]
        frames: Option<PathBuf>,
    },
    /// Print the default transition graph as JSON.
    Topology,
}
