//! Headless demo host for the tilestream engine.
//!
//! Registers a synthetic quadtree data source, flies a camera down toward
//! the terrain and back up, and logs what the engine decides to render each
//! tick. Useful for eyeballing refinement behavior and eviction timing
//! without a renderer attached.

mod synthetic;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use glam::DVec3;
use tilestream::{
    DataSourceId, RefinePolicy, RefinementMode, RootDescriptor, SchemeLoader, StreamingEngine,
    ViewParameters,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use synthetic::{SyntheticTerrainLoader, TilePayload};

/// Streams a synthetic terrain pyramid and reports refinement activity.
#[derive(Debug, Parser)]
#[command(name = "tilestream", version, about)]
struct Args {
    /// Deepest quadtree level to generate.
    #[arg(long, default_value_t = 6)]
    depth: u32,

    /// Number of update ticks to run.
    #[arg(long, default_value_t = 240)]
    ticks: u64,

    /// Screen-space error threshold in pixels.
    #[arg(long, default_value_t = 16.0)]
    threshold: f64,

    /// Viewport height in pixels.
    #[arg(long, default_value_t = 1080.0)]
    screen_height: f64,

    /// Vertical field of view in degrees.
    #[arg(long, default_value_t = 60.0)]
    fov: f64,

    /// Ticks an off-screen subtree survives before eviction.
    #[arg(long, default_value_t = 30)]
    grace: u64,

    /// Per-source detail multiplier.
    #[arg(long, default_value_t = 1.0)]
    detail: f64,

    /// Use additive refinement instead of replacement.
    #[arg(long)]
    additive: bool,

    /// World-space edge length of the terrain, in meters.
    #[arg(long, default_value_t = 65536.0)]
    extent: f64,
}

/// Camera altitude over the flight: descends toward the terrain for the
/// first two thirds of the run, then climbs back out.
fn altitude_at(tick: u64, total: u64, extent: f64) -> f64 {
    let high = extent;
    let low = extent / 256.0;
    let descent_end = total * 2 / 3;
    if tick <= descent_end {
        let t = tick as f64 / descent_end.max(1) as f64;
        high + (low - high) * t
    } else {
        let t = (tick - descent_end) as f64 / (total - descent_end).max(1) as f64;
        low + (high - low) * t
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    info!(?args, "starting synthetic streaming demo");

    let policy = RefinePolicy {
        eviction_grace_ticks: args.grace,
        ..Default::default()
    };
    let mut engine: StreamingEngine<TilePayload> = StreamingEngine::with_policy(policy);

    let content_type = engine.content_types().generate();
    let mut tileset = SchemeLoader::new();
    tileset.register_scheme(
        "synthetic",
        Arc::new(SyntheticTerrainLoader::new(
            content_type,
            args.depth,
            64.0,
            args.extent,
        )),
    )?;
    engine.register_loader(content_type, Arc::new(tileset))?;

    let mut root = RootDescriptor::new(SyntheticTerrainLoader::root_uri(), content_type);
    root.geometric_error = 64.0;
    root.detail_multiplier = args.detail;
    root.refinement_mode = if args.additive {
        RefinementMode::Add
    } else {
        RefinementMode::Replace
    };
    engine.register_data_source(DataSourceId::new(1), root)?;

    let fov = args.fov.to_radians();
    for tick in 1..=args.ticks {
        let camera = DVec3::new(0.0, altitude_at(tick, args.ticks, args.extent), 0.0);
        let view = ViewParameters::perspective(camera, args.screen_height, fov, args.threshold);
        let render = engine.tick(&view);

        for failure in engine.take_load_failures() {
            warn!(node = %failure.node_id, uri = %failure.uri, error = %failure.error, "load failure");
        }

        if tick % 10 == 0 || tick == args.ticks {
            let stats = engine.stats();
            let deepest = render
                .entries()
                .iter()
                .map(|entry| entry.payload.level)
                .max()
                .unwrap_or(0);
            info!(
                tick,
                altitude_m = camera.y,
                rendered = render.len(),
                deepest_level = deepest,
                nodes = stats.nodes,
                loading = stats.in_flight,
                unloaded_this_tick = stats.last_tick.unloaded,
                "tick"
            );
        }

        // Loads are in-process compute; a short sleep lets them land so the
        // next tick can pick the completions up.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    engine.unregister_data_source(DataSourceId::new(1));
    engine.flush().await;
    info!(ticks = args.ticks, "demo complete");
    Ok(())
}
