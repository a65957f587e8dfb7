//! Spritecore headless demo.
//!
//! Drives one [`Engine`] against the [`HeadlessHost`] for a fixed number of
//! frames. The scene exercises the core end to end:
//!
//! - a `Start` sink spawns the cat's script, which glides, turns and
//!   clones the cat
//! - the clone walks off on its own thread
//! - a simulated click on the cat reaches its click sink
//! - a deadline timer fires and is logged
//!
//! # Running
//!
//! ```sh
//! cargo run --release -- --frames 240 --fps 60
//! ```

use std::path::PathBuf;

use clap::Parser;
use glam::Vec2;
use log::{error, info, warn};

use spritecore::components::shapedesc::ShapeDesc;
use spritecore::components::tween::{Easing, TweenSpec};
use spritecore::game::Engine;
use spritecore::resources::engineconfig::EngineConfig;
use spritecore::resources::host::HeadlessHost;
use spritecore::systems::tween::{move_by, run_tween, turn_to};

const CAT_DESC: &str = r#"{
    "name": "cat",
    "kind": "sprite",
    "position": [0, 0],
    "default_animation": "idle",
    "animations": {
        "idle": { "frames": 2, "fps": 4, "looped": true },
        "walk": { "frames": 4, "fps": 8, "looped": true, "cue": "steps" }
    },
    "collider": { "kind": "rect", "params": [32, 32] }
}"#;

/// Spritecore headless demo
#[derive(Parser)]
#[command(version, about = "Runs a headless spritecore scene and logs the result.")]
struct Cli {
    /// INI configuration file. Defaults are used when it can't be read.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of frames to simulate.
    #[arg(long, default_value_t = 180)]
    frames: u32,

    /// Simulated frames per second.
    #[arg(long, default_value_t = 60.0)]
    fps: f64,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::with_path(path),
        None => EngineConfig::new(),
    };
    if let Err(e) = config.load_from_file() {
        warn!("Using default configuration: {}", e);
    }

    let mut engine = Engine::new(config, HeadlessHost::new());
    if let Err(e) = setup_scene(&engine) {
        error!("Failed to set up the demo scene: {}", e);
        return;
    }

    let fps = if cli.fps > 0.0 { cli.fps } else { 60.0 };
    let dt = 1.0 / fps;
    let click_frame = (fps * 2.5) as u32;

    engine.on_engine_start();
    for frame in 0..cli.frames {
        if frame == click_frame {
            engine.on_mouse_button(Vec2::new(100.0, 50.0), true);
            engine.on_mouse_button(Vec2::new(100.0, 50.0), false);
        }
        engine.step(dt);
        if engine.should_quit() {
            warn!("Quit requested at frame {}", frame);
            break;
        }
    }

    report(&engine);
    engine.on_engine_destroy();
}

fn setup_scene(engine: &Engine<HeadlessHost>) -> Result<(), serde_json::Error> {
    let services = engine.services();
    let desc = ShapeDesc::from_json(CAT_DESC)?;
    let cat = services.shapes.create_from_desc(&desc);

    services.timers.register(1.5);
    services
        .sinks
        .on_timer(|_, deadline| info!("Timer at {:.2}s fired", deadline));

    services.sinks.on_shape_click(cat.id(), |services, shape| {
        info!("Clicked {} '{}'", shape.id(), shape.name());
        services.spawn(Some(shape), "spin", |ctx| {
            let me = ctx.shape()?;
            turn_to(ctx, &me, me.heading() + 180.0, 0.25)?;
            Ok(())
        });
    });
    services
        .sinks
        .on_stage_click(|_, pos| info!("Stage clicked at ({:.1}, {:.1})", pos.x, pos.y));

    let owner = cat.clone();
    services.sinks.on_start(move |services| {
        services.spawn(Some(&owner), "cat", |ctx| {
            let cat = ctx.shape()?;
            ctx.wait_seconds(0.25)?;
            let walk = TweenSpec::glide(cat.position(), Vec2::new(100.0, 50.0), 1.0)
                .with_easing(Easing::QuadInOut)
                .with_animation("walk");
            run_tween(ctx, &cat, walk)?;
            turn_to(ctx, &cat, 180.0, 0.5)?;

            let clone = ctx.services().shapes.clone_shape(&cat)?;
            ctx.spawn(Some(&clone), "clone", |ctx| {
                let me = ctx.shape()?;
                move_by(ctx, &me, Vec2::new(0.0, -80.0), 0.5)?;
                Ok(())
            });
            info!("Cat done at {:?}", cat.position());
            Ok(())
        });
    });
    Ok(())
}

fn report(engine: &Engine<HeadlessHost>) {
    let services = engine.services();
    info!(
        "Simulated {:.2}s over {} frames",
        engine.clock().elapsed,
        engine.clock().frame_count
    );
    for shape in services.shapes.snapshot().iter() {
        info!(
            "{} '{}': pos=({:.1}, {:.1}) heading={:.1} layer={}",
            shape.id(),
            shape.name(),
            shape.position().x,
            shape.position().y,
            shape.heading(),
            shape.render_layer()
        );
    }
    info!(
        "Live threads: {}, host proxies: {}, dropped events: {}",
        services.scheduler.live_count(),
        engine.host().live_proxies(),
        services.mailbox.dropped()
    );
}
