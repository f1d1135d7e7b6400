use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use audio_timeline_core::{
    AppConfig, AudioClock, HeadlessExecutor, HeadlessSurface, SimulatedAudio,
    TimelineContext, TimelineDefinition, TimelineEvent,
};
use clap::{Parser, Subcommand};
use kurbo::Rect;
use tracing_subscriber::EnvFilter;

fn main() -> audio_timeline_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { timeline } => run_validate(&timeline),
        Commands::Simulate {
            timeline,
            config,
            track_length_ms,
            step_ms,
            max_ms,
            mark,
        } => run_simulate(SimulateArgs {
            timeline: &timeline,
            config: config.as_deref(),
            track_length_ms,
            step_ms,
            max_ms,
            marks: &mark,
        }),
    }
}

fn run_validate(path: &Path) -> audio_timeline_core::Result<()> {
    let definition = TimelineDefinition::load(path)?;
    for (index, segment) in definition.segments.iter().enumerate() {
        let moves = segment
            .events
            .iter()
            .filter(|event| matches!(event, TimelineEvent::Move(_)))
            .count();
        tracing::info!(
            index,
            source = %segment.audio_source,
            animations = segment.events.len() - moves,
            moves,
            "segment"
        );
    }
    tracing::info!(?path, segments = definition.len(), "timeline is valid");
    Ok(())
}

struct SimulateArgs<'a> {
    timeline: &'a Path,
    config: Option<&'a Path>,
    track_length_ms: f64,
    step_ms: f64,
    max_ms: Option<f64>,
    marks: &'a [f64],
}

fn run_simulate(args: SimulateArgs<'_>) -> audio_timeline_core::Result<()> {
    let definition = TimelineDefinition::load(args.timeline)?;
    let config = match args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    tracing::info!(timeline = ?args.timeline, ?config, "starting simulation");

    let surface = headless_surface(&definition);
    let max_ms = args
        .max_ms
        .unwrap_or(args.track_length_ms * definition.len() as f64 + 1_000.0);
    let step_ms = args.step_ms.max(1.0);
    let sources: Vec<String> = definition
        .segments
        .iter()
        .map(|segment| segment.audio_source.clone())
        .collect();

    let mut context = TimelineContext::new(
        definition,
        config,
        SimulatedAudio::new(args.track_length_ms),
        surface,
        HeadlessExecutor::new(),
    )?;

    for source in &sources {
        for &at in args.marks {
            let label = source.clone();
            context.register_timeline_callback(
                move || tracing::info!(source = %label, at_ms = at, "marker"),
                at,
                source,
            );
        }
    }

    let mut wall_ms = 0.0;
    let mut dispatched = 0;
    context.play();
    loop {
        for signal in context.audio_mut().drain_signals() {
            context.handle_signal(signal);
        }
        dispatched += context.pump(wall_ms);

        if context.is_finished() {
            break;
        }
        if wall_ms >= max_ms {
            tracing::warn!(wall_ms, "stopping simulation at time limit");
            break;
        }
        wall_ms += step_ms;
        context.audio_mut().advance(step_ms);
    }

    tracing::info!(
        wall_ms,
        dispatched,
        track = context.current_track(),
        position_ms = context.audio().current_time_ms(),
        finished = context.is_finished(),
        transitions = context.executor().transitions().len(),
        "simulation complete"
    );
    context.teardown();
    Ok(())
}

/// Mounts every selector the timeline references on a staggered grid.
fn headless_surface(definition: &TimelineDefinition) -> HeadlessSurface {
    let selectors: BTreeSet<&str> = definition
        .segments
        .iter()
        .flat_map(|segment| &segment.events)
        .flat_map(|event| match event {
            TimelineEvent::Animation(animation) => vec![animation.target_id.as_str()],
            TimelineEvent::Move(movement) => vec![
                movement.source_selector.as_str(),
                movement.target_selector.as_str(),
            ],
        })
        .collect();

    let mut surface = HeadlessSurface::new();
    for (index, selector) in selectors.into_iter().enumerate() {
        let x = (index % 4) as f64 * 160.0;
        let y = (index / 4) as f64 * 120.0;
        surface.insert_element(selector, Rect::new(x, y, x + 100.0, y + 60.0));
    }
    tracing::debug!(elements = surface.element_count(), "headless surface ready");
    surface
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-synchronised animation timelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a timeline definition and check it for errors.
    Validate {
        /// Path to the timeline JSON file.
        timeline: PathBuf,
    },
    /// Play a timeline against a simulated clock and headless surface.
    Simulate {
        /// Path to the timeline JSON file.
        timeline: PathBuf,
        /// Optional configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Length of every simulated audio track.
        #[arg(long, default_value_t = 10_000.0)]
        track_length_ms: f64,
        /// Wall-clock step between pumps.
        #[arg(long, default_value_t = 50.0)]
        step_ms: f64,
        /// Stop after this much wall-clock time. Defaults to one pass over all tracks.
        #[arg(long)]
        max_ms: Option<f64>,
        /// Register a logging callback at this position on every track.
        #[arg(long)]
        mark: Vec<f64>,
    },
}
