//! Core library for the audio-synchronised animation timeline.
//!
//! A [`TimelineDefinition`] lists audio segments and the visual events that
//! play alongside them. [`TimelineContext`] compiles the events into named
//! keyframe animations, keeps them paused, and starts, pauses or repositions
//! them as a lookahead scheduler observes the audio clock. The audio element,
//! the rendering surface and the animation executor are traits so hosts can
//! plug in a browser bridge or the headless implementations shipped here.

pub mod audio;
pub mod config;
pub mod context;
pub mod error;
pub mod keyframes;
pub mod placement;
pub mod registry;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod timeline;
pub mod timer;

pub use audio::{AudioClock, AudioSignal, SimulatedAudio};
pub use config::{
    AppConfig, EndOfTimeline, MovementConfig, PlaybackConfig, RewindPolicy, SchedulerConfig,
};
pub use context::TimelineContext;
pub use error::{Result, TimelineError};
pub use keyframes::{CompiledAnimation, KeyframeCompiler};
pub use placement::{compute_delta, Alignment, Placement, PlacementOptions, Side};
pub use registry::{CallbackId, CallbackRegistry, ScheduledCallback};
pub use render::{AnimationExecutor, HeadlessExecutor, HeadlessSurface, PlayState, RenderSurface};
pub use scheduler::{Dispatch, EventScheduler};
pub use session::{PlaybackState, TrackSession};
pub use timeline::{
    AnimationEvent, MoveEvent, PropertySnapshot, Segment, TimelineDefinition, TimelineEvent,
};
pub use timer::TimerQueue;
