//! Timeline context.
//!
//! [`TimelineContext`] owns every collaborator of a playing timeline: the
//! audio clock, the rendering surface, the animation executor, the compiled
//! keyframes, the callback registry and the lookahead scheduler. Hosts drive
//! it by forwarding audio signals to [`TimelineContext::handle_signal`] and by
//! calling [`TimelineContext::pump`] with the current wall-clock time.

use std::collections::HashMap;
use std::fmt;

use kurbo::Vec2;

use crate::{
    audio::{AudioClock, AudioSignal},
    keyframes::{Attachment, KeyframeCompiler},
    placement::{self, MoveRequest, PlacementOptions},
    registry::{CallbackId, CallbackRegistry},
    render::{AnimationExecutor, PlayState, RenderSurface, TransitionId},
    scheduler::{Dispatch, EventPhase, EventScheduler, TimerTask},
    session::{PlaybackState, TrackAdvance, TrackSession},
    timer::TimerQueue,
    AppConfig, Placement, Result, Segment, TimelineDefinition, TimelineError, TimelineEvent,
};

pub struct TimelineContext<A, S, E> {
    definition: TimelineDefinition,
    config: AppConfig,
    audio: A,
    surface: S,
    executor: E,
    compiler: KeyframeCompiler,
    registry: CallbackRegistry,
    session: TrackSession,
    scheduler: EventScheduler,
    timers: TimerQueue<TimerTask>,
    /// Transitions started by move events of the active segment.
    moves: HashMap<usize, TransitionId>,
}

impl<A, S, E> TimelineContext<A, S, E>
where
    A: AudioClock,
    S: RenderSurface,
    E: AnimationExecutor,
{
    /// Validates the inputs, loads the first segment's audio and compiles the
    /// keyframes of the whole timeline.
    pub fn new(
        definition: TimelineDefinition,
        config: AppConfig,
        mut audio: A,
        mut surface: S,
        executor: E,
    ) -> Result<Self> {
        definition.validate()?;
        config.validate()?;

        let registry = CallbackRegistry::with_sources(
            definition.segments.iter().map(|segment| segment.audio_source.as_str()),
        );
        let session = TrackSession::new(definition.len(), config.playback.end_of_timeline);
        let mut scheduler = EventScheduler::new(&config.scheduler, config.playback.rewind);

        let mut compiler = KeyframeCompiler::new();
        let compiled = compiler.compile_timeline(&definition, 0, &mut surface);

        let first = &definition.segments[0];
        audio.set_source(&first.audio_source);
        let track_length = audio.duration_ms();
        scheduler.load_segment(first, track_length);
        if let Some(length) = track_length {
            compiler.resolve_track_length(0, length, &mut surface);
        }

        tracing::info!(
            segments = definition.len(),
            animations = compiled,
            source = %first.audio_source,
            "timeline ready"
        );

        Ok(Self {
            definition,
            config,
            audio,
            surface,
            executor,
            compiler,
            registry,
            session,
            scheduler,
            timers: TimerQueue::new(),
            moves: HashMap::new(),
        })
    }

    pub fn definition(&self) -> &TimelineDefinition {
        &self.definition
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    /// Direct access to the clock, e.g. for seeking.
    pub fn audio_mut(&mut self) -> &mut A {
        &mut self.audio
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Direct access to the surface, e.g. to mount elements late.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn compiler(&self) -> &KeyframeCompiler {
        &self.compiler
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &EventScheduler {
        &self.scheduler
    }

    pub fn state(&self) -> PlaybackState {
        self.session.state()
    }

    pub fn is_playing(&self) -> bool {
        self.session.is_playing()
    }

    pub fn current_track(&self) -> usize {
        self.session.current_track()
    }

    pub fn is_finished(&self) -> bool {
        self.session.is_finished()
    }

    pub fn active_segment(&self) -> &Segment {
        &self.definition.segments[self.session.current_track()]
    }

    /// Number of live timers, including the polling tick.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Registers `action` to run once when `audio_source` reaches
    /// `timestamp_ms`. May be called at any time, including mid-playback.
    ///
    /// Calling it again for the same source and timestamp replaces the action
    /// rather than adding a second entry, so it is safe to repeat on every
    /// mount. Use [`TimelineContext::register_keyed_callback`] for several
    /// independent actions at one timestamp.
    pub fn register_timeline_callback<F>(
        &mut self,
        action: F,
        timestamp_ms: f64,
        audio_source: &str,
    ) -> CallbackId
    where
        F: FnMut() + 'static,
    {
        self.warn_unknown_source(audio_source);
        let id = self.registry.register(audio_source, timestamp_ms, action);
        tracing::debug!(source = audio_source, timestamp_ms, ?id, "registered callback");
        id
    }

    /// Keyed variant of [`TimelineContext::register_timeline_callback`]:
    /// registering the same key twice replaces the action.
    pub fn register_keyed_callback<F>(
        &mut self,
        key: &str,
        action: F,
        timestamp_ms: f64,
        audio_source: &str,
    ) -> CallbackId
    where
        F: FnMut() + 'static,
    {
        self.warn_unknown_source(audio_source);
        self.registry
            .register_keyed(audio_source, key, timestamp_ms, action)
    }

    fn warn_unknown_source(&self, audio_source: &str) {
        if !self.registry.knows_source(audio_source) {
            tracing::warn!(source = audio_source, "callback registered for a source outside the timeline");
        }
    }

    /// Attaches the animation targeting `event_id` in the active segment to
    /// an element that was mounted after the timeline compiled.
    ///
    /// The animation is set running at the clock's offset into it when the
    /// session is playing and the clock lies within its window; otherwise it
    /// is attached paused.
    pub fn register_animated_element(&mut self, event_id: &str) -> Result<()> {
        let track = self.session.current_track();
        let now = self.audio.current_time_ms();
        let segment = &self.definition.segments[track];

        let candidates: Vec<(usize, f64)> = segment
            .animations_for(event_id)
            .map(|(index, animation)| (index, animation.start_time_ms))
            .collect();
        let in_window = |&(index, start): &(usize, f64)| {
            self.scheduler
                .duration_ms(index)
                .is_some_and(|duration| start <= now && now < start + duration)
        };
        let chosen = candidates
            .iter()
            .copied()
            .find(|candidate| in_window(candidate))
            .or_else(|| candidates.first().copied());

        let Some((index, start)) = chosen else {
            tracing::warn!(event_id, "no animation targets this element in the active segment");
            return Err(TimelineError::msg(format!(
                "no animation targets `{event_id}` in segment {track}"
            )));
        };

        let running = self.session.is_playing()
            && in_window(&(index, start))
            && self.scheduler.phase(index) == Some(EventPhase::Started);
        let attachment = if running {
            Attachment::running_from(now - start)
        } else {
            Attachment::PAUSED
        };

        let compiled = self
            .compiler
            .for_event(track, index)
            .ok_or_else(|| TimelineError::msg(format!("animation for `{event_id}` was never compiled")))?;
        self.compiler
            .attach(&mut self.surface, &compiled.name, attachment)
            .inspect_err(|err| tracing::warn!(event_id, %err, "late attach failed"))
    }

    /// Starts or resumes playback.
    pub fn play(&mut self) {
        if !self.session.play() {
            return;
        }
        tracing::info!(track = self.session.current_track(), "play");
        if self.audio.is_paused() {
            self.audio.play();
        }
        self.scheduler.activate(&mut self.timers);
        self.resync_running();
    }

    /// Pauses playback, freezing every visual of the active segment in place.
    pub fn pause(&mut self) {
        if !self.session.pause() {
            return;
        }
        tracing::info!(track = self.session.current_track(), "pause");
        if !self.audio.is_paused() {
            self.audio.pause();
        }
        self.deactivate();
        self.pause_visuals();
    }

    /// Reacts to a lifecycle signal from the audio element.
    pub fn handle_signal(&mut self, signal: AudioSignal) {
        tracing::debug!(?signal, "audio signal");
        match signal {
            AudioSignal::MetadataLoaded => self.resolve_track_length(),
            AudioSignal::Played => {
                if self.session.play() {
                    self.scheduler.activate(&mut self.timers);
                }
                self.resync_running();
            }
            AudioSignal::Paused => {
                if self.session.pause() {
                    self.deactivate();
                }
                self.pause_visuals();
            }
            AudioSignal::Ended => self.next_track(),
        }
    }

    /// Runs every timer due at wall-clock time `now_ms`. Returns how many
    /// dispatches were executed.
    pub fn pump(&mut self, now_ms: f64) -> usize {
        self.timers.advance_to(now_ms);
        let mut executed = 0;
        while let Some((_, task)) = self.timers.pop_due() {
            match task {
                TimerTask::Tick => {
                    for dispatch in self.tick() {
                        self.execute(dispatch);
                        executed += 1;
                    }
                }
                TimerTask::Deferred { dispatch, epoch } => {
                    if !self.scheduler.is_current(epoch) || !self.session.is_playing() {
                        tracing::trace!(?dispatch, epoch, "dropping stale timer");
                        continue;
                    }
                    self.scheduler.deferred_fired(&dispatch);
                    self.execute(dispatch);
                    executed += 1;
                }
            }
        }
        executed
    }

    /// Moves `source` next to `target` using the configured duration and
    /// offsets. `placement` falls back to the configured default.
    pub fn move_element(
        &mut self,
        source: &str,
        target: &str,
        placement: Option<&str>,
    ) -> Result<Vec2> {
        let placement = match placement {
            Some(text) => text.parse::<Placement>().inspect_err(|err| {
                tracing::warn!(%err, "rejecting move");
            })?,
            None => self.config.movement.default_placement,
        };
        let request = MoveRequest {
            source,
            target,
            placement,
            options: self.placement_options(),
            duration_ms: self.config.movement.duration_ms,
        };
        let outcome = placement::move_element(&mut self.surface, &mut self.executor, &request)?;
        tracing::debug!(source, target, %placement, dx = outcome.delta.x, dy = outcome.delta.y, "moved element");
        Ok(outcome.delta)
    }

    /// Stops playback and cancels every timer.
    pub fn teardown(&mut self) {
        self.deactivate();
        self.timers.clear();
        self.session.pause();
        if !self.audio.is_paused() {
            self.audio.pause();
        }
        self.moves.clear();
        tracing::info!("timeline torn down");
    }

    fn placement_options(&self) -> PlacementOptions {
        PlacementOptions {
            side_offset: self.config.movement.side_offset,
            align_offset: self.config.movement.align_offset,
        }
    }

    fn tick(&mut self) -> Vec<Dispatch> {
        if !self.session.is_playing() {
            return Vec::new();
        }
        let now = self.audio.current_time_ms();
        let paused = self.audio.is_paused();
        let segment = &self.definition.segments[self.session.current_track()];
        self.scheduler.tick(
            now,
            paused,
            segment,
            self.registry.entries_mut(&segment.audio_source),
            &mut self.timers,
        )
    }

    fn execute(&mut self, dispatch: Dispatch) {
        let track = self.session.current_track();
        let segment = &self.definition.segments[track];
        match dispatch {
            Dispatch::Callback { index } => {
                if self.registry.fire(&segment.audio_source, index) {
                    tracing::debug!(source = %segment.audio_source, index, "callback fired");
                }
            }
            Dispatch::StartAnimation { event, .. } => {
                let Some(compiled) = self.compiler.for_event(track, event) else {
                    return;
                };
                // Elapsed time is taken from the clock so late timers stay in sync.
                let start = segment.events[event].start_time_ms();
                let elapsed = (self.audio.current_time_ms() - start).max(0.0);
                match self
                    .compiler
                    .attach(&mut self.surface, &compiled.name, Attachment::running_from(elapsed))
                {
                    Ok(()) => tracing::debug!(animation = %compiled.name, elapsed_ms = elapsed, "animation started"),
                    Err(err) => tracing::warn!(animation = %compiled.name, %err, "animation start skipped"),
                }
            }
            Dispatch::ResetAnimation { event } => {
                let Some(compiled) = self.compiler.for_event(track, event) else {
                    return;
                };
                match self
                    .compiler
                    .attach(&mut self.surface, &compiled.name, Attachment::PAUSED)
                {
                    Ok(()) => tracing::debug!(animation = %compiled.name, "animation reset"),
                    Err(err) => tracing::debug!(animation = %compiled.name, %err, "reset skipped"),
                }
            }
            Dispatch::Move { event } => {
                let Some(TimelineEvent::Move(movement)) = segment.events.get(event) else {
                    return;
                };
                let request = MoveRequest {
                    source: &movement.source_selector,
                    target: &movement.target_selector,
                    placement: movement.anchor,
                    options: PlacementOptions {
                        side_offset: self.config.movement.side_offset,
                        align_offset: self.config.movement.align_offset,
                    },
                    duration_ms: movement.duration_ms,
                };
                match placement::move_element(&mut self.surface, &mut self.executor, &request) {
                    Ok(outcome) => {
                        if let Some(id) = outcome.transition {
                            self.moves.insert(event, id);
                        }
                    }
                    Err(err) => tracing::warn!(event, %err, "move skipped"),
                }
            }
        }
    }

    fn deactivate(&mut self) {
        let segment = &self.definition.segments[self.session.current_track()];
        self.scheduler
            .deactivate(&mut self.timers, self.registry.entries_mut(&segment.audio_source));
    }

    /// Freezes every animation target and move of the active segment.
    fn pause_visuals(&mut self) {
        let segment = &self.definition.segments[self.session.current_track()];
        for event in &segment.events {
            if let TimelineEvent::Animation(animation) = event {
                self.surface.set_play_state(&animation.target_id, PlayState::Paused);
            }
        }
        for id in self.moves.values() {
            self.executor.pause(*id);
        }
    }

    /// Brings visual state in line with the clock after playback resumes.
    fn resync_running(&mut self) {
        if !self.session.is_playing() {
            return;
        }
        let now = self.audio.current_time_ms();
        let segment = &self.definition.segments[self.session.current_track()];

        for (index, event) in segment.events.iter().enumerate() {
            if self.scheduler.phase(index) != Some(EventPhase::Started) {
                continue;
            }
            match event {
                TimelineEvent::Animation(animation) => {
                    self.surface.set_play_state(&animation.target_id, PlayState::Running);
                }
                TimelineEvent::Move(_) => {
                    if let Some(id) = self.moves.get(&index) {
                        self.executor.resume(*id);
                    }
                }
            }
        }

        for dispatch in self.scheduler.due_on_resume(segment, now) {
            self.execute(dispatch);
        }
    }

    fn resolve_track_length(&mut self) {
        let Some(length) = self.audio.duration_ms() else {
            return;
        };
        let track = self.session.current_track();
        let segment = &self.definition.segments[track];
        self.scheduler.resolve_track_length(segment, length);
        let resolved = self
            .compiler
            .resolve_track_length(track, length, &mut self.surface);
        tracing::debug!(track, length_ms = length, resolved, "track length known");
    }

    fn next_track(&mut self) {
        self.deactivate();
        self.moves.clear();

        match self.session.advance() {
            TrackAdvance::Finished => {
                self.pause_visuals();
                tracing::info!(track = self.session.current_track(), "timeline finished");
            }
            advance @ (TrackAdvance::Next(_) | TrackAdvance::Wrapped) => {
                let track = self.session.current_track();
                tracing::info!(track, ?advance, "advancing to next segment");
                self.load_track(track);
                self.session.play();
                self.audio.play();
                self.scheduler.activate(&mut self.timers);
                self.resync_running();
            }
        }
    }

    fn load_track(&mut self, track: usize) {
        let segment = &self.definition.segments[track];
        self.audio.set_source(&segment.audio_source);
        self.registry.reset_source(&segment.audio_source);
        self.compiler.attach_segment(track, &mut self.surface);

        let track_length = self.audio.duration_ms();
        self.scheduler.load_segment(segment, track_length);
        if let Some(length) = track_length {
            self.compiler
                .resolve_track_length(track, length, &mut self.surface);
        }
    }
}

impl<A, S, E> fmt::Debug for TimelineContext<A, S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimelineContext")
            .field("segments", &self.definition.len())
            .field("session", &self.session)
            .field("scheduler", &self.scheduler)
            .field("callbacks", &self.registry.len())
            .field("timers", &self.timers.len())
            .finish()
    }
}
