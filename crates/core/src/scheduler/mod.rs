//! Lookahead event scheduler.
//!
//! While active, a repeating [`TimerTask::Tick`] samples the audio clock. Each
//! tick inspects the window `[from, now + lookahead)` and either returns the
//! dispatches that are already due or arms one-shot timers for the ones that
//! fall later in the window. `from` is the current clock reading, or the end
//! of the previous window when polling fell behind the clock.
//!
//! The scheduler only decides; the context executes the returned
//! [`Dispatch`]es against the rendering surface and the callback registry.

use crate::{
    config::{RewindPolicy, SchedulerConfig},
    registry::{self, ScheduledCallback},
    timer::{TimerId, TimerQueue},
    Segment, TimelineEvent,
};

/// A unit of work that is due now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispatch {
    /// Fire the registry callback at `index` for the active audio source.
    Callback { index: usize },
    /// Set the animation of event `event` running, `elapsed_ms` into it.
    StartAnimation { event: usize, elapsed_ms: f64 },
    /// Recompute and apply the move of event `event`.
    Move { event: usize },
    /// Return the animation of event `event` to its paused initial state
    /// after the clock moved back before its start.
    ResetAnimation { event: usize },
}

/// Payload stored in the timer queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerTask {
    Tick,
    /// A dispatch armed during a tick. Stale once `epoch` no longer matches.
    Deferred { dispatch: Dispatch, epoch: u64 },
}

/// Progress of one segment event within the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    Pending,
    Armed(TimerId),
    Started,
    /// Elapsed before it was ever observed inside its window.
    Done,
}

/// Span inspected by a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub from_ms: f64,
    pub now_ms: f64,
    pub until_ms: f64,
}

impl Window {
    /// Inclusive lower bound, exclusive upper bound.
    pub fn contains(&self, time_ms: f64) -> bool {
        time_ms >= self.from_ms && time_ms < self.until_ms
    }
}

#[derive(Debug)]
pub struct EventScheduler {
    lookahead_ms: f64,
    poll_interval_ms: f64,
    rewind: RewindPolicy,
    epoch: u64,
    tick_timer: Option<TimerId>,
    cursor_ms: Option<f64>,
    last_seen_ms: Option<f64>,
    phases: Vec<EventPhase>,
    durations: Vec<Option<f64>>,
    armed_callbacks: Vec<(usize, TimerId)>,
}

impl EventScheduler {
    pub fn new(config: &SchedulerConfig, rewind: RewindPolicy) -> Self {
        Self {
            lookahead_ms: config.lookahead_ms,
            poll_interval_ms: config.poll_interval_ms(),
            rewind,
            epoch: 0,
            tick_timer: None,
            cursor_ms: None,
            last_seen_ms: None,
            phases: Vec::new(),
            durations: Vec::new(),
            armed_callbacks: Vec::new(),
        }
    }

    pub fn lookahead_ms(&self) -> f64 {
        self.lookahead_ms
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_active(&self) -> bool {
        self.tick_timer.is_some()
    }

    /// Whether a deferred task armed in `epoch` may still run.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.is_active() && self.epoch == epoch
    }

    pub fn phase(&self, event: usize) -> Option<EventPhase> {
        self.phases.get(event).copied()
    }

    /// Resolved duration of an event, `None` while provisional.
    pub fn duration_ms(&self, event: usize) -> Option<f64> {
        self.durations.get(event).copied().flatten()
    }

    /// Resets all per-event progress for a newly active segment. The caller
    /// deactivates first so no armed timer outlives the old segment.
    pub fn load_segment(&mut self, segment: &Segment, track_length_ms: Option<f64>) {
        self.phases = vec![EventPhase::Pending; segment.events.len()];
        self.durations = segment
            .events
            .iter()
            .map(|event| match event {
                TimelineEvent::Animation(animation) => animation.duration_ms.or(track_length_ms),
                TimelineEvent::Move(movement) => Some(movement.duration_ms),
            })
            .collect();
        self.cursor_ms = None;
        self.last_seen_ms = None;
        self.armed_callbacks.clear();
    }

    /// Fills in implicit animation durations once the track length is known.
    pub fn resolve_track_length(&mut self, segment: &Segment, length_ms: f64) {
        for (slot, event) in self.durations.iter_mut().zip(&segment.events) {
            if let TimelineEvent::Animation(animation) = event {
                if animation.duration_ms.is_none() {
                    *slot = Some(length_ms);
                }
            }
        }
    }

    /// Starts the repeating tick. Returns `false` if it was already running.
    pub fn activate(&mut self, timers: &mut TimerQueue<TimerTask>) -> bool {
        if self.is_active() {
            return false;
        }
        self.epoch += 1;
        self.tick_timer = Some(timers.set_interval(self.poll_interval_ms, TimerTask::Tick));
        true
    }

    /// Cancels the tick and every armed one-shot, returning their entries to
    /// the unarmed state so a later activation can re-arm them.
    pub fn deactivate(
        &mut self,
        timers: &mut TimerQueue<TimerTask>,
        callbacks: &mut [ScheduledCallback],
    ) {
        if let Some(id) = self.tick_timer.take() {
            timers.cancel(id);
        }
        self.disarm(timers, callbacks);
        self.epoch += 1;
        self.cursor_ms = None;
    }

    fn disarm(&mut self, timers: &mut TimerQueue<TimerTask>, callbacks: &mut [ScheduledCallback]) {
        for (index, id) in self.armed_callbacks.drain(..) {
            timers.cancel(id);
            if let Some(callback) = callbacks.get_mut(index) {
                callback.armed = false;
            }
        }
        for phase in &mut self.phases {
            if let EventPhase::Armed(id) = *phase {
                timers.cancel(id);
                *phase = EventPhase::Pending;
            }
        }
    }

    /// Inspects the lookahead window at clock position `now_ms`.
    ///
    /// Registry callbacks are evaluated before segment events. Within each
    /// group, entries are visited in list order.
    pub fn tick(
        &mut self,
        now_ms: f64,
        clock_paused: bool,
        segment: &Segment,
        callbacks: &mut [ScheduledCallback],
        timers: &mut TimerQueue<TimerTask>,
    ) -> Vec<Dispatch> {
        if clock_paused || !self.is_active() {
            return Vec::new();
        }

        let mut due = Vec::new();
        if self.last_seen_ms.is_some_and(|last| now_ms < last) {
            due = self.rewind_to(now_ms, segment, callbacks, timers);
        }
        self.last_seen_ms = Some(now_ms);

        let window = Window {
            from_ms: self.cursor_ms.map_or(now_ms, |cursor| cursor.min(now_ms)),
            now_ms,
            until_ms: now_ms + self.lookahead_ms,
        };
        self.cursor_ms = Some(window.until_ms);

        let epoch = self.epoch;

        for (index, callback) in callbacks.iter_mut().enumerate() {
            if callback.fired || callback.armed || !window.contains(callback.timestamp_ms()) {
                continue;
            }
            callback.armed = true;
            let dispatch = Dispatch::Callback { index };
            let delay = callback.timestamp_ms() - now_ms;
            if delay <= 0.0 {
                due.push(dispatch);
            } else {
                let id = timers.set_timeout(delay, TimerTask::Deferred { dispatch, epoch });
                self.armed_callbacks.push((index, id));
                tracing::debug!(index, delay_ms = delay, "armed callback");
            }
        }

        for (index, event) in segment.events.iter().enumerate() {
            match event {
                TimelineEvent::Animation(animation) => {
                    self.plan_animation(index, animation.start_time_ms, &window, timers, &mut due)
                }
                TimelineEvent::Move(movement) => {
                    self.plan_move(index, movement.start_time_ms, movement.duration_ms, &window, &mut due)
                }
            }
        }

        due
    }

    fn plan_animation(
        &mut self,
        index: usize,
        start_ms: f64,
        window: &Window,
        timers: &mut TimerQueue<TimerTask>,
        due: &mut Vec<Dispatch>,
    ) {
        if self.phases.get(index) != Some(&EventPhase::Pending) {
            return;
        }
        let Some(duration) = self.duration_ms(index) else {
            tracing::trace!(event = index, "animation duration unresolved, leaving provisional");
            return;
        };

        let now = window.now_ms;
        let end_ms = start_ms + duration;
        if start_ms <= now && now < end_ms {
            self.phases[index] = EventPhase::Started;
            due.push(Dispatch::StartAnimation {
                event: index,
                elapsed_ms: now - start_ms,
            });
        } else if end_ms <= now {
            self.phases[index] = EventPhase::Done;
        } else if start_ms < window.until_ms {
            let dispatch = Dispatch::StartAnimation {
                event: index,
                elapsed_ms: 0.0,
            };
            let id = timers.set_timeout(
                start_ms - now,
                TimerTask::Deferred {
                    dispatch,
                    epoch: self.epoch,
                },
            );
            self.phases[index] = EventPhase::Armed(id);
        }
    }

    /// Moves are applied synchronously as soon as they enter the window.
    fn plan_move(
        &mut self,
        index: usize,
        start_ms: f64,
        duration_ms: f64,
        window: &Window,
        due: &mut Vec<Dispatch>,
    ) {
        if self.phases.get(index) != Some(&EventPhase::Pending) {
            return;
        }
        if start_ms < window.from_ms && start_ms + duration_ms <= window.now_ms {
            self.phases[index] = EventPhase::Done;
        } else if start_ms < window.until_ms {
            self.phases[index] = EventPhase::Started;
            due.push(Dispatch::Move { event: index });
        }
    }

    /// Events whose time window contains `now_ms` but were never started,
    /// for resynchronising visual state on play.
    pub fn due_on_resume(&mut self, segment: &Segment, now_ms: f64) -> Vec<Dispatch> {
        let mut due = Vec::new();
        for (index, event) in segment.events.iter().enumerate() {
            if self.phases.get(index) != Some(&EventPhase::Pending) {
                continue;
            }
            let Some(duration) = self.duration_ms(index) else {
                continue;
            };
            let start = event.start_time_ms();
            if !(start <= now_ms && now_ms < start + duration) {
                continue;
            }
            self.phases[index] = EventPhase::Started;
            due.push(match event {
                TimelineEvent::Animation(_) => Dispatch::StartAnimation {
                    event: index,
                    elapsed_ms: now_ms - start,
                },
                TimelineEvent::Move(_) => Dispatch::Move { event: index },
            });
        }
        due
    }

    /// Records that an armed dispatch has run.
    pub fn deferred_fired(&mut self, dispatch: &Dispatch) {
        match *dispatch {
            Dispatch::Callback { index } => {
                self.armed_callbacks.retain(|(armed, _)| *armed != index);
            }
            Dispatch::StartAnimation { event, .. } | Dispatch::Move { event } => {
                if let Some(phase) = self.phases.get_mut(event) {
                    *phase = EventPhase::Started;
                }
            }
            Dispatch::ResetAnimation { .. } => {}
        }
    }

    /// Returns resets for started animations that now lie ahead of the clock.
    fn rewind_to(
        &mut self,
        now_ms: f64,
        segment: &Segment,
        callbacks: &mut [ScheduledCallback],
        timers: &mut TimerQueue<TimerTask>,
    ) -> Vec<Dispatch> {
        self.disarm(timers, callbacks);
        self.cursor_ms = None;
        if self.rewind == RewindPolicy::KeepFired {
            tracing::debug!(position_ms = now_ms, "clock moved backwards, keeping fired entries");
            return Vec::new();
        }

        let rearmed = registry::rearm_from(callbacks, now_ms);
        tracing::debug!(position_ms = now_ms, rearmed, "clock moved backwards");

        let mut resets = Vec::new();
        for (index, event) in segment.events.iter().enumerate() {
            let start = event.start_time_ms();
            let unfinished = self
                .duration_ms(index)
                .map_or(true, |duration| now_ms < start + duration);
            let rerun = match event {
                // Animations still in progress restart at the new position.
                TimelineEvent::Animation(_) => unfinished,
                TimelineEvent::Move(_) => start >= now_ms,
            };
            if !rerun {
                continue;
            }
            let started = self.phases[index] == EventPhase::Started;
            if started && matches!(event, TimelineEvent::Animation(_)) && now_ms < start {
                resets.push(Dispatch::ResetAnimation { event: index });
            }
            self.phases[index] = EventPhase::Pending;
        }
        resets
    }
}
