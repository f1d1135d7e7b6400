use crate::config::EndOfTimeline;

/// Playback state of a track session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Before the first `play()`. Never re-entered.
    Idle,
    Playing,
    Paused,
}

/// Outcome of advancing past the current track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackAdvance {
    /// A further segment is now current.
    Next(usize),
    /// The last segment ended and the session looped to the first one.
    Wrapped,
    /// The last segment ended and the session stopped on it.
    Finished,
}

/// `Idle -> Playing <-> Paused` state machine plus the current track index.
#[derive(Debug, Clone)]
pub struct TrackSession {
    state: PlaybackState,
    current_track: usize,
    track_count: usize,
    end_policy: EndOfTimeline,
    finished: bool,
}

impl TrackSession {
    pub fn new(track_count: usize, end_policy: EndOfTimeline) -> Self {
        Self {
            state: PlaybackState::Idle,
            current_track: 0,
            track_count,
            end_policy,
            finished: false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn current_track(&self) -> usize {
        self.current_track
    }

    pub fn track_count(&self) -> usize {
        self.track_count
    }

    /// Whether the last segment ended under [`EndOfTimeline::Stop`].
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns `true` if the state changed.
    pub fn play(&mut self) -> bool {
        if self.state == PlaybackState::Playing {
            return false;
        }
        self.state = PlaybackState::Playing;
        self.finished = false;
        true
    }

    /// Returns `true` if the state changed. Pausing while idle is ignored.
    pub fn pause(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        self.state = PlaybackState::Paused;
        true
    }

    /// Moves to the next track after the current one ended. Never leaves the
    /// index out of range.
    pub fn advance(&mut self) -> TrackAdvance {
        let next = self.current_track + 1;
        if next < self.track_count {
            self.current_track = next;
            return TrackAdvance::Next(next);
        }

        match self.end_policy {
            EndOfTimeline::Loop => {
                self.current_track = 0;
                TrackAdvance::Wrapped
            }
            EndOfTimeline::Stop => {
                if self.state == PlaybackState::Playing {
                    self.state = PlaybackState::Paused;
                }
                self.finished = true;
                TrackAdvance::Finished
            }
        }
    }
}
