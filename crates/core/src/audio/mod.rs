use std::collections::{HashMap, VecDeque};

/// Lifecycle signals emitted by an audio source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSignal {
    /// Total duration is now known.
    MetadataLoaded,
    Played,
    Paused,
    Ended,
}

/// Audio playback primitive the timeline synchronises against.
pub trait AudioClock {
    /// Current playback position in milliseconds.
    fn current_time_ms(&self) -> f64;

    /// Length of the loaded source, available once metadata has loaded.
    fn duration_ms(&self) -> Option<f64>;

    fn is_paused(&self) -> bool;

    fn play(&mut self);

    fn pause(&mut self);

    /// Swaps the loaded source. The position resets to zero.
    fn set_source(&mut self, source: &str);

    fn seek(&mut self, position_ms: f64);
}

/// Deterministic clock that only moves when [`SimulatedAudio::advance`] is called.
///
/// Signals a browser audio element would dispatch are queued and can be
/// drained by the host with [`SimulatedAudio::drain_signals`].
#[derive(Debug, Clone)]
pub struct SimulatedAudio {
    lengths: HashMap<String, f64>,
    default_length_ms: f64,
    defer_metadata: bool,
    source: Option<String>,
    position_ms: f64,
    paused: bool,
    metadata_loaded: bool,
    pending: VecDeque<AudioSignal>,
}

impl SimulatedAudio {
    /// Creates a clock whose sources all last `default_length_ms`.
    pub fn new(default_length_ms: f64) -> Self {
        Self {
            lengths: HashMap::new(),
            default_length_ms: default_length_ms.max(0.0),
            defer_metadata: false,
            source: None,
            position_ms: 0.0,
            paused: true,
            metadata_loaded: false,
            pending: VecDeque::new(),
        }
    }

    /// Overrides the length of a single source.
    pub fn with_track(mut self, source: impl Into<String>, length_ms: f64) -> Self {
        self.lengths.insert(source.into(), length_ms.max(0.0));
        self
    }

    /// Keeps metadata unloaded after a source change until
    /// [`SimulatedAudio::load_metadata`] is called.
    pub fn with_deferred_metadata(mut self, defer: bool) -> Self {
        self.defer_metadata = defer;
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn length_ms(&self) -> f64 {
        self.source
            .as_ref()
            .and_then(|source| self.lengths.get(source))
            .copied()
            .unwrap_or(self.default_length_ms)
    }

    pub fn load_metadata(&mut self) {
        if self.source.is_some() && !self.metadata_loaded {
            self.metadata_loaded = true;
            self.pending.push_back(AudioSignal::MetadataLoaded);
        }
    }

    /// Moves the playhead forward while playing. Returns `true` when the
    /// source reached its end during this step.
    pub fn advance(&mut self, delta_ms: f64) -> bool {
        if self.paused || self.source.is_none() {
            return false;
        }

        let length = self.length_ms();
        self.position_ms = (self.position_ms + delta_ms.max(0.0)).min(length);
        if self.position_ms >= length {
            // Reaching the end pauses without a separate pause signal.
            self.paused = true;
            self.pending.push_back(AudioSignal::Ended);
            return true;
        }
        false
    }

    pub fn drain_signals(&mut self) -> Vec<AudioSignal> {
        self.pending.drain(..).collect()
    }
}

impl AudioClock for SimulatedAudio {
    fn current_time_ms(&self) -> f64 {
        self.position_ms
    }

    fn duration_ms(&self) -> Option<f64> {
        self.metadata_loaded.then(|| self.length_ms())
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn play(&mut self) {
        if self.source.is_none() || !self.paused {
            return;
        }
        if self.position_ms >= self.length_ms() {
            self.position_ms = 0.0;
        }
        self.paused = false;
        self.pending.push_back(AudioSignal::Played);
    }

    fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        self.pending.push_back(AudioSignal::Paused);
    }

    fn set_source(&mut self, source: &str) {
        self.source = Some(source.to_string());
        self.position_ms = 0.0;
        self.metadata_loaded = false;
        if !self.defer_metadata {
            self.load_metadata();
        }
    }

    fn seek(&mut self, position_ms: f64) {
        self.position_ms = position_ms.clamp(0.0, self.length_ms());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_only_while_playing() {
        let mut audio = SimulatedAudio::new(1_000.0);
        audio.set_source("a.mp3");
        audio.advance(100.0);
        assert_eq!(audio.current_time_ms(), 0.0);

        audio.play();
        audio.advance(100.0);
        assert_eq!(audio.current_time_ms(), 100.0);
        assert_eq!(
            audio.drain_signals(),
            vec![AudioSignal::MetadataLoaded, AudioSignal::Played]
        );
    }

    #[test]
    fn reaching_the_end_emits_ended() {
        let mut audio = SimulatedAudio::new(1_000.0).with_track("short.mp3", 150.0);
        audio.set_source("short.mp3");
        audio.play();
        audio.drain_signals();

        assert!(!audio.advance(100.0));
        assert!(audio.advance(100.0));
        assert!(audio.is_paused());
        assert_eq!(audio.current_time_ms(), 150.0);
        assert_eq!(audio.drain_signals(), vec![AudioSignal::Ended]);
    }

    #[test]
    fn deferred_metadata_hides_duration() {
        let mut audio = SimulatedAudio::new(2_000.0).with_deferred_metadata(true);
        audio.set_source("late.mp3");
        assert_eq!(audio.duration_ms(), None);

        audio.load_metadata();
        assert_eq!(audio.duration_ms(), Some(2_000.0));
        assert_eq!(audio.drain_signals(), vec![AudioSignal::MetadataLoaded]);
    }
}
