use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Placement, Result, TimelineError};

/// Top-level configuration structure for a timeline host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub movement: MovementConfig,
    pub playback: PlaybackConfig,
}

impl AppConfig {
    /// Parses a configuration from JSON. Missing sections fall back to defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let scheduler = &self.scheduler;
        if !(scheduler.lookahead_ms.is_finite() && scheduler.lookahead_ms > 0.0) {
            return Err(TimelineError::invalid_config(
                "scheduler.lookaheadMs must be a positive number",
            ));
        }
        let poll = scheduler.poll_interval_ms();
        if !(poll.is_finite() && poll > 0.0) {
            return Err(TimelineError::invalid_config(
                "scheduler.pollIntervalMs must be a positive number",
            ));
        }
        if !(self.movement.duration_ms.is_finite() && self.movement.duration_ms > 0.0) {
            return Err(TimelineError::invalid_config(
                "movement.durationMs must be a positive number",
            ));
        }
        Ok(())
    }
}

/// Configuration of the polling scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Forward span, relative to the clock, inspected on every tick.
    pub lookahead_ms: f64,
    /// Tick period. Defaults to the lookahead when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<f64>,
}

impl SchedulerConfig {
    pub fn poll_interval_ms(&self) -> f64 {
        self.poll_interval_ms.unwrap_or(self.lookahead_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: 250.0,
            poll_interval_ms: None,
        }
    }
}

/// Settings for element-to-element repositioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MovementConfig {
    /// Duration of the quick transition used by imperative moves.
    pub duration_ms: f64,
    pub default_placement: Placement,
    pub side_offset: f64,
    pub align_offset: f64,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            duration_ms: 1000.0,
            default_placement: Placement::default(),
            side_offset: 0.0,
            align_offset: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaybackConfig {
    pub end_of_timeline: EndOfTimeline,
    pub rewind: RewindPolicy,
}

/// What happens when the last segment's audio ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndOfTimeline {
    /// Stay on the last segment and pause.
    #[default]
    Stop,
    /// Start over from the first segment.
    Loop,
}

/// How already-fired entries behave when the clock moves backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewindPolicy {
    /// Entries at or after the new clock position fire again.
    #[default]
    Rearm,
    /// Fired entries stay fired for the rest of the session.
    KeepFired,
}
