//! Declarative timeline data model.
//!
//! A [`TimelineDefinition`] is an ordered list of [`Segment`]s, one audio
//! source each, with the timed events that play alongside it. The model is
//! read-only to the engine once supplied.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Placement, Result, TimelineError};

/// Playback-ordered list of segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimelineDefinition {
    pub segments: Vec<Segment>,
}

impl TimelineDefinition {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let definition: Self = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn validate(&self) -> Result<()> {
        if self.segments.is_empty() {
            return Err(TimelineError::invalid_timeline("timeline has no segments"));
        }

        for (segment_index, segment) in self.segments.iter().enumerate() {
            if segment.audio_source.trim().is_empty() {
                return Err(TimelineError::invalid_timeline(format!(
                    "segment {segment_index} has an empty audio source"
                )));
            }

            for (event_index, event) in segment.events.iter().enumerate() {
                event.validate().map_err(|reason| {
                    TimelineError::invalid_timeline(format!(
                        "segment {segment_index}, event {event_index}: {reason}"
                    ))
                })?;
            }
        }
        Ok(())
    }
}

/// One audio track plus its timed events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub audio_source: String,
    #[serde(default)]
    pub events: Vec<TimelineEvent>,
}

impl Segment {
    pub fn new(audio_source: impl Into<String>, events: Vec<TimelineEvent>) -> Self {
        Self {
            audio_source: audio_source.into(),
            events,
        }
    }

    /// Animation events that target `target_id`, with their event indices.
    pub fn animations_for<'a>(
        &'a self,
        target_id: &'a str,
    ) -> impl Iterator<Item = (usize, &'a AnimationEvent)> + 'a {
        self.events
            .iter()
            .enumerate()
            .filter_map(move |(index, event)| match event {
                TimelineEvent::Animation(animation) if animation.target_id == target_id => {
                    Some((index, animation))
                }
                _ => None,
            })
    }
}

/// A timed visual event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TimelineEvent {
    #[serde(rename = "animation")]
    Animation(AnimationEvent),
    #[serde(rename = "moveElementTo")]
    Move(MoveEvent),
}

impl TimelineEvent {
    pub fn start_time_ms(&self) -> f64 {
        match self {
            TimelineEvent::Animation(animation) => animation.start_time_ms,
            TimelineEvent::Move(movement) => movement.start_time_ms,
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let start = self.start_time_ms();
        if !(start.is_finite() && start >= 0.0) {
            return Err(format!("startTimeMs must be >= 0, got {start}"));
        }

        match self {
            TimelineEvent::Animation(animation) => {
                if let Some(duration) = animation.duration_ms {
                    check_duration(duration)?;
                }
                for snapshot in &animation.keyframes {
                    if !(0.0..=1.0).contains(&snapshot.offset) {
                        return Err(format!(
                            "keyframe offset {} is outside [0, 1]",
                            snapshot.offset
                        ));
                    }
                }
                Ok(())
            }
            TimelineEvent::Move(movement) => check_duration(movement.duration_ms),
        }
    }
}

fn check_duration(duration: f64) -> std::result::Result<(), String> {
    if duration.is_finite() && duration > 0.0 {
        Ok(())
    } else {
        Err(format!("durationMs must be > 0, got {duration}"))
    }
}

/// Keyframe animation bound to one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationEvent {
    pub target_id: String,
    #[serde(default)]
    pub start_time_ms: f64,
    /// Defaults to the length of the enclosing audio track.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    pub keyframes: Vec<PropertySnapshot>,
}

/// Repositions one element onto an anchor of another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveEvent {
    pub source_selector: String,
    pub target_selector: String,
    #[serde(default)]
    pub start_time_ms: f64,
    pub duration_ms: f64,
    #[serde(default)]
    pub anchor: Placement,
}

/// Style properties at a fractional position within an animation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySnapshot {
    #[serde(default)]
    pub offset: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub easing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite: Option<String>,
    #[serde(flatten)]
    pub properties: BTreeMap<String, Value>,
}

impl PropertySnapshot {
    pub fn at(offset: f64) -> Self {
        Self {
            offset,
            ..Default::default()
        }
    }

    pub fn with(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(property.into(), value.into());
        self
    }

    pub fn eased(mut self, easing: impl Into<String>) -> Self {
        self.easing = Some(easing.into());
        self
    }
}
