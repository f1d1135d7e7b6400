use std::collections::{BTreeMap, HashMap};
use std::fmt;

use kurbo::Rect;

use crate::PropertySnapshot;

/// Style property carrying the animation play state.
pub const PLAY_STATE_PROPERTY: &str = "animation-play-state";

/// Tri-state animation play state of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Running,
    Paused,
    None,
}

impl PlayState {
    pub fn as_css(self) -> &'static str {
        match self {
            PlayState::Running => "running",
            PlayState::Paused => "paused",
            PlayState::None => "",
        }
    }

    pub fn from_css(value: &str) -> Self {
        match value.trim() {
            "running" => PlayState::Running,
            "paused" => PlayState::Paused,
            _ => PlayState::None,
        }
    }
}

impl fmt::Display for PlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayState::None => f.write_str("none"),
            other => f.write_str(other.as_css()),
        }
    }
}

/// Surface owning the visual elements the timeline drives.
///
/// Elements are addressed by selector strings such as `#hero`.
pub trait RenderSurface {
    fn contains(&self, selector: &str) -> bool;

    /// Bounding rectangle in the surface's shared coordinate space.
    fn bounding_rect(&self, selector: &str) -> Option<Rect>;

    /// Sets a style property. Returns `false` when no element matches.
    fn set_style(&mut self, selector: &str, property: &str, value: &str) -> bool;

    fn style(&self, selector: &str, property: &str) -> Option<String>;

    /// Installs a named keyframe rule set, replacing any rule with the same name.
    fn inject_keyframes(&mut self, name: &str, rule: &str);

    fn play_state(&self, selector: &str) -> PlayState {
        self.style(selector, PLAY_STATE_PROPERTY)
            .map(|value| PlayState::from_css(&value))
            .unwrap_or(PlayState::None)
    }

    fn set_play_state(&mut self, selector: &str, state: PlayState) -> bool {
        self.set_style(selector, PLAY_STATE_PROPERTY, state.as_css())
    }
}

/// Handle to an ad-hoc transition started by an [`AnimationExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    None,
    /// Keep the final keyframe applied once the transition finishes.
    Forwards,
}

/// Short transition played by the executor, independent of compiled rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub keyframes: Vec<PropertySnapshot>,
    pub duration_ms: f64,
    pub fill: FillMode,
}

/// Low-level per-element animation player.
pub trait AnimationExecutor {
    /// Plays `transition` on the element. `None` when the element cannot be
    /// animated.
    fn animate(&mut self, selector: &str, transition: Transition) -> Option<TransitionId>;

    fn pause(&mut self, id: TransitionId);

    fn resume(&mut self, id: TransitionId);
}

#[derive(Debug, Clone, Default)]
struct HeadlessElement {
    rect: Rect,
    styles: BTreeMap<String, String>,
}

/// In-memory surface that records styles and injected rules.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    elements: HashMap<String, HeadlessElement>,
    keyframes: BTreeMap<String, String>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts (or re-measures) an element.
    pub fn insert_element(&mut self, selector: impl Into<String>, rect: Rect) {
        self.elements
            .entry(selector.into())
            .or_default()
            .rect = rect;
    }

    pub fn remove_element(&mut self, selector: &str) -> bool {
        self.elements.remove(selector).is_some()
    }

    pub fn keyframes(&self, name: &str) -> Option<&str> {
        self.keyframes.get(name).map(String::as_str)
    }

    pub fn keyframe_count(&self) -> usize {
        self.keyframes.len()
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }
}

impl RenderSurface for HeadlessSurface {
    fn contains(&self, selector: &str) -> bool {
        self.elements.contains_key(selector)
    }

    fn bounding_rect(&self, selector: &str) -> Option<Rect> {
        self.elements.get(selector).map(|element| element.rect)
    }

    fn set_style(&mut self, selector: &str, property: &str, value: &str) -> bool {
        match self.elements.get_mut(selector) {
            Some(element) => {
                if value.is_empty() {
                    element.styles.remove(property);
                } else {
                    element
                        .styles
                        .insert(property.to_string(), value.to_string());
                }
                true
            }
            None => false,
        }
    }

    fn style(&self, selector: &str, property: &str) -> Option<String> {
        self.elements
            .get(selector)
            .and_then(|element| element.styles.get(property))
            .cloned()
    }

    fn inject_keyframes(&mut self, name: &str, rule: &str) {
        self.keyframes.insert(name.to_string(), rule.to_string());
    }
}

/// Transition captured by [`HeadlessExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTransition {
    pub id: TransitionId,
    pub selector: String,
    pub transition: Transition,
    pub paused: bool,
}

/// Executor that records transitions instead of playing them.
#[derive(Debug, Default)]
pub struct HeadlessExecutor {
    transitions: Vec<RecordedTransition>,
    next_id: u64,
}

impl HeadlessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transitions(&self) -> &[RecordedTransition] {
        &self.transitions
    }

    fn find_mut(&mut self, id: TransitionId) -> Option<&mut RecordedTransition> {
        self.transitions.iter_mut().find(|recorded| recorded.id == id)
    }
}

impl AnimationExecutor for HeadlessExecutor {
    fn animate(&mut self, selector: &str, transition: Transition) -> Option<TransitionId> {
        let id = TransitionId(self.next_id);
        self.next_id += 1;
        self.transitions.push(RecordedTransition {
            id,
            selector: selector.to_string(),
            transition,
            paused: false,
        });
        Some(id)
    }

    fn pause(&mut self, id: TransitionId) {
        if let Some(recorded) = self.find_mut(id) {
            recorded.paused = true;
        }
    }

    fn resume(&mut self, id: TransitionId) {
        if let Some(recorded) = self.find_mut(id) {
            recorded.paused = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_state_round_trips_through_styles() {
        let mut surface = HeadlessSurface::new();
        surface.insert_element("#a", Rect::new(0.0, 0.0, 1.0, 1.0));

        assert_eq!(surface.play_state("#a"), PlayState::None);
        assert!(surface.set_play_state("#a", PlayState::Running));
        assert_eq!(surface.play_state("#a"), PlayState::Running);
        assert!(surface.set_play_state("#a", PlayState::None));
        assert_eq!(surface.style("#a", PLAY_STATE_PROPERTY), None);
    }

    #[test]
    fn styling_a_missing_element_reports_false() {
        let mut surface = HeadlessSurface::new();
        assert!(!surface.set_play_state("#ghost", PlayState::Paused));
        assert_eq!(surface.play_state("#ghost"), PlayState::None);
    }

    #[test]
    fn injected_rules_replace_by_name() {
        let mut surface = HeadlessSurface::new();
        surface.inject_keyframes("spin", "@keyframes spin {}");
        surface.inject_keyframes("spin", "@keyframes spin { 0% {} }");
        assert_eq!(surface.keyframe_count(), 1);
        assert_eq!(surface.keyframes("spin"), Some("@keyframes spin { 0% {} }"));
    }

    #[test]
    fn executor_tracks_pause_state() {
        let mut executor = HeadlessExecutor::new();
        let id = executor
            .animate(
                "#a",
                Transition {
                    keyframes: Vec::new(),
                    duration_ms: 10.0,
                    fill: FillMode::None,
                },
            )
            .unwrap();
        executor.pause(id);
        assert!(executor.transitions()[0].paused);
        executor.resume(id);
        assert!(!executor.transitions()[0].paused);
    }
}
