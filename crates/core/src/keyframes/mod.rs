//! Keyframe compilation.
//!
//! Turns the declarative [`PropertySnapshot`] lists of animation events into
//! named `@keyframes` rule sets, injects them into the rendering surface and
//! binds them to their target elements in a paused state.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::{
    render::{PlayState, RenderSurface},
    AnimationEvent, PropertySnapshot, Result, TimelineDefinition, TimelineError, TimelineEvent,
};

/// Keys of a snapshot that describe the keyframe rather than a style.
const CONTROL_PROPERTIES: [&str; 3] = ["offset", "easing", "composite"];

/// How the duration of a compiled animation is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnimationDuration {
    Explicit(f64),
    /// Length of the enclosing audio track, `None` until metadata loads.
    TrackLength(Option<f64>),
}

impl AnimationDuration {
    pub fn resolved_ms(&self) -> Option<f64> {
        match *self {
            AnimationDuration::Explicit(ms) => Some(ms),
            AnimationDuration::TrackLength(ms) => ms,
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.resolved_ms().is_none()
    }
}

/// One `N% { ... }` block.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeRule {
    pub percent: f64,
    pub declarations: Vec<(String, String)>,
}

/// A registered, named, pausable animation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledAnimation {
    pub name: String,
    pub target_id: String,
    pub segment: usize,
    pub event: usize,
    pub rules: Vec<KeyframeRule>,
    pub duration: AnimationDuration,
}

impl CompiledAnimation {
    pub fn duration_ms(&self) -> Option<f64> {
        self.duration.resolved_ms()
    }

    /// Renders the rule set as CSS text.
    pub fn to_css(&self) -> String {
        let mut css = format!("@keyframes {} {{", self.name);
        for rule in &self.rules {
            css.push_str(&format!(" {}% {{", format_number(rule.percent)));
            for (property, value) in &rule.declarations {
                css.push_str(&format!(" {property}: {value};"));
            }
            css.push_str(" }");
        }
        css.push_str(" }");
        css
    }
}

/// Attach parameters for [`KeyframeCompiler::attach`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attachment {
    pub play_state: PlayState,
    /// Negative values start the animation part-way through.
    pub delay_ms: f64,
}

impl Attachment {
    pub const PAUSED: Attachment = Attachment {
        play_state: PlayState::Paused,
        delay_ms: 0.0,
    };

    pub fn running_from(elapsed_ms: f64) -> Self {
        Self {
            play_state: PlayState::Running,
            delay_ms: -elapsed_ms.max(0.0),
        }
    }
}

/// Registry of compiled animations keyed by animation name.
#[derive(Debug, Default)]
pub struct KeyframeCompiler {
    animations: BTreeMap<String, CompiledAnimation>,
}

impl KeyframeCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles one event. Compiling the same segment/event again replaces the
    /// earlier result.
    pub fn compile(
        &mut self,
        segment: usize,
        event: usize,
        animation: &AnimationEvent,
    ) -> &CompiledAnimation {
        let name = animation_name(&animation.target_id, segment, event);
        let mut rules: Vec<KeyframeRule> =
            animation.keyframes.iter().map(build_rule).collect();
        rules.sort_by(|a, b| a.percent.total_cmp(&b.percent));

        let duration = match animation.duration_ms {
            Some(ms) => AnimationDuration::Explicit(ms),
            None => AnimationDuration::TrackLength(None),
        };

        let compiled = CompiledAnimation {
            name: name.clone(),
            target_id: animation.target_id.clone(),
            segment,
            event,
            rules,
            duration,
        };
        self.animations.insert(name.clone(), compiled);
        &self.animations[&name]
    }

    /// Compiles every animation in `definition`, injects the rules and
    /// attaches the animations of `active_segment` to their elements.
    pub fn compile_timeline<S>(
        &mut self,
        definition: &TimelineDefinition,
        active_segment: usize,
        surface: &mut S,
    ) -> usize
    where
        S: RenderSurface + ?Sized,
    {
        let mut count = 0;
        for (segment_index, segment) in definition.segments.iter().enumerate() {
            for (event_index, event) in segment.events.iter().enumerate() {
                let TimelineEvent::Animation(animation) = event else {
                    continue;
                };
                let compiled = self.compile(segment_index, event_index, animation);
                surface.inject_keyframes(&compiled.name, &compiled.to_css());
                count += 1;
            }
        }
        self.attach_segment(active_segment, surface);
        count
    }

    /// Attaches every animation of `segment` in the paused state. Missing
    /// elements are logged and left for a later attach.
    pub fn attach_segment<S>(&self, segment: usize, surface: &mut S)
    where
        S: RenderSurface + ?Sized,
    {
        for compiled in self.segment_animations(segment) {
            if let Err(err) = self.attach(surface, &compiled.name, Attachment::PAUSED) {
                tracing::warn!(animation = %compiled.name, %err, "deferring attach");
            }
        }
    }

    /// Binds a compiled animation to its live element.
    pub fn attach<S>(&self, surface: &mut S, name: &str, attachment: Attachment) -> Result<()>
    where
        S: RenderSurface + ?Sized,
    {
        let compiled = self
            .animations
            .get(name)
            .ok_or_else(|| TimelineError::msg(format!("unknown animation `{name}`")))?;
        let selector = compiled.target_id.as_str();
        if !surface.contains(selector) {
            return Err(TimelineError::MissingElement(selector.to_string()));
        }

        let duration = compiled.duration_ms().unwrap_or_else(|| {
            tracing::trace!(animation = name, "attaching with provisional duration");
            0.0
        });
        surface.set_style(selector, "animation-name", &compiled.name);
        surface.set_style(
            selector,
            "animation-duration",
            &format!("{}ms", format_number(duration)),
        );
        surface.set_style(
            selector,
            "animation-delay",
            &format!("{}ms", format_number(attachment.delay_ms)),
        );
        surface.set_play_state(selector, attachment.play_state);
        Ok(())
    }

    /// Finalises the still-provisional durations of `segment` with the loaded
    /// track length and pushes them to any mounted element. Returns how many
    /// were resolved.
    pub fn resolve_track_length<S>(&mut self, segment: usize, length_ms: f64, surface: &mut S) -> usize
    where
        S: RenderSurface + ?Sized,
    {
        let mut resolved = 0;
        for compiled in self.animations.values_mut() {
            if compiled.segment != segment
                || compiled.duration != AnimationDuration::TrackLength(None)
            {
                continue;
            }
            compiled.duration = AnimationDuration::TrackLength(Some(length_ms));
            resolved += 1;

            let selector = compiled.target_id.as_str();
            if surface.contains(selector) {
                surface.set_style(
                    selector,
                    "animation-duration",
                    &format!("{}ms", format_number(length_ms)),
                );
                surface.set_play_state(selector, PlayState::Paused);
            }
        }
        resolved
    }

    pub fn get(&self, name: &str) -> Option<&CompiledAnimation> {
        self.animations.get(name)
    }

    /// Compiled animation for an event of a segment.
    pub fn for_event(&self, segment: usize, event: usize) -> Option<&CompiledAnimation> {
        self.animations
            .values()
            .find(|compiled| compiled.segment == segment && compiled.event == event)
    }

    pub fn segment_animations(&self, segment: usize) -> impl Iterator<Item = &CompiledAnimation> {
        self.animations
            .values()
            .filter(move |compiled| compiled.segment == segment)
    }

    pub fn len(&self) -> usize {
        self.animations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.animations.is_empty()
    }
}

/// Rule-set name for an event: the element id made CSS-safe, suffixed with
/// its position in the timeline.
pub fn animation_name(target_id: &str, segment: usize, event: usize) -> String {
    let base: String = target_id
        .trim_start_matches(['#', '.'])
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let base = if base.is_empty() { "timeline".to_string() } else { base };
    format!("{base}-{segment}-{event}")
}

fn build_rule(snapshot: &PropertySnapshot) -> KeyframeRule {
    let declarations = snapshot
        .properties
        .iter()
        .filter(|(property, _)| !CONTROL_PROPERTIES.contains(&property.as_str()))
        .filter_map(|(property, value)| {
            css_value(value).map(|value| (camel_to_kebab(property), value))
        })
        .collect();

    KeyframeRule {
        percent: snapshot.offset.clamp(0.0, 1.0) * 100.0,
        declarations,
    }
}

fn css_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim_end_matches(';').to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// `backgroundColor` -> `background-color`.
pub fn camel_to_kebab(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() && previous_lower {
            out.push('-');
        }
        previous_lower = c.is_ascii_lowercase();
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// Formats with at most four decimals and no trailing zeros.
pub(crate) fn format_number(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    if rounded == 0.0 {
        // Avoid "-0".
        return "0".to_string();
    }
    format!("{rounded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessSurface;
    use kurbo::Rect;

    fn fade(target: &str, duration_ms: Option<f64>) -> AnimationEvent {
        AnimationEvent {
            target_id: target.to_string(),
            start_time_ms: 0.0,
            duration_ms,
            keyframes: vec![
                PropertySnapshot::at(0.5).with("backgroundColor", "green"),
                PropertySnapshot::at(0.0)
                    .with("opacity", 0)
                    .with("transform", "translate(-100%, -100%);")
                    .eased("ease-out"),
                PropertySnapshot::at(1.0).with("opacity", 1),
            ],
        }
    }

    fn surface_with(selector: &str) -> HeadlessSurface {
        let mut surface = HeadlessSurface::new();
        surface.insert_element(selector, Rect::new(0.0, 0.0, 10.0, 10.0));
        surface
    }

    #[test]
    fn renders_sorted_rules_without_control_properties() {
        let mut compiler = KeyframeCompiler::new();
        let mut event = fade("#a1", Some(5_000.0));
        event.keyframes[2]
            .properties
            .insert("composite".to_string(), Value::from("add"));
        let compiled = compiler.compile(0, 0, &event);

        assert_eq!(compiled.name, "a1-0-0");
        assert_eq!(
            compiled.to_css(),
            "@keyframes a1-0-0 { 0% { opacity: 0; transform: translate(-100%, -100%); } \
             50% { background-color: green; } 100% { opacity: 1; } }"
        );
    }

    #[test]
    fn explicit_duration_round_trips() {
        let mut compiler = KeyframeCompiler::new();
        let compiled = compiler.compile(0, 3, &fade("#a1", Some(7_250.0)));
        assert_eq!(compiled.duration_ms(), Some(7_250.0));
    }

    #[test]
    fn implicit_duration_resolves_from_track_length() {
        let mut compiler = KeyframeCompiler::new();
        let mut surface = surface_with("#a1");
        let name = compiler.compile(1, 0, &fade("#a1", None)).name.clone();
        assert!(compiler.get(&name).unwrap().duration.is_provisional());

        assert_eq!(compiler.resolve_track_length(1, 42_000.0, &mut surface), 1);
        assert_eq!(compiler.get(&name).unwrap().duration_ms(), Some(42_000.0));
        assert_eq!(
            surface.style("#a1", "animation-duration").as_deref(),
            Some("42000ms")
        );
        assert_eq!(surface.play_state("#a1"), PlayState::Paused);
    }

    #[test]
    fn track_length_only_touches_its_segment() {
        let mut compiler = KeyframeCompiler::new();
        let mut surface = HeadlessSurface::new();
        compiler.compile(0, 0, &fade("#a1", None));
        compiler.compile(1, 0, &fade("#a1", None));
        compiler.compile(1, 1, &fade("#b1", Some(10.0)));

        assert_eq!(compiler.resolve_track_length(1, 9_000.0, &mut surface), 1);
        assert_eq!(compiler.for_event(0, 0).unwrap().duration_ms(), None);
    }

    #[test]
    fn recompiling_replaces_the_rule() {
        let definition = TimelineDefinition::new(vec![crate::Segment::new(
            "a.mp3",
            vec![TimelineEvent::Animation(fade("#a1", Some(1_000.0)))],
        )]);
        let mut compiler = KeyframeCompiler::new();
        let mut surface = surface_with("#a1");

        compiler.compile_timeline(&definition, 0, &mut surface);
        compiler.compile_timeline(&definition, 0, &mut surface);

        assert_eq!(compiler.len(), 1);
        assert_eq!(surface.keyframe_count(), 1);
    }

    #[test]
    fn compile_succeeds_without_element_and_attaches_later() {
        let definition = TimelineDefinition::new(vec![crate::Segment::new(
            "a.mp3",
            vec![TimelineEvent::Animation(fade("#late", Some(2_000.0)))],
        )]);
        let mut compiler = KeyframeCompiler::new();
        let mut surface = HeadlessSurface::new();

        assert_eq!(compiler.compile_timeline(&definition, 0, &mut surface), 1);
        assert!(surface.keyframes("late-0-0").is_some());
        let err = compiler
            .attach(&mut surface, "late-0-0", Attachment::PAUSED)
            .unwrap_err();
        assert!(matches!(err, TimelineError::MissingElement(_)));

        surface.insert_element("#late", Rect::new(0.0, 0.0, 5.0, 5.0));
        compiler
            .attach(&mut surface, "late-0-0", Attachment::running_from(500.0))
            .unwrap();
        assert_eq!(surface.style("#late", "animation-name").as_deref(), Some("late-0-0"));
        assert_eq!(surface.style("#late", "animation-delay").as_deref(), Some("-500ms"));
        assert_eq!(surface.play_state("#late"), PlayState::Running);
    }

    #[test]
    fn converts_camel_case() {
        assert_eq!(camel_to_kebab("backgroundColor"), "background-color");
        assert_eq!(camel_to_kebab("opacity"), "opacity");
        assert_eq!(camel_to_kebab("borderTopLeftRadius"), "border-top-left-radius");
    }

    #[test]
    fn formats_percentages_compactly() {
        assert_eq!(format_number(0.07 * 100.0), "7");
        assert_eq!(format_number(52.5), "52.5");
        assert_eq!(format_number(-0.0), "0");
    }
}
