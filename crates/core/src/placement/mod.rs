//! Relative placement geometry.
//!
//! Computes the translation that moves a source rectangle onto a named anchor
//! of a target rectangle. The math is pure and works on [`kurbo::Rect`] values
//! in a shared coordinate space; [`move_element`] wires it to a rendering
//! surface and an animation executor.

use std::{fmt, str::FromStr};

use kurbo::{Rect, Vec2};
use serde::{Deserialize, Serialize};

use crate::{
    render::{AnimationExecutor, FillMode, RenderSurface, Transition, TransitionId},
    PropertySnapshot, Result, TimelineError,
};

/// Edge of the target the source is placed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Top,
    Right,
    Bottom,
    Left,
    Center,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Side::Top => "top",
            Side::Right => "right",
            Side::Bottom => "bottom",
            Side::Left => "left",
            Side::Center => "center",
        }
    }

    /// Axis the side moves along. Centering reports the horizontal axis so
    /// that its alignment axis is vertical.
    pub fn axis(self) -> Axis {
        match self {
            Side::Top | Side::Bottom => Axis::Y,
            Side::Right | Side::Left | Side::Center => Axis::X,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alignment {
    Start,
    End,
}

impl Alignment {
    fn as_str(self) -> &'static str {
        match self {
            Alignment::Start => "start",
            Alignment::End => "end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn opposite(self) -> Self {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }

    fn length(self, rect: &Rect) -> f64 {
        match self {
            Axis::X => rect.width(),
            Axis::Y => rect.height(),
        }
    }

    fn component_mut(self, v: &mut Vec2) -> &mut f64 {
        match self {
            Axis::X => &mut v.x,
            Axis::Y => &mut v.y,
        }
    }
}

/// Anchor on a target element: a side with an optional alignment, written
/// as `top`, `left-end`, `center` and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Placement {
    pub side: Side,
    pub alignment: Option<Alignment>,
}

impl Placement {
    pub const CENTER: Placement = Placement::side(Side::Center);

    pub const fn side(side: Side) -> Self {
        Self {
            side,
            alignment: None,
        }
    }

    pub const fn aligned(side: Side, alignment: Alignment) -> Self {
        Self {
            side,
            alignment: Some(alignment),
        }
    }

    pub fn side_axis(&self) -> Axis {
        self.side.axis()
    }

    pub fn alignment_axis(&self) -> Axis {
        self.side_axis().opposite()
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::aligned(Side::Top, Alignment::Start)
    }
}

impl FromStr for Placement {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TimelineError::InvalidPlacement(s.to_string());
        let (side, alignment) = match s.split_once('-') {
            Some((side, alignment)) => (side, Some(alignment)),
            None => (s, None),
        };

        let side = match side {
            "top" => Side::Top,
            "right" => Side::Right,
            "bottom" => Side::Bottom,
            "left" => Side::Left,
            "center" => Side::Center,
            _ => return Err(invalid()),
        };
        let alignment = match alignment {
            None => None,
            Some("start") => Some(Alignment::Start),
            Some("end") => Some(Alignment::End),
            Some(_) => return Err(invalid()),
        };

        Ok(Self { side, alignment })
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.alignment {
            Some(alignment) => write!(f, "{}-{}", self.side.as_str(), alignment.as_str()),
            None => f.write_str(self.side.as_str()),
        }
    }
}

impl TryFrom<String> for Placement {
    type Error = TimelineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Placement> for String {
    fn from(value: Placement) -> Self {
        value.to_string()
    }
}

/// Extra spacing applied along the side axis and the alignment axis.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlacementOptions {
    pub side_offset: f64,
    pub align_offset: f64,
}

/// Delta between the two rectangles' origins.
pub fn origin_delta(source: Rect, target: Rect) -> Vec2 {
    Vec2::new(target.x0 - source.x0, target.y0 - source.y0)
}

/// Translation that moves `source` onto `placement` of `target`.
pub fn compute_delta(source: Rect, target: Rect, placement: Placement) -> Vec2 {
    compute_delta_with(source, target, placement, PlacementOptions::default())
}

pub fn compute_delta_with(
    source: Rect,
    target: Rect,
    placement: Placement,
    options: PlacementOptions,
) -> Vec2 {
    let origin = origin_delta(source, target);
    let center_x = origin.x + target.width() / 2.0 - source.width() / 2.0;
    let center_y = origin.y + target.height() / 2.0 - source.height() / 2.0;
    let gap = options.side_offset;

    let mut delta = match placement.side {
        Side::Top => Vec2::new(center_x, origin.y - source.height() - gap),
        Side::Bottom => Vec2::new(center_x, origin.y + target.height() + gap),
        Side::Right => Vec2::new(origin.x + target.width() + gap, center_y),
        Side::Left => Vec2::new(origin.x - source.width() - gap, center_y),
        Side::Center => Vec2::new(center_x, center_y),
    };

    if let Some(alignment) = placement.alignment {
        let axis = placement.alignment_axis();
        // Half-size differential turns a centred position into an edge-aligned one.
        let bias = axis.length(&target) / 2.0 - axis.length(&source) / 2.0 + options.align_offset;
        // Centre anchors bias the opposite way round from edge anchors.
        let bias = if placement.side == Side::Center { -bias } else { bias };
        *axis.component_mut(&mut delta) += match alignment {
            Alignment::Start => -bias,
            Alignment::End => bias,
        };
    }

    delta
}

/// Lenient variant for untyped anchors: an unrecognised placement logs a
/// warning and degrades to the origin delta.
pub fn compute_delta_for(source: Rect, target: Rect, placement: &str) -> Vec2 {
    match placement.parse::<Placement>() {
        Ok(placement) => compute_delta(source, target, placement),
        Err(err) => {
            tracing::warn!(%err, "falling back to origin delta");
            origin_delta(source, target)
        }
    }
}

/// One repositioning request for [`move_element`].
#[derive(Debug, Clone)]
pub struct MoveRequest<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub placement: Placement,
    pub options: PlacementOptions,
    pub duration_ms: f64,
}

/// Result of a successful move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOutcome {
    pub delta: Vec2,
    pub transition: Option<TransitionId>,
}

/// Resolves both selectors, computes the delta and animates the source by it.
///
/// The source's `transform` is cleared before measuring so repeated moves are
/// computed from the element's resting position.
pub fn move_element<S, E>(
    surface: &mut S,
    executor: &mut E,
    request: &MoveRequest<'_>,
) -> Result<MoveOutcome>
where
    S: RenderSurface + ?Sized,
    E: AnimationExecutor + ?Sized,
{
    if !surface.contains(request.source) {
        return Err(TimelineError::MissingElement(request.source.to_string()));
    }
    surface.set_style(request.source, "transform", "");

    let source = surface
        .bounding_rect(request.source)
        .ok_or_else(|| TimelineError::MissingElement(request.source.to_string()))?;
    let target = surface
        .bounding_rect(request.target)
        .ok_or_else(|| TimelineError::MissingElement(request.target.to_string()))?;

    let delta = compute_delta_with(source, target, request.placement, request.options);
    let transition = Transition {
        keyframes: vec![
            PropertySnapshot::at(0.0).with("transform", "translate(0, 0)"),
            PropertySnapshot::at(1.0).with(
                "transform",
                format!("translate({}px, {}px)", delta.x, delta.y),
            ),
        ],
        duration_ms: request.duration_ms,
        fill: FillMode::Forwards,
    };

    let transition = executor.animate(request.source, transition);
    Ok(MoveOutcome { delta, transition })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{HeadlessExecutor, HeadlessSurface};

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Rect {
        Rect::from_origin_size((x, y), (w, h))
    }

    fn placement(s: &str) -> Placement {
        s.parse().unwrap()
    }

    #[test]
    fn top_start_sits_above_with_left_edges_aligned() {
        let source = rect(0.0, 0.0, 10.0, 10.0);
        let target = rect(100.0, 100.0, 50.0, 20.0);

        let delta = compute_delta(source, target, placement("top-start"));
        let moved = source + delta;

        assert_eq!(moved.y1, target.y0);
        assert_eq!(moved.x0, target.x0);
        assert_eq!(delta, Vec2::new(100.0, 90.0));
    }

    #[test]
    fn center_on_itself_is_identity() {
        let r = rect(12.0, -4.0, 33.0, 7.5);
        assert_eq!(compute_delta(r, r, Placement::CENTER), Vec2::ZERO);
    }

    #[test]
    fn identical_inputs_give_identical_outputs() {
        let source = rect(5.0, 6.0, 20.0, 40.0);
        let target = rect(-50.0, 80.0, 60.0, 10.0);
        for anchor in ["top", "right-end", "bottom-start", "left", "center-end"] {
            let first = compute_delta(source, target, placement(anchor));
            let second = compute_delta(source, target, placement(anchor));
            assert_eq!(first, second, "{anchor}");
        }
    }

    #[test]
    fn sides_place_edges_flush() {
        let source = rect(0.0, 0.0, 10.0, 10.0);
        let target = rect(100.0, 100.0, 50.0, 20.0);

        let bottom = source + compute_delta(source, target, placement("bottom"));
        assert_eq!(bottom.y0, target.y1);
        assert_eq!(bottom.center().x, target.center().x);

        let right = source + compute_delta(source, target, placement("right"));
        assert_eq!(right.x0, target.x1);
        assert_eq!(right.center().y, target.center().y);

        let left = source + compute_delta(source, target, placement("left"));
        assert_eq!(left.x1, target.x0);
    }

    #[test]
    fn end_alignment_matches_far_edges() {
        let source = rect(0.0, 0.0, 10.0, 10.0);
        let target = rect(100.0, 100.0, 50.0, 20.0);

        let top_end = source + compute_delta(source, target, placement("top-end"));
        assert_eq!(top_end.x1, target.x1);

        let left_start = source + compute_delta(source, target, placement("left-start"));
        assert_eq!(left_start.y0, target.y0);

        let right_end = source + compute_delta(source, target, placement("right-end"));
        assert_eq!(right_end.y1, target.y1);
    }

    #[test]
    fn center_alignment_biases_against_edge_alignment() {
        let source = rect(0.0, 0.0, 10.0, 10.0);
        let target = rect(100.0, 100.0, 50.0, 20.0);

        assert_eq!(
            compute_delta(source, target, placement("center-start")),
            Vec2::new(120.0, 110.0)
        );
        assert_eq!(
            compute_delta(source, target, placement("center-end")),
            Vec2::new(120.0, 100.0)
        );
        assert_eq!(
            compute_delta(source, target, placement("center")),
            Vec2::new(120.0, 105.0)
        );
    }

    #[test]
    fn offsets_push_away_from_the_target() {
        let source = rect(0.0, 0.0, 10.0, 10.0);
        let target = rect(100.0, 100.0, 50.0, 20.0);
        let options = PlacementOptions {
            side_offset: 4.0,
            align_offset: 0.0,
        };

        let moved = source + compute_delta_with(source, target, placement("top"), options);
        assert_eq!(moved.y1, target.y0 - 4.0);
    }

    #[test]
    fn parses_and_displays_round_trip() {
        for anchor in ["top", "right-start", "bottom-end", "left", "center"] {
            assert_eq!(placement(anchor).to_string(), anchor);
        }
        assert!(matches!(
            "middle-start".parse::<Placement>(),
            Err(TimelineError::InvalidPlacement(_))
        ));
        assert!("top-middle".parse::<Placement>().is_err());
    }

    #[test]
    fn unparsable_anchor_falls_back_to_origin_delta() {
        let source = rect(1.0, 2.0, 10.0, 10.0);
        let target = rect(101.0, 52.0, 40.0, 40.0);
        assert_eq!(
            compute_delta_for(source, target, "sideways"),
            Vec2::new(100.0, 50.0)
        );
    }

    #[test]
    fn move_element_animates_source_by_delta() {
        let mut surface = HeadlessSurface::new();
        surface.insert_element("#chip", rect(0.0, 0.0, 10.0, 10.0));
        surface.insert_element("#slot", rect(100.0, 100.0, 50.0, 20.0));
        let mut executor = HeadlessExecutor::new();

        let outcome = move_element(
            &mut surface,
            &mut executor,
            &MoveRequest {
                source: "#chip",
                target: "#slot",
                placement: Placement::default(),
                options: PlacementOptions::default(),
                duration_ms: 1000.0,
            },
        )
        .unwrap();

        assert_eq!(outcome.delta, Vec2::new(100.0, 90.0));
        let recorded = executor.transitions();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].selector, "#chip");
        assert_eq!(recorded[0].transition.fill, FillMode::Forwards);
        assert_eq!(
            recorded[0].transition.keyframes[1].properties["transform"],
            "translate(100px, 90px)"
        );
    }

    #[test]
    fn move_element_reports_missing_target() {
        let mut surface = HeadlessSurface::new();
        surface.insert_element("#chip", rect(0.0, 0.0, 10.0, 10.0));
        let mut executor = HeadlessExecutor::new();

        let err = move_element(
            &mut surface,
            &mut executor,
            &MoveRequest {
                source: "#chip",
                target: "#nowhere",
                placement: Placement::CENTER,
                options: PlacementOptions::default(),
                duration_ms: 1000.0,
            },
        )
        .unwrap_err();

        assert!(matches!(err, TimelineError::MissingElement(ref s) if s == "#nowhere"));
        assert!(executor.transitions().is_empty());
    }
}
