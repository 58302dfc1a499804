#![forbid(unsafe_code)]

//! Non-overlapping placement for new ideas.
//!
//! Every candidate is a top-left position for the new idea. A candidate is clear when the
//! new idea's box, inflated by `margin`, intersects no existing idea's inflated box. The
//! search order is fixed, so identical inputs always produce the same position; the only
//! randomness is the last-resort jitter, drawn from the caller's RNG.

use crate::geometry::{Point, Rect, Size};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Ring search angles in degrees, straight down first (y grows downward), then alternating
/// either side of it.
const RING_ANGLES_DEG: [f64; 8] = [90.0, 45.0, 135.0, 0.0, 180.0, 315.0, 225.0, 270.0];

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub margin: f64,
    pub below_offset: f64,
    pub ring_step: f64,
    pub ring_count: usize,
    pub spiral_angle_step: f64,
    pub spiral_radius_step: f64,
    pub spiral_attempts: usize,
    pub fallback_jitter: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            margin: 20.0,
            below_offset: 40.0,
            ring_step: 60.0,
            ring_count: 12,
            spiral_angle_step: PI / 8.0,
            spiral_radius_step: 80.0,
            spiral_attempts: 160,
            fallback_jitter: 100.0,
        }
    }
}

/// Where the caller wants the new idea to go.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Anchor {
    At(Point),
    NearLastPlaced,
    ViewportCenter,
}

#[derive(Clone, Copy, Debug)]
pub struct PlacementRequest<'a> {
    pub anchor: Point,
    pub size: Size,
    /// Bounds of the most recently placed idea, if the caller wants to stack under it.
    pub hint: Option<Rect>,
    pub existing: &'a [Rect],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlacementOutcome {
    Clear(Point),
    /// Attempt budget exhausted; the point may overlap.
    Fallback(Point),
}

impl PlacementOutcome {
    pub fn point(self) -> Point {
        match self {
            Self::Clear(point) | Self::Fallback(point) => point,
        }
    }

    pub fn is_clear(self) -> bool {
        matches!(self, Self::Clear(_))
    }
}

pub fn place<R: Rng + ?Sized>(
    config: &PlacementConfig,
    request: &PlacementRequest<'_>,
    rng: &mut R,
) -> PlacementOutcome {
    if request.existing.is_empty() {
        return PlacementOutcome::Clear(request.anchor);
    }

    let obstacles = request
        .existing
        .iter()
        .map(|rect| rect.inflate(config.margin))
        .collect::<Vec<_>>();
    let is_clear = |candidate: Point| {
        let inflated = Rect::new(candidate, request.size).inflate(config.margin);
        !obstacles.iter().any(|other| inflated.overlaps(other))
    };

    if let Some(hint) = request.hint
        && let Some(point) = search_rings(config, hint, &is_clear)
    {
        return PlacementOutcome::Clear(point);
    }

    if let Some(point) = search_spiral(config, request.anchor, &is_clear) {
        return PlacementOutcome::Clear(point);
    }

    let jitter = config.fallback_jitter.abs();
    let (dx, dy) = if jitter > 0.0 {
        (rng.gen_range(-jitter..=jitter), rng.gen_range(-jitter..=jitter))
    } else {
        (0.0, 0.0)
    };
    PlacementOutcome::Fallback(request.anchor.offset(dx, dy))
}

fn search_rings(
    config: &PlacementConfig,
    hint: Rect,
    is_clear: &impl Fn(Point) -> bool,
) -> Option<Point> {
    let below = Point::new(hint.left(), hint.bottom() + config.below_offset);
    if is_clear(below) {
        return Some(below);
    }
    for ring in 1..=config.ring_count {
        let radius = ring as f64 * config.ring_step;
        for degrees in RING_ANGLES_DEG {
            let angle = degrees.to_radians();
            let candidate = below.offset(angle.cos() * radius, angle.sin() * radius);
            if is_clear(candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

fn search_spiral(
    config: &PlacementConfig,
    anchor: Point,
    is_clear: &impl Fn(Point) -> bool,
) -> Option<Point> {
    if is_clear(anchor) {
        return Some(anchor);
    }
    let step = if config.spiral_angle_step > 0.0 {
        config.spiral_angle_step
    } else {
        PI / 8.0
    };
    let mut angle = 0.0_f64;
    let mut radius = config.spiral_radius_step;
    for _ in 0..config.spiral_attempts {
        let candidate = anchor.offset(angle.cos() * radius, angle.sin() * radius);
        if is_clear(candidate) {
            return Some(candidate);
        }
        angle += step;
        if angle >= TAU - 1e-9 {
            angle -= TAU;
            radius += config.spiral_radius_step;
        }
    }
    None
}
