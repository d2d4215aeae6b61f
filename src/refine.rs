//! Endpoint refinement.
//!
//! A coalesced run only says "somewhere around here the trace passed near the
//! endpoint". Refinement finds the fractional waypoint position where the trace
//! is locally closest to the true endpoint:
//!
//! 1. [`limits`] widens the run outwards while the distance to the endpoint
//!    keeps falling, then by one more waypoint on each side, so the bracket
//!    holds a local minimum rather than a slope.
//! 2. [`minimum`] walks the bracket one leg (waypoint to waypoint) at a time,
//!    projecting the endpoint onto each leg. A projection inside the leg is a
//!    local minimum; a projection past the far end means the trace is still
//!    approaching and the walk continues; a projection behind the near end
//!    means the near waypoint itself was the minimum. A zero-length leg
//!    (repeated fixes while stopped) also ends the walk on its near waypoint.
//! 3. The first local minimum closer than the inner tolerance wins. Otherwise
//!    the walk resumes one waypoint beyond it until the bracket is exhausted.
//!
//! Starts are walked from the end of the bracket backwards and finishes from
//! the beginning forwards, so a start takes the last close approach before the
//! segment and a finish the first one after it.
//!
//! All geometry happens in a [`LocalPlanar`] frame centred on the endpoint, so
//! the endpoint is the origin.

use chrono::{DateTime, Utc};
use geo::Coord;
use log::debug;

use crate::coalesce::CoalescedRun;
use crate::error::Rejection;
use crate::geo_utils::LocalPlanar;
use crate::{Endpoint, GpsPoint, Waypoint};

/// A refined segment end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinedEndpoint {
    /// Fractional waypoint index
    pub position: f64,
    /// Distance from the true endpoint in meters
    pub distance: f64,
    /// Interpolated time, rounded to the second
    pub time: DateTime<Utc>,
}

/// Walk direction through a bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn for_endpoint(endpoint: Endpoint) -> Self {
        match endpoint {
            Endpoint::Start => Direction::Backward,
            Endpoint::Finish => Direction::Forward,
        }
    }

    fn first(self, len: usize) -> usize {
        match self {
            Direction::Forward => 0,
            Direction::Backward => len - 1,
        }
    }

    fn step(self, i: usize, len: usize) -> Option<usize> {
        match self {
            Direction::Forward => (i + 1 < len).then_some(i + 1),
            Direction::Backward => i.checked_sub(1),
        }
    }

    fn sign(self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Backward => -1.0,
        }
    }
}

/// Refine one end of a candidate traversal.
///
/// `run` must index into `waypoints`. Fails with
/// [`Rejection::EndpointNotReached`] when no local minimum in the bracket is
/// within `inner` meters of `target`.
pub fn refine_endpoint(
    waypoints: &[Waypoint],
    run: &CoalescedRun,
    target: GpsPoint,
    inner: f64,
) -> Result<RefinedEndpoint, Rejection> {
    let metric = LocalPlanar::new(target);
    let (lo, hi) = limits(waypoints, run.first, run.last, &metric);
    let coords: Vec<Coord<f64>> = waypoints[lo..=hi]
        .iter()
        .map(|w| metric.normalize(&w.point()))
        .collect();

    let direction = Direction::for_endpoint(run.endpoint);
    let (offset, distance) = minimum(&coords, direction, inner).map_err(|closest| {
        Rejection::EndpointNotReached {
            endpoint: run.endpoint,
            closest,
        }
    })?;
    let position = lo as f64 + offset;
    let time = interpolate_time(waypoints, position).ok_or(Rejection::TimeOutOfRange)?;

    debug!(
        "Refined {} run {}..={} to position {:.2} ({:.1}m)",
        run.endpoint, run.first, run.last, position, distance
    );

    Ok(RefinedEndpoint {
        position,
        distance,
        time,
    })
}

/// Widen `first..=last` until the distance to the metric's origin rises on
/// both sides, then include the rising waypoint.
pub fn limits(waypoints: &[Waypoint], first: usize, last: usize, metric: &LocalPlanar) -> (usize, usize) {
    let d = |i: usize| metric.distance_to_origin(&waypoints[i].point());
    let end = waypoints.len() - 1;

    let mut lo = first;
    while lo > 0 && d(lo - 1) <= d(lo) {
        lo -= 1;
    }
    lo = lo.saturating_sub(1);

    let mut hi = last;
    while hi < end && d(hi + 1) <= d(hi) {
        hi += 1;
    }
    if hi < end {
        hi += 1;
    }

    (lo, hi)
}

/// First local minimum under `inner`, as (position, distance) relative to the
/// start of `coords`. On failure returns the closest distance seen.
pub fn minimum(coords: &[Coord<f64>], direction: Direction, inner: f64) -> Result<(f64, f64), f64> {
    if coords.is_empty() {
        return Err(f64::INFINITY);
    }

    let mut i = direction.first(coords.len());
    let mut closest = f64::INFINITY;
    loop {
        let (position, distance) = next_local_minimum(coords, i, direction);
        if distance < inner {
            return Ok((position, distance));
        }
        closest = closest.min(distance);

        let resume = match direction {
            Direction::Forward => Some(position.floor() as usize + 1),
            Direction::Backward => (position.ceil() as usize).checked_sub(1),
        };
        match resume {
            Some(next) if next < coords.len() => i = next,
            _ => return Err(closest),
        }
    }
}

/// Walk from `from` until the distance to the origin stops falling.
///
/// Returns the fractional position (relative to `coords`) and distance of that
/// local minimum, or of the last waypoint if the walk runs out first.
pub fn next_local_minimum(coords: &[Coord<f64>], from: usize, direction: Direction) -> (f64, f64) {
    let mut i = from;
    while let Some(j) = direction.step(i, coords.len()) {
        let a = coords[i];
        let leg = coords[j] - a;
        let len2 = leg.x * leg.x + leg.y * leg.y;
        if len2 == 0.0 {
            // Stationary samples: the walk stops at the first one it reaches
            return (i as f64, norm(a));
        }
        // Projection of the origin onto the leg
        let k = -(a.x * leg.x + a.y * leg.y) / len2;

        if k <= 0.0 {
            // Moving away: the joint we are standing on is the minimum
            return (i as f64, norm(a));
        }
        if k < 1.0 {
            let closest = a + leg * k;
            return (i as f64 + direction.sign() * k, norm(closest));
        }
        i = j;
    }
    (i as f64, norm(coords[i]))
}

/// Linear interpolation of time at a fractional index, rounded to the second.
pub fn interpolate_time(waypoints: &[Waypoint], position: f64) -> Option<DateTime<Utc>> {
    if !position.is_finite() || position < 0.0 {
        return None;
    }
    let i = position.floor() as usize;
    let fraction = position - i as f64;

    let t0 = waypoints.get(i)?.time;
    let t1 = if fraction > 0.0 {
        waypoints.get(i + 1)?.time
    } else {
        t0
    };

    let a = t0.timestamp_millis() as f64 / 1000.0;
    let b = t1.timestamp_millis() as f64 / 1000.0;
    let seconds = (a + fraction * (b - a)).round();
    DateTime::from_timestamp(seconds as i64, 0)
}

#[inline]
fn norm(c: Coord<f64>) -> f64 {
    c.x.hypot(c.y)
}
