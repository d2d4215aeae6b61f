//! # Segment Matcher
//!
//! Detects which catalogued route segments an activity traversed, and exactly
//! when it entered and left each one.
//!
//! A segment is a named path with a fixed start coordinate, finish coordinate
//! and expected length. Given the GPS waypoints of one activity, the matcher:
//!
//! 1. Scans every waypoint against an R-tree of segment endpoints ([`collector`])
//! 2. Merges contiguous hits into runs ([`coalesce`])
//! 3. Pairs start runs with later finish runs, rejecting implausible distances
//!    and suppressing duplicate traversals ([`pairing`])
//! 4. Refines each end to the fractional waypoint position closest to the true
//!    endpoint and interpolates its time ([`refine`])
//!
//! ## Features
//!
//! - **`parallel`** - Match many traces against one catalog with rayon
//! - **`serde`** - Serialize/deserialize config and data types
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{DateTime, Duration};
//! use segment_matcher::geo_utils::LocalPlanar;
//! use segment_matcher::{find_segments, GpsPoint, MatchConfig, Segment, SegmentCatalog, Waypoint};
//!
//! let origin = GpsPoint::new(51.5074, -0.1278);
//! let metric = LocalPlanar::new(origin);
//! let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
//!
//! // Five samples heading north, 250m and one minute apart
//! let trace: Vec<Waypoint> = (0..5)
//!     .map(|i| {
//!         let north = i as f64 * 250.0;
//!         let point = metric.denormalize(geo::coord! { x: 0.0, y: north });
//!         Waypoint::new(point, north, t0 + Duration::minutes(i))
//!     })
//!     .collect();
//!
//! let config = MatchConfig::default();
//! let segment = Segment::new("1", "North Road", trace[0].point(), trace[4].point(), 1000.0);
//! let catalog = SegmentCatalog::new(vec![segment], &config).unwrap();
//!
//! let outcome = find_segments(&catalog, &trace, &config).unwrap();
//! assert_eq!(outcome.matches.len(), 1);
//! assert_eq!(outcome.matches[0].elapsed(), Duration::minutes(4));
//! ```

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};

pub mod catalog;
pub mod coalesce;
pub mod collector;
pub mod error;
pub mod geo_utils;
pub mod pairing;
pub mod refine;
pub mod spatial;

pub use catalog::{EndpointRef, SegmentCatalog};
pub use coalesce::{coalesce_hits, group_by_segment, CoalescedRun, SegmentRuns};
pub use collector::{collect_hits, Hit};
pub use error::{MatchError, Rejection};
pub use pairing::{check_distance, pair_candidates};
pub use refine::{refine_endpoint, RefinedEndpoint};
pub use spatial::SpatialIndex;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use segment_matcher::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Which end of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endpoint {
    Start,
    Finish,
}

impl Endpoint {
    pub fn is_start(&self) -> bool {
        matches!(self, Endpoint::Start)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Start => f.write_str("start"),
            Endpoint::Finish => f.write_str("finish"),
        }
    }
}

/// A waypoint as read from an activity file, before validation.
///
/// Any of the position fields may be missing (e.g. a heart-rate-only sample).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawWaypoint {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance: Option<f64>,
    pub time: DateTime<Utc>,
}

/// One timestamped sample of an activity trace.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Cumulative meters from the start of the trace
    pub distance: f64,
    pub time: DateTime<Utc>,
}

impl Waypoint {
    pub fn new(point: GpsPoint, distance: f64, time: DateTime<Utc>) -> Self {
        Self {
            latitude: point.latitude,
            longitude: point.longitude,
            distance,
            time,
        }
    }

    /// Convert a raw sample, returning `None` when longitude, latitude or
    /// distance is missing.
    pub fn from_raw(raw: &RawWaypoint) -> Option<Self> {
        Some(Self {
            latitude: raw.latitude?,
            longitude: raw.longitude?,
            distance: raw.distance?,
            time: raw.time,
        })
    }

    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }

    fn is_valid(&self) -> bool {
        self.point().is_valid() && self.distance.is_finite()
    }
}

/// Drop raw samples that lack a position or distance.
pub fn clean_waypoints(raw: &[RawWaypoint]) -> Vec<Waypoint> {
    let waypoints: Vec<Waypoint> = raw.iter().filter_map(Waypoint::from_raw).collect();
    if waypoints.len() < raw.len() {
        debug!(
            "Dropped {} of {} waypoints without position or distance",
            raw.len() - waypoints.len(),
            raw.len()
        );
    }
    waypoints
}

/// A named route segment from the catalog.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment {
    pub id: String,
    /// Unique display name
    pub title: String,
    pub description: String,
    pub start: GpsPoint,
    pub finish: GpsPoint,
    /// Expected distance from start to finish in meters
    pub distance: f64,
}

impl Segment {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: GpsPoint,
        finish: GpsPoint,
        distance: f64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            start,
            finish,
            distance,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Coordinate of the given end.
    pub fn endpoint(&self, endpoint: Endpoint) -> GpsPoint {
        match endpoint {
            Endpoint::Start => self.start,
            Endpoint::Finish => self.finish,
        }
    }
}

/// Configuration for segment matching.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MatchConfig {
    /// Half-width of the search box around each segment endpoint (meters).
    /// Applied when a [`SegmentCatalog`] is built.
    /// Default: 25.0
    pub border_meters: f64,

    /// A refined endpoint must come closer than this to the true endpoint (meters).
    /// Default: 10.0
    pub inner_meters: f64,

    /// Maximum relative difference between traversed and expected segment distance.
    /// Default: 0.2 (20%)
    pub distance_tolerance: f64,

    /// After accepting a start/finish pair, starts later than
    /// `start - suppression_factor * (finish - start)` are discarded.
    /// Default: 0.5
    pub suppression_factor: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            border_meters: 25.0,
            inner_meters: 10.0,
            distance_tolerance: 0.2,
            suppression_factor: 0.5,
        }
    }
}

/// One detected traversal of a segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentMatch<'a> {
    pub segment: &'a Segment,
    pub start_time: DateTime<Utc>,
    pub finish_time: DateTime<Utc>,
    /// Fractional waypoint index where the segment was entered
    pub start_position: f64,
    /// Fractional waypoint index where the segment was left
    pub finish_position: f64,
}

impl SegmentMatch<'_> {
    pub fn elapsed(&self) -> TimeDelta {
        self.finish_time - self.start_time
    }
}

/// A start/finish candidate that was considered and abandoned.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedCandidate<'a> {
    pub segment: &'a Segment,
    pub start: CoalescedRun,
    /// `None` when no finish run followed the start at all
    pub finish: Option<CoalescedRun>,
    pub reason: Rejection,
}

/// Conditions that cut a matching run short without being errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchWarning {
    EmptyTrace,
    EmptyCatalog,
}

/// Everything produced by matching one trace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome<'a> {
    /// Accepted traversals, ordered by start time
    pub matches: Vec<SegmentMatch<'a>>,
    pub rejections: Vec<RejectedCandidate<'a>>,
    pub warnings: Vec<MatchWarning>,
}

impl MatchOutcome<'_> {
    /// Shape matches for storage, one record per distinct
    /// `(segment_id, activity_id, start_time, finish_time)`.
    pub fn into_records(self, activity_id: &str) -> Vec<TraversalRecord> {
        let mut records: Vec<TraversalRecord> = self
            .matches
            .into_iter()
            .map(|m| TraversalRecord {
                segment_id: m.segment.id.clone(),
                activity_id: activity_id.to_string(),
                start_time: m.start_time,
                finish_time: m.finish_time,
            })
            .collect();
        records.sort_by(|a, b| {
            a.segment_id
                .cmp(&b.segment_id)
                .then(a.start_time.cmp(&b.start_time))
                .then(a.finish_time.cmp(&b.finish_time))
        });
        records.dedup();
        records
    }
}

/// A traversal ready to be persisted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TraversalRecord {
    pub segment_id: String,
    pub activity_id: String,
    pub start_time: DateTime<Utc>,
    pub finish_time: DateTime<Utc>,
}

/// An activity's waypoints, for batch matching.
#[derive(Debug, Clone)]
pub struct ActivityTrace {
    pub activity_id: String,
    pub waypoints: Vec<Waypoint>,
}

/// Result of matching one activity in a batch.
#[derive(Debug, Clone)]
pub struct ActivityOutcome<'a> {
    pub activity_id: String,
    pub result: Result<MatchOutcome<'a>, MatchError>,
}

// ============================================================================
// Core Functions
// ============================================================================

/// Find every traversal of a catalogued segment in one trace.
///
/// Waypoints must be in time order with non-decreasing cumulative distance;
/// use [`clean_waypoints`] to drop samples without a position first. Any
/// remaining malformed waypoint is reported as [`MatchError`]. An empty trace
/// or an empty catalog is not an error: the outcome is empty and carries a
/// [`MatchWarning`].
///
/// The endpoint search border is the one the catalog was built with;
/// `config.border_meters` is only read by [`SegmentCatalog::new`].
pub fn find_segments<'a>(
    catalog: &'a SegmentCatalog,
    waypoints: &[Waypoint],
    config: &MatchConfig,
) -> Result<MatchOutcome<'a>, MatchError> {
    validate_trace(waypoints)?;
    if config.border_meters != catalog.index().border() {
        warn!(
            "Searching with the catalog border of {}m, not the configured {}m",
            catalog.index().border(),
            config.border_meters
        );
    }

    let mut outcome = MatchOutcome::default();
    if waypoints.is_empty() {
        warn!("No waypoints in trace");
        outcome.warnings.push(MatchWarning::EmptyTrace);
        return Ok(outcome);
    }
    if catalog.is_empty() {
        warn!("No segments defined");
        outcome.warnings.push(MatchWarning::EmptyCatalog);
        return Ok(outcome);
    }

    let hits = collect_hits(catalog, waypoints);
    let runs = coalesce_hits(hits, catalog.segments());

    for group in group_by_segment(runs) {
        let segment = catalog.segment(group.segment);
        info!(
            "Considering {} ({} starts, {} finishes)",
            segment.title,
            group.starts.len(),
            group.finishes.len()
        );
        pair_candidates(segment, group, waypoints, config, &mut outcome);
    }

    outcome.matches.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.segment.title.cmp(&b.segment.title))
    });
    Ok(outcome)
}

/// Match many traces against one catalog in parallel.
///
/// The catalog is shared read-only; each trace is independent.
#[cfg(feature = "parallel")]
pub fn find_segments_parallel<'a>(
    catalog: &'a SegmentCatalog,
    traces: &[ActivityTrace],
    config: &MatchConfig,
) -> Vec<ActivityOutcome<'a>> {
    use rayon::prelude::*;

    traces
        .par_iter()
        .map(|trace| ActivityOutcome {
            activity_id: trace.activity_id.clone(),
            result: find_segments(catalog, &trace.waypoints, config),
        })
        .collect()
}

/// Sequential counterpart of `find_segments_parallel`.
pub fn find_segments_batch<'a>(
    catalog: &'a SegmentCatalog,
    traces: &[ActivityTrace],
    config: &MatchConfig,
) -> Vec<ActivityOutcome<'a>> {
    traces
        .iter()
        .map(|trace| ActivityOutcome {
            activity_id: trace.activity_id.clone(),
            result: find_segments(catalog, &trace.waypoints, config),
        })
        .collect()
}

fn validate_trace(waypoints: &[Waypoint]) -> Result<(), MatchError> {
    let mut previous: Option<f64> = None;
    for (index, wp) in waypoints.iter().enumerate() {
        if !wp.is_valid() {
            return Err(MatchError::InvalidWaypoint { index });
        }
        if let Some(previous) = previous {
            if wp.distance < previous {
                return Err(MatchError::DistanceDecreasing {
                    index,
                    previous,
                    current: wp.distance,
                });
            }
        }
        previous = Some(wp.distance);
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
