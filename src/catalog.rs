//! The segment catalog and its endpoint index.
//!
//! A catalog is built once per catalog version and then shared read-only
//! between matching runs. Rebuild it whenever the segments change; the
//! [`fingerprint`](SegmentCatalog::fingerprint) lets callers cache catalogs
//! keyed by content.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::error::MatchError;
use crate::geo_utils::haversine_distance;
use crate::spatial::SpatialIndex;
use crate::{Endpoint, GpsPoint, MatchConfig, Segment};

/// Index payload: which end of which catalog segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointRef {
    /// Position of the segment in [`SegmentCatalog::segments`]
    pub segment: usize,
    pub endpoint: Endpoint,
}

/// Validated segments plus an R-tree over their endpoints.
#[derive(Debug)]
pub struct SegmentCatalog {
    segments: Vec<Segment>,
    index: SpatialIndex<EndpointRef>,
    fingerprint: u64,
}

impl SegmentCatalog {
    /// Validate `segments` and index both ends of each one.
    ///
    /// Titles must be unique, as must `(start, finish)` pairs, and every
    /// segment needs valid coordinates and a positive distance.
    pub fn new(segments: Vec<Segment>, config: &MatchConfig) -> Result<Self, MatchError> {
        let mut titles = HashSet::new();
        let mut ends: HashMap<[u64; 4], &str> = HashMap::new();

        for segment in &segments {
            validate_segment(segment)?;

            if !titles.insert(segment.title.as_str()) {
                return Err(MatchError::DuplicateTitle(segment.title.clone()));
            }
            if let Some(first) = ends.insert(endpoint_key(segment), &segment.title) {
                return Err(MatchError::DuplicateEndpoints {
                    first: first.to_string(),
                    second: segment.title.clone(),
                });
            }

            let straight = haversine_distance(&segment.start, &segment.finish);
            if segment.distance < straight {
                warn!(
                    "Segment {} declares {:.0}m but its ends are {:.0}m apart",
                    segment.title, segment.distance, straight
                );
            }
        }

        let entries = segments.iter().enumerate().flat_map(|(i, s)| {
            [
                (s.start, EndpointRef { segment: i, endpoint: Endpoint::Start }),
                (s.finish, EndpointRef { segment: i, endpoint: Endpoint::Finish }),
            ]
        });
        let index = SpatialIndex::bulk_load(config.border_meters, entries);
        let fingerprint = fingerprint(&segments, config.border_meters);

        debug!(
            "Indexed {} segments ({} endpoints, border {}m)",
            segments.len(),
            index.len(),
            config.border_meters
        );

        Ok(Self {
            segments,
            index,
            fingerprint,
        })
    }

    /// A catalog with no segments.
    pub fn empty(config: &MatchConfig) -> Self {
        Self {
            segments: Vec::new(),
            index: SpatialIndex::new(config.border_meters),
            fingerprint: fingerprint(&[], config.border_meters),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The segment at `position` in [`segments`](Self::segments).
    ///
    /// Panics if `position` did not come from this catalog.
    pub fn segment(&self, position: usize) -> &Segment {
        &self.segments[position]
    }

    pub fn index(&self) -> &SpatialIndex<EndpointRef> {
        &self.index
    }

    /// Segment ends whose search box contains `point`.
    pub fn query<'a>(&'a self, point: &GpsPoint) -> impl Iterator<Item = (&'a Segment, Endpoint)> + 'a {
        self.index
            .query(point)
            .map(move |entry| (&self.segments[entry.payload.segment], entry.payload.endpoint))
    }

    /// Content hash of the segments and search border.
    ///
    /// SeaHash over a fixed little-endian encoding, so equal catalogs give
    /// equal fingerprints across builds, platforms and toolchains. Segment
    /// order is part of the content.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

fn validate_segment(segment: &Segment) -> Result<(), MatchError> {
    let invalid = |reason: &str| MatchError::InvalidSegment {
        title: segment.title.clone(),
        reason: reason.to_string(),
    };
    if !segment.start.is_valid() {
        return Err(invalid("start coordinate out of range"));
    }
    if !segment.finish.is_valid() {
        return Err(invalid("finish coordinate out of range"));
    }
    if !(segment.distance.is_finite() && segment.distance > 0.0) {
        return Err(invalid("distance must be positive"));
    }
    Ok(())
}

fn endpoint_key(segment: &Segment) -> [u64; 4] {
    [
        segment.start.latitude.to_bits(),
        segment.start.longitude.to_bits(),
        segment.finish.latitude.to_bits(),
        segment.finish.longitude.to_bits(),
    ]
}

fn fingerprint(segments: &[Segment], border: f64) -> u64 {
    let mut bytes = Vec::with_capacity(8 + segments.len() * 96);
    bytes.extend_from_slice(&border.to_le_bytes());
    for segment in segments {
        for text in [&segment.id, &segment.title, &segment.description] {
            bytes.extend_from_slice(&(text.len() as u64).to_le_bytes());
            bytes.extend_from_slice(text.as_bytes());
        }
        for value in [
            segment.start.latitude,
            segment.start.longitude,
            segment.finish.latitude,
            segment.finish.longitude,
            segment.distance,
        ] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    seahash::hash(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::LocalPlanar;

    fn origin() -> GpsPoint {
        GpsPoint::new(51.5074, -0.1278)
    }

    fn north(meters: f64) -> GpsPoint {
        LocalPlanar::new(origin()).denormalize(geo::coord! { x: 0.0, y: meters })
    }

    fn sample_segments() -> Vec<Segment> {
        vec![
            Segment::new("1", "Climb", origin(), north(1000.0), 1000.0),
            Segment::new("2", "Sprint", north(2000.0), north(2500.0), 500.0)
                .with_description("Flat finish"),
        ]
    }

    #[test]
    fn test_indexes_both_ends() {
        let catalog = SegmentCatalog::new(sample_segments(), &MatchConfig::default()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.index().len(), 4);

        let found: Vec<(&str, Endpoint)> = catalog
            .query(&north(1005.0))
            .map(|(s, e)| (s.title.as_str(), e))
            .collect();
        assert_eq!(found, vec![("Climb", Endpoint::Finish)]);
        assert_eq!(catalog.query(&north(1500.0)).count(), 0);
    }

    #[test]
    fn test_duplicate_title_rejected() {
        let mut segments = sample_segments();
        segments[1].title = "Climb".to_string();
        let err = SegmentCatalog::new(segments, &MatchConfig::default()).unwrap_err();
        assert_eq!(err, MatchError::DuplicateTitle("Climb".to_string()));
    }

    #[test]
    fn test_duplicate_endpoints_rejected() {
        let mut segments = sample_segments();
        segments[1].start = segments[0].start;
        segments[1].finish = segments[0].finish;
        let err = SegmentCatalog::new(segments, &MatchConfig::default()).unwrap_err();
        assert!(matches!(err, MatchError::DuplicateEndpoints { .. }));
    }

    #[test]
    fn test_invalid_segment_rejected() {
        let mut segments = sample_segments();
        segments[0].distance = 0.0;
        let err = SegmentCatalog::new(segments, &MatchConfig::default()).unwrap_err();
        assert!(matches!(err, MatchError::InvalidSegment { ref title, .. } if title == "Climb"));

        let mut segments = sample_segments();
        segments[1].finish = GpsPoint::new(95.0, 0.0);
        assert!(SegmentCatalog::new(segments, &MatchConfig::default()).is_err());
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = SegmentCatalog::empty(&MatchConfig::default());
        assert!(catalog.is_empty());
        assert_eq!(catalog.query(&origin()).count(), 0);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let config = MatchConfig::default();
        let a = SegmentCatalog::new(sample_segments(), &config).unwrap();
        let b = SegmentCatalog::new(sample_segments(), &config).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut changed = sample_segments();
        changed[1].distance = 510.0;
        let c = SegmentCatalog::new(changed, &config).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());

        let wider = MatchConfig {
            border_meters: 40.0,
            ..MatchConfig::default()
        };
        let d = SegmentCatalog::new(sample_segments(), &wider).unwrap();
        assert_ne!(a.fingerprint(), d.fingerprint());
    }

    #[test]
    fn test_fingerprint_separates_fields() {
        let config = MatchConfig::default();
        let mut left = sample_segments();
        left[0].id = "1A".to_string();
        left[0].title = "B".to_string();
        let mut right = sample_segments();
        right[0].id = "1".to_string();
        right[0].title = "AB".to_string();

        let left = SegmentCatalog::new(left, &config).unwrap();
        let right = SegmentCatalog::new(right, &config).unwrap();
        assert_ne!(left.fingerprint(), right.fingerprint());
    }

    #[test]
    fn test_fingerprint_matches_explicit_encoding() {
        let segment = Segment::new("7", "Hill", origin(), north(500.0), 500.0);
        let catalog = SegmentCatalog::new(vec![segment.clone()], &MatchConfig::default()).unwrap();

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&25.0f64.to_le_bytes());
        for text in ["7", "Hill", ""] {
            bytes.extend_from_slice(&(text.len() as u64).to_le_bytes());
            bytes.extend_from_slice(text.as_bytes());
        }
        for value in [
            segment.start.latitude,
            segment.start.longitude,
            segment.finish.latitude,
            segment.finish.longitude,
            500.0,
        ] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        assert_eq!(catalog.fingerprint(), seahash::hash(&bytes));
    }
}
