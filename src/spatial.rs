//! Spatial indexing for proximity queries.
//!
//! Each entry is a point wrapped in a square search box of `border` meters on
//! each side. A query point matches every entry whose box contains it, so the
//! answer is "roughly within `border` of the entry", not an exact radius. Exact
//! distances are left to endpoint refinement.

use std::fmt;

use rstar::{RTree, RTreeObject, AABB};

use crate::geo_utils::LocalPlanar;
use crate::GpsPoint;

/// A payload stored with the search box around its point.
#[derive(Debug, Clone)]
pub struct IndexedEntry<T> {
    pub point: GpsPoint,
    pub payload: T,
    min: [f64; 2],
    max: [f64; 2],
}

impl<T> IndexedEntry<T> {
    fn new(point: GpsPoint, payload: T, border: f64) -> Self {
        // Size the box in degrees at the entry's own latitude
        let metric = LocalPlanar::new(point);
        let sw = metric.denormalize(geo::coord! { x: -border, y: -border });
        let ne = metric.denormalize(geo::coord! { x: border, y: border });
        Self {
            point,
            payload,
            min: [sw.longitude, sw.latitude],
            max: [ne.longitude, ne.latitude],
        }
    }
}

impl<T> RTreeObject for IndexedEntry<T> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}

/// R-tree of tagged points with a fixed search border.
pub struct SpatialIndex<T> {
    tree: RTree<IndexedEntry<T>>,
    border: f64,
}

impl<T> fmt::Debug for SpatialIndex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("entries", &self.len())
            .field("border", &self.border)
            .finish()
    }
}

impl<T> SpatialIndex<T> {
    /// Create an empty index whose entries match within `border` meters.
    pub fn new(border: f64) -> Self {
        Self {
            tree: RTree::new(),
            border,
        }
    }

    /// Build an index in one pass.
    pub fn bulk_load(border: f64, entries: impl IntoIterator<Item = (GpsPoint, T)>) -> Self {
        let entries: Vec<IndexedEntry<T>> = entries
            .into_iter()
            .map(|(point, payload)| IndexedEntry::new(point, payload, border))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
            border,
        }
    }

    /// Add one entry. Duplicates are allowed.
    pub fn insert(&mut self, point: GpsPoint, payload: T) {
        self.tree.insert(IndexedEntry::new(point, payload, self.border));
    }

    /// All entries whose search box contains `point`.
    ///
    /// Boxes of entries next to the antimeridian extend past ±180°, so the
    /// point is also looked up one turn round the globe.
    pub fn query<'a>(&'a self, point: &GpsPoint) -> impl Iterator<Item = &'a IndexedEntry<T>> + 'a {
        let wrapped = point.longitude - 360.0f64.copysign(point.longitude);
        let at = AABB::from_point([point.longitude, point.latitude]);
        let around = AABB::from_point([wrapped, point.latitude]);
        self.tree
            .locate_in_envelope_intersecting(&at)
            .chain(self.tree.locate_in_envelope_intersecting(&around))
    }

    /// The search border in meters.
    pub fn border(&self) -> f64 {
        self.border
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
