//! Scans a trace for waypoints near segment endpoints.

use std::collections::HashSet;

use log::debug;

use crate::catalog::SegmentCatalog;
use crate::{Endpoint, Waypoint};

/// A waypoint that fell inside the search box of a segment endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hit {
    /// Waypoint index in the trace
    pub index: usize,
    pub endpoint: Endpoint,
    /// Segment position in the catalog
    pub segment: usize,
}

/// Lazily yield every hit, waypoint by waypoint in trace order.
///
/// Calling this again over the same trace yields the same hits.
pub fn collect_hits<'a>(
    catalog: &'a SegmentCatalog,
    waypoints: &'a [Waypoint],
) -> impl Iterator<Item = Hit> + 'a {
    let mut seen = HashSet::new();
    waypoints
        .iter()
        .enumerate()
        .flat_map(move |(index, waypoint)| {
            catalog.index().query(&waypoint.point()).map(move |entry| Hit {
                index,
                endpoint: entry.payload.endpoint,
                segment: entry.payload.segment,
            })
        })
        .inspect(move |hit| {
            if seen.insert(hit.segment) {
                debug!(
                    "Found {} ({} at waypoint {})",
                    catalog.segment(hit.segment).title,
                    hit.endpoint,
                    hit.index
                );
            }
        })
}
