//! Merges hits into contiguous runs.
//!
//! Hits are ordered by segment title, then endpoint, then waypoint index. A
//! run grows while consecutive hits share segment and endpoint and their
//! indices step by exactly one. Repeated identical hits are ignored.

use log::debug;

use crate::collector::Hit;
use crate::{Endpoint, Segment};

/// A maximal range of consecutive waypoints near one segment endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescedRun {
    pub first: usize,
    pub last: usize,
    pub endpoint: Endpoint,
    pub segment: usize,
}

impl CoalescedRun {
    fn from_hit(hit: &Hit) -> Self {
        Self {
            first: hit.index,
            last: hit.index,
            endpoint: hit.endpoint,
            segment: hit.segment,
        }
    }

    /// The representative index of the run.
    pub fn mid(&self) -> usize {
        (self.first + self.last) / 2
    }

    /// Number of waypoints covered.
    pub fn span(&self) -> usize {
        self.last - self.first + 1
    }

    fn extends(&self, hit: &Hit) -> bool {
        self.segment == hit.segment && self.endpoint == hit.endpoint && hit.index == self.last + 1
    }
}

/// All runs for one segment, each list ordered by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRuns {
    pub segment: usize,
    pub starts: Vec<CoalescedRun>,
    pub finishes: Vec<CoalescedRun>,
}

/// Sort and merge hits into runs.
///
/// `segments` is the catalog slice the hits' segment positions refer to.
pub fn coalesce_hits(hits: impl IntoIterator<Item = Hit>, segments: &[Segment]) -> Vec<CoalescedRun> {
    let mut hits: Vec<Hit> = hits.into_iter().collect();
    hits.sort_by(|a, b| {
        segments[a.segment]
            .title
            .cmp(&segments[b.segment].title)
            .then(a.segment.cmp(&b.segment))
            .then(a.endpoint.cmp(&b.endpoint))
            .then(a.index.cmp(&b.index))
    });
    hits.dedup();

    let mut runs = Vec::new();
    let mut current: Option<CoalescedRun> = None;
    for hit in &hits {
        if let Some(run) = current.as_mut().filter(|r| r.extends(hit)) {
            run.last = hit.index;
            continue;
        }
        runs.extend(current.replace(CoalescedRun::from_hit(hit)));
    }
    runs.extend(current);

    for run in runs.iter().filter(|r| r.span() == 1) {
        debug!(
            "Single waypoint {} run for {} at {}",
            run.endpoint, segments[run.segment].title, run.first
        );
    }
    runs
}

/// Split coalesced runs into per-segment start and finish lists, keeping the
/// order produced by [`coalesce_hits`].
pub fn group_by_segment(runs: Vec<CoalescedRun>) -> Vec<SegmentRuns> {
    let mut groups: Vec<SegmentRuns> = Vec::new();
    for run in runs {
        if !groups.last().is_some_and(|g| g.segment == run.segment) {
            groups.push(SegmentRuns {
                segment: run.segment,
                starts: Vec::new(),
                finishes: Vec::new(),
            });
        }
        if let Some(group) = groups.last_mut() {
            match run.endpoint {
                Endpoint::Start => group.starts.push(run),
                Endpoint::Finish => group.finishes.push(run),
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpsPoint;

    fn segments() -> Vec<Segment> {
        let p = GpsPoint::new(51.5, -0.12);
        vec![
            Segment::new("1", "Zed", p, GpsPoint::new(51.51, -0.12), 1100.0),
            Segment::new("2", "Alpha", GpsPoint::new(51.52, -0.12), p, 2200.0),
        ]
    }

    fn hit(index: usize, endpoint: Endpoint, segment: usize) -> Hit {
        Hit {
            index,
            endpoint,
            segment,
        }
    }

    #[test]
    fn test_contiguous_hits_merge() {
        let hits = vec![
            hit(3, Endpoint::Start, 0),
            hit(4, Endpoint::Start, 0),
            hit(5, Endpoint::Start, 0),
        ];
        let runs = coalesce_hits(hits, &segments());
        assert_eq!(
            runs,
            vec![CoalescedRun { first: 3, last: 5, endpoint: Endpoint::Start, segment: 0 }]
        );
        assert_eq!(runs[0].mid(), 4);
        assert_eq!(runs[0].span(), 3);
    }

    #[test]
    fn test_gap_splits_run() {
        let hits = vec![
            hit(7, Endpoint::Start, 0),
            hit(3, Endpoint::Start, 0),
            hit(4, Endpoint::Start, 0),
        ];
        let runs = coalesce_hits(hits, &segments());
        let ranges: Vec<(usize, usize)> = runs.iter().map(|r| (r.first, r.last)).collect();
        assert_eq!(ranges, vec![(3, 4), (7, 7)]);
    }

    #[test]
    fn test_flag_change_splits_run() {
        let hits = vec![
            hit(1, Endpoint::Start, 0),
            hit(2, Endpoint::Finish, 0),
            hit(3, Endpoint::Start, 0),
            hit(4, Endpoint::Finish, 0),
        ];
        let runs = coalesce_hits(hits, &segments());
        assert_eq!(runs.len(), 4);
        assert!(runs.iter().all(|r| r.span() == 1));
    }

    #[test]
    fn test_duplicates_do_not_break_contiguity() {
        let hits = vec![
            hit(1, Endpoint::Finish, 0),
            hit(2, Endpoint::Finish, 0),
            hit(2, Endpoint::Finish, 0),
            hit(3, Endpoint::Finish, 0),
        ];
        let runs = coalesce_hits(hits, &segments());
        assert_eq!(runs.len(), 1);
        assert_eq!((runs[0].first, runs[0].last), (1, 3));
    }

    #[test]
    fn test_every_index_in_exactly_one_run() {
        let indices = [0usize, 1, 2, 5, 6, 9, 11, 12, 13, 14];
        let hits: Vec<Hit> = indices.iter().rev().map(|&i| hit(i, Endpoint::Start, 1)).collect();
        let runs = coalesce_hits(hits, &segments());

        let mut covered: Vec<usize> = runs.iter().flat_map(|r| r.first..=r.last).collect();
        covered.sort();
        assert_eq!(covered, indices.to_vec());
        // No run spans a gap
        for pair in runs.windows(2) {
            assert!(pair[1].first > pair[0].last + 1);
        }
    }

    #[test]
    fn test_grouped_by_title() {
        // "Alpha" (segment 1) sorts before "Zed" (segment 0)
        let hits = vec![
            hit(10, Endpoint::Finish, 0),
            hit(2, Endpoint::Start, 0),
            hit(20, Endpoint::Start, 1),
            hit(30, Endpoint::Finish, 1),
            hit(3, Endpoint::Start, 0),
        ];
        let groups = group_by_segment(coalesce_hits(hits, &segments()));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].segment, 1);
        assert_eq!(groups[1].segment, 0);

        let zed = &groups[1];
        assert_eq!(zed.starts.len(), 1);
        assert_eq!((zed.starts[0].first, zed.starts[0].last), (2, 3));
        assert_eq!(zed.finishes.len(), 1);
        assert_eq!(zed.finishes[0].first, 10);
    }

    #[test]
    fn test_no_hits_no_runs() {
        assert!(coalesce_hits(Vec::new(), &segments()).is_empty());
        assert!(group_by_segment(Vec::new()).is_empty());
    }
}
