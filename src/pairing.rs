//! Pairs start runs with finish runs for one segment.
//!
//! Starts are taken latest first. Each start is offered the finishes that begin
//! after it, earliest first, and the first finish that survives validation
//! (distance check, then refinement of both ends) is accepted. Accepting a
//! pair discards every remaining start later than
//! `start - suppression_factor * (finish - start)`, so re-visits of the start
//! area just before a traversal do not produce a second, overlapping match.
//!
//! This is a greedy search, not an optimal assignment. Every abandoned
//! candidate is logged and recorded as a [`RejectedCandidate`]. Each start is
//! refined at most once; if it never comes within range the remaining
//! finishes are not tried.

use log::{info, warn};

use crate::coalesce::{CoalescedRun, SegmentRuns};
use crate::error::Rejection;
use crate::refine::{refine_endpoint, RefinedEndpoint};
use crate::{Endpoint, MatchConfig, MatchOutcome, RejectedCandidate, Segment, SegmentMatch, Waypoint};

/// Accept a traversed distance within `tolerance` (relative) of the expected one.
///
/// ```
/// use segment_matcher::check_distance;
///
/// assert!(check_distance(1150.0, 1000.0, 0.2).is_ok());
/// assert!(check_distance(1250.0, 1000.0, 0.2).is_err());
/// ```
pub fn check_distance(traversed: f64, expected: f64, tolerance: f64) -> Result<(), Rejection> {
    if (traversed - expected).abs() / expected > tolerance {
        return Err(Rejection::DistanceMismatch { traversed, expected });
    }
    Ok(())
}

/// Pair the runs of one segment, pushing matches and rejections into `outcome`.
pub fn pair_candidates<'a>(
    segment: &'a Segment,
    runs: SegmentRuns,
    waypoints: &[Waypoint],
    config: &MatchConfig,
    outcome: &mut MatchOutcome<'a>,
) {
    let SegmentRuns {
        mut starts,
        finishes,
        ..
    } = runs;

    while let Some(start) = starts.pop() {
        let mut accepted = None;
        let mut offered = false;
        // Refined once, on the first finish that passes the distance check
        let mut entered = None;

        for finish in finishes.iter().filter(|f| f.first > start.last) {
            offered = true;
            match try_segment(segment, &start, &mut entered, finish, waypoints, config) {
                Ok(found) => {
                    accepted = Some((found, *finish));
                    break;
                }
                Err(reason) => {
                    warn!(
                        "{}: start {}..={} / finish {}..={} rejected: {}",
                        segment.title, start.first, start.last, finish.first, finish.last, reason
                    );
                    let start_failed = reason.endpoint() == Some(Endpoint::Start);
                    outcome.rejections.push(RejectedCandidate {
                        segment,
                        start,
                        finish: Some(*finish),
                        reason,
                    });
                    if start_failed {
                        break;
                    }
                }
            }
        }

        match accepted {
            Some((found, finish)) => {
                info!(
                    "Matched {} from {} to {} ({}s)",
                    segment.title,
                    found.start_time,
                    found.finish_time,
                    found.elapsed().num_seconds()
                );
                outcome.matches.push(found);

                let cutoff = suppression_cutoff(&start, &finish, config.suppression_factor);
                starts.retain(|s| s.mid() as f64 <= cutoff);
            }
            None => {
                warn!(
                    "{}: no finish for start {}..={}",
                    segment.title, start.first, start.last
                );
                if !offered {
                    outcome.rejections.push(RejectedCandidate {
                        segment,
                        start,
                        finish: None,
                        reason: Rejection::NoQualifyingFinish,
                    });
                }
            }
        }
    }
}

/// Starts with a midpoint above this index are discarded after a match.
pub fn suppression_cutoff(start: &CoalescedRun, finish: &CoalescedRun, factor: f64) -> f64 {
    let start = start.mid() as f64;
    let finish = finish.mid() as f64;
    start - factor * (finish - start)
}

fn try_segment<'a>(
    segment: &'a Segment,
    start: &CoalescedRun,
    entered: &mut Option<RefinedEndpoint>,
    finish: &CoalescedRun,
    waypoints: &[Waypoint],
    config: &MatchConfig,
) -> Result<SegmentMatch<'a>, Rejection> {
    let traversed = waypoints[finish.mid()].distance - waypoints[start.mid()].distance;
    check_distance(traversed, segment.distance, config.distance_tolerance)?;

    let entered = match *entered {
        Some(refined) => refined,
        None => {
            let refined = refine_endpoint(waypoints, start, segment.start, config.inner_meters)?;
            *entered = Some(refined);
            refined
        }
    };
    let left = refine_endpoint(waypoints, finish, segment.finish, config.inner_meters)?;
    if left.time <= entered.time {
        return Err(Rejection::NonIncreasingTime);
    }

    Ok(SegmentMatch {
        segment,
        start_time: entered.time,
        finish_time: left.time,
        start_position: entered.position,
        finish_position: left.position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::LocalPlanar;
    use crate::GpsPoint;
    use chrono::{DateTime, Duration};

    fn run(first: usize, last: usize, endpoint: Endpoint) -> CoalescedRun {
        CoalescedRun {
            first,
            last,
            endpoint,
            segment: 0,
        }
    }

    /// Samples heading north from the origin at the given offsets, 20s apart.
    fn trace(norths: &[f64]) -> Vec<Waypoint> {
        let metric = LocalPlanar::new(GpsPoint::new(51.5074, -0.1278));
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut distance = 0.0;
        norths
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                if i > 0 {
                    distance += (n - norths[i - 1]).abs();
                }
                let p = metric.denormalize(geo::coord! { x: 0.0, y: n });
                Waypoint::new(p, distance, t0 + Duration::seconds(20 * i as i64))
            })
            .collect()
    }

    #[test]
    fn test_distance_tolerance_boundaries() {
        assert!(check_distance(1000.0, 1000.0, 0.2).is_ok());
        assert!(check_distance(1150.0, 1000.0, 0.2).is_ok());
        assert!(check_distance(850.0, 1000.0, 0.2).is_ok());
        // Exactly at the tolerance is still accepted
        assert!(check_distance(1200.0, 1000.0, 0.2).is_ok());
        assert!(check_distance(800.0, 1000.0, 0.2).is_ok());
        assert!(check_distance(1250.0, 1000.0, 0.2).is_err());
        assert!(check_distance(750.0, 1000.0, 0.2).is_err());
        assert!(check_distance(3000.0, 1000.0, 0.2).is_err());
        assert_eq!(
            check_distance(500.0, 1000.0, 0.2),
            Err(Rejection::DistanceMismatch {
                traversed: 500.0,
                expected: 1000.0
            })
        );
    }

    #[test]
    fn test_suppression_window_formula() {
        // Pinned: start 10, finish 30, factor 0.5 -> 10 - 0.5 * 20 = 0
        let start = run(10, 10, Endpoint::Start);
        let finish = run(30, 30, Endpoint::Finish);
        assert_eq!(suppression_cutoff(&start, &finish, 0.5), 0.0);

        let start = run(8, 12, Endpoint::Start);
        let finish = run(28, 32, Endpoint::Finish);
        assert_eq!(suppression_cutoff(&start, &finish, 0.25), 5.0);
    }

    #[test]
    fn test_single_pair_matches() {
        let waypoints = trace(&[0.0, 250.0, 500.0, 750.0, 1000.0]);
        let segment = Segment::new("1", "A", waypoints[0].point(), waypoints[4].point(), 1000.0);
        let runs = SegmentRuns {
            segment: 0,
            starts: vec![run(0, 0, Endpoint::Start)],
            finishes: vec![run(4, 4, Endpoint::Finish)],
        };
        let mut outcome = MatchOutcome::default();
        pair_candidates(&segment, runs, &waypoints, &MatchConfig::default(), &mut outcome);

        assert_eq!(outcome.matches.len(), 1);
        assert!(outcome.rejections.is_empty());
        let m = &outcome.matches[0];
        assert_eq!(m.start_time, waypoints[0].time);
        assert_eq!(m.finish_time, waypoints[4].time);
        assert!(m.finish_time > m.start_time);
    }

    #[test]
    fn test_finish_before_start_is_not_offered() {
        let waypoints = trace(&[0.0, 250.0, 500.0, 750.0, 1000.0]);
        let segment = Segment::new("1", "A", waypoints[4].point(), waypoints[0].point(), 1000.0);
        // Finish at 0 precedes start at 4
        let runs = SegmentRuns {
            segment: 0,
            starts: vec![run(4, 4, Endpoint::Start)],
            finishes: vec![run(0, 0, Endpoint::Finish)],
        };
        let mut outcome = MatchOutcome::default();
        pair_candidates(&segment, runs, &waypoints, &MatchConfig::default(), &mut outcome);

        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.rejections.len(), 1);
        assert_eq!(outcome.rejections[0].reason, Rejection::NoQualifyingFinish);
        assert_eq!(outcome.rejections[0].finish, None);
    }

    #[test]
    fn test_mismatched_finish_skipped_for_later_one() {
        // Finish area passed at 400m (too short) and again at 1000m
        let waypoints = trace(&[0.0, 200.0, 400.0, 600.0, 800.0, 1000.0]);
        let segment = Segment::new("1", "A", waypoints[0].point(), waypoints[5].point(), 1000.0);
        let runs = SegmentRuns {
            segment: 0,
            starts: vec![run(0, 0, Endpoint::Start)],
            finishes: vec![run(2, 2, Endpoint::Finish), run(5, 5, Endpoint::Finish)],
        };
        let mut outcome = MatchOutcome::default();
        pair_candidates(&segment, runs, &waypoints, &MatchConfig::default(), &mut outcome);

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].finish_time, waypoints[5].time);
        assert_eq!(outcome.rejections.len(), 1);
        assert!(matches!(
            outcome.rejections[0].reason,
            Rejection::DistanceMismatch { .. }
        ));
    }

    #[test]
    fn test_two_separate_traversals() {
        // Out along the segment, back, and out again
        let norths = [
            0.0, 250.0, 500.0, 750.0, 1000.0, 750.0, 500.0, 250.0, 0.0, 250.0, 500.0, 750.0,
            1000.0,
        ];
        let waypoints = trace(&norths);
        let segment = Segment::new("1", "A", waypoints[0].point(), waypoints[4].point(), 1000.0);
        let runs = SegmentRuns {
            segment: 0,
            starts: vec![run(0, 0, Endpoint::Start), run(8, 8, Endpoint::Start)],
            finishes: vec![run(4, 4, Endpoint::Finish), run(12, 12, Endpoint::Finish)],
        };
        let mut outcome = MatchOutcome::default();
        pair_candidates(&segment, runs, &waypoints, &MatchConfig::default(), &mut outcome);

        assert_eq!(outcome.matches.len(), 2);
        // Latest start is handled first
        assert_eq!(outcome.matches[0].start_time, waypoints[8].time);
        assert_eq!(outcome.matches[0].finish_time, waypoints[12].time);
        assert_eq!(outcome.matches[1].start_time, waypoints[0].time);
        assert_eq!(outcome.matches[1].finish_time, waypoints[4].time);
    }

    #[test]
    fn test_unreachable_start_rejected_once() {
        // Start sits 20m east of the trace, two finishes both fit the distance
        let waypoints = trace(&[0.0, 250.0, 500.0, 750.0, 1000.0, 1100.0]);
        let start_point = LocalPlanar::new(waypoints[0].point())
            .denormalize(geo::coord! { x: 20.0, y: 0.0 });
        let segment = Segment::new("1", "A", start_point, waypoints[4].point(), 1000.0);
        let runs = SegmentRuns {
            segment: 0,
            starts: vec![run(0, 0, Endpoint::Start)],
            finishes: vec![run(4, 4, Endpoint::Finish), run(5, 5, Endpoint::Finish)],
        };
        let mut outcome = MatchOutcome::default();
        pair_candidates(&segment, runs, &waypoints, &MatchConfig::default(), &mut outcome);

        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.rejections.len(), 1);
        assert_eq!(outcome.rejections[0].reason.endpoint(), Some(Endpoint::Start));
        assert_eq!(outcome.rejections[0].finish, Some(run(4, 4, Endpoint::Finish)));
    }
}
