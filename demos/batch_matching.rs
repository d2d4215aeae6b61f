//! Example of matching many activities against one catalog.
//!
//! Run with: cargo run --example batch_matching --features parallel

use chrono::{DateTime, Duration, Utc};
use segment_matcher::geo_utils::LocalPlanar;
use segment_matcher::{
    find_segments_parallel, ActivityTrace, GpsPoint, MatchConfig, Segment, SegmentCatalog,
    Waypoint,
};
use std::time::Instant;

fn main() {
    println!("Batch Segment Matching Example\n");

    let metric = LocalPlanar::new(GpsPoint::new(48.8566, 2.3522)); // Paris
    let at = |east: f64, north: f64| metric.denormalize(geo::coord! { x: east, y: north });

    let config = MatchConfig::default();
    let segments: Vec<Segment> = (0..20)
        .map(|i| {
            let north = i as f64 * 500.0;
            Segment::new(
                format!("seg-{}", i),
                format!("Block {}", i),
                at(0.0, north),
                at(0.0, north + 400.0),
                400.0,
            )
        })
        .collect();
    let catalog = SegmentCatalog::new(segments, &config).unwrap();
    println!(
        "Catalog: {} segments (fingerprint {:016x})\n",
        catalog.len(),
        catalog.fingerprint()
    );

    // Activities of different lengths along the same road, at different speeds
    let t0: DateTime<Utc> = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let traces: Vec<ActivityTrace> = (0..200)
        .map(|i| {
            let samples = 50 + (i % 150);
            let step = 20.0 + (i % 7) as f64;
            ActivityTrace {
                activity_id: format!("activity-{}", i),
                waypoints: straight_ride(&metric, samples, step, t0),
            }
        })
        .collect();

    let start = Instant::now();
    let outcomes = find_segments_parallel(&catalog, &traces, &config);
    let elapsed = start.elapsed();

    println!("Matched {} activities in {:?}\n", outcomes.len(), elapsed);

    let mut total_matches = 0;
    let mut total_rejections = 0;
    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(result) => {
                total_matches += result.matches.len();
                total_rejections += result.rejections.len();
            }
            Err(e) => {
                failed += 1;
                eprintln!("  {}: {}", outcome.activity_id, e);
            }
        }
    }

    for outcome in outcomes.iter().take(3) {
        if let Ok(result) = &outcome.result {
            let titles: Vec<&str> = result.matches.iter().map(|m| m.segment.title.as_str()).collect();
            println!("  {}: {:?}", outcome.activity_id, titles);
        }
    }

    println!("\nStats:");
    println!("  Activities: {}", outcomes.len());
    println!("  Matches: {}", total_matches);
    println!("  Rejected candidates: {}", total_rejections);
    println!("  Failed: {}", failed);
}

/// A ride due north from the origin, one sample every 5 seconds.
fn straight_ride(metric: &LocalPlanar, samples: usize, step: f64, t0: DateTime<Utc>) -> Vec<Waypoint> {
    (0..samples)
        .map(|i| {
            let north = i as f64 * step;
            let east = if i % 2 == 0 { 1.5 } else { -1.5 };
            let point = metric.denormalize(geo::coord! { x: east, y: north });
            Waypoint::new(point, north, t0 + Duration::seconds(5 * i as i64))
        })
        .collect()
}
