//! Basic example of finding segment traversals in one activity.
//!
//! Run with: cargo run --example basic_matching

use chrono::{DateTime, Duration, Utc};
use segment_matcher::geo_utils::LocalPlanar;
use segment_matcher::{find_segments, GpsPoint, MatchConfig, Segment, SegmentCatalog, Waypoint};

fn main() {
    let origin = GpsPoint::new(51.5074, -0.1278); // London
    let metric = LocalPlanar::new(origin);
    let at = |east: f64, north: f64| metric.denormalize(geo::coord! { x: east, y: north });

    // A ride heading north for 2km, sampled every 10 seconds at ~5m/s,
    // wandering a few meters either side of the road
    let t0: DateTime<Utc> = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let mut waypoints = Vec::new();
    let mut distance = 0.0;
    let mut previous = (0.0, 0.0);
    for i in 0..=40 {
        let east = if i % 3 == 0 { 2.5 } else { -1.5 };
        let north = i as f64 * 50.0;
        if i > 0 {
            distance += f64::hypot(east - previous.0, north - previous.1);
        }
        previous = (east, north);
        waypoints.push(Waypoint::new(at(east, north), distance, t0 + Duration::seconds(10 * i)));
    }

    let segments = vec![
        Segment::new("seg-1", "Park Climb", at(0.0, 100.0), at(0.0, 900.0), 800.0)
            .with_description("Steady drag through the park"),
        Segment::new("seg-2", "Bridge Sprint", at(0.0, 1200.0), at(0.0, 1600.0), 400.0),
        // Declared much longer than the ride between its ends
        Segment::new("seg-3", "Long Way Round", at(0.0, 300.0), at(0.0, 800.0), 1500.0),
        // Off the route entirely
        Segment::new("seg-4", "Riverside", at(800.0, 0.0), at(800.0, 1000.0), 1000.0),
    ];

    let config = MatchConfig::default();
    let catalog = match SegmentCatalog::new(segments, &config) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Invalid catalog: {}", e);
            return;
        }
    };

    println!("Segment Matching Example\n");
    println!(
        "Config: border={}m, inner={}m, tolerance={:.0}%, suppression={}\n",
        config.border_meters,
        config.inner_meters,
        config.distance_tolerance * 100.0,
        config.suppression_factor
    );
    println!("Trace: {} waypoints, {:.0}m\n", waypoints.len(), distance);

    let outcome = match find_segments(&catalog, &waypoints, &config) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Matching failed: {}", e);
            return;
        }
    };

    println!("Matches:");
    for m in &outcome.matches {
        println!(
            "  {} ({}): {} -> {} ({}s)",
            m.segment.title,
            m.segment.id,
            m.start_time.format("%H:%M:%S"),
            m.finish_time.format("%H:%M:%S"),
            m.elapsed().num_seconds()
        );
    }

    println!("\nRejected candidates:");
    for r in &outcome.rejections {
        println!(
            "  {} (start {}..={}): {}",
            r.segment.title, r.start.first, r.start.last, r.reason
        );
    }

    println!("\nRecords:");
    for record in outcome.into_records("activity-1") {
        println!(
            "  {} / {}: {} -> {}",
            record.segment_id, record.activity_id, record.start_time, record.finish_time
        );
    }
}
