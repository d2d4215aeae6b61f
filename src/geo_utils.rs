//! # Geographic Utilities
//!
//! Distance computations used by the segment matcher.
//!
//! | Item | Description |
//! |------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`LocalPlanar`] | Tangent-plane projection around a reference point |
//!
//! ## Local planar metric
//!
//! Endpoint refinement compares many short distances around a single target
//! coordinate. Rather than evaluating the haversine formula for each one, points
//! are projected onto a flat plane centred on the target (an equirectangular
//! projection scaled by `cos(latitude)` of the reference). Within a few
//! kilometres of the reference the Euclidean distance in that plane agrees with
//! the great-circle distance to well under one percent, and the projection makes
//! point-to-line projections plain vector arithmetic.
//!
//! ```rust
//! use segment_matcher::{GpsPoint, geo_utils::LocalPlanar};
//!
//! let origin = GpsPoint::new(51.5074, -0.1278);
//! let metric = LocalPlanar::new(origin);
//!
//! let north = metric.denormalize(geo::coord! { x: 0.0, y: 100.0 });
//! assert!((metric.distance(&origin, &north) - 100.0).abs() < 1e-6);
//! ```

use geo::{Coord, Distance, Haversine, Point};

use crate::GpsPoint;

/// Mean earth radius in meters (IUGG).
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Calculate the great-circle distance between two GPS points in meters.
///
/// ```rust
/// use segment_matcher::{GpsPoint, geo_utils};
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// A flat x/y coordinate system in meters, centred on a reference point.
///
/// `x` grows eastwards and `y` northwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalPlanar {
    origin: GpsPoint,
    /// Meters per degree of longitude at the origin's latitude.
    x_scale: f64,
    /// Meters per degree of latitude.
    y_scale: f64,
}

impl LocalPlanar {
    /// Create a metric centred on `origin`.
    pub fn new(origin: GpsPoint) -> Self {
        let y_scale = EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0;
        let x_scale = y_scale * origin.latitude.to_radians().cos();
        Self {
            origin,
            x_scale,
            y_scale,
        }
    }

    /// The reference point.
    pub fn origin(&self) -> GpsPoint {
        self.origin
    }

    /// Project a coordinate into the local plane (meters relative to the origin).
    ///
    /// Longitude differences are taken the short way round, so points across
    /// the antimeridian stay close.
    #[inline]
    pub fn normalize(&self, point: &GpsPoint) -> Coord<f64> {
        let mut dlon = point.longitude - self.origin.longitude;
        if dlon > 180.0 {
            dlon -= 360.0;
        } else if dlon < -180.0 {
            dlon += 360.0;
        }
        Coord {
            x: dlon * self.x_scale,
            y: (point.latitude - self.origin.latitude) * self.y_scale,
        }
    }

    /// Inverse of [`normalize`](Self::normalize).
    ///
    /// The longitude is not wrapped and may fall just outside ±180° near the
    /// antimeridian.
    #[inline]
    pub fn denormalize(&self, coord: Coord<f64>) -> GpsPoint {
        GpsPoint::new(
            self.origin.latitude + coord.y / self.y_scale,
            self.origin.longitude + coord.x / self.x_scale,
        )
    }

    /// Euclidean distance between two points after projection.
    #[inline]
    pub fn distance(&self, p1: &GpsPoint, p2: &GpsPoint) -> f64 {
        let a = self.normalize(p1);
        let b = self.normalize(p2);
        (a.x - b.x).hypot(a.y - b.y)
    }

    /// Distance from a point to the origin.
    #[inline]
    pub fn distance_to_origin(&self, point: &GpsPoint) -> f64 {
        let c = self.normalize(point);
        c.x.hypot(c.y)
    }
}
