//! Error types.
//!
//! Two tiers:
//! - [`MatchError`] is returned as `Err` and means the input broke a contract
//!   (a malformed waypoint or segment). The call produces nothing.
//! - [`Rejection`] is the expected, recoverable outcome of trying one
//!   start/finish candidate. It never escapes candidate pairing; it is logged
//!   and recorded in the [`MatchOutcome`](crate::MatchOutcome).

use thiserror::Error;

use crate::Endpoint;

/// Input contract violations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error("waypoint {index} has an invalid coordinate or distance")]
    InvalidWaypoint { index: usize },

    #[error("cumulative distance decreases at waypoint {index} ({previous:.1}m -> {current:.1}m)")]
    DistanceDecreasing {
        index: usize,
        previous: f64,
        current: f64,
    },

    #[error("segment '{title}' is invalid: {reason}")]
    InvalidSegment { title: String, reason: String },

    #[error("segment title '{0}' is used more than once")]
    DuplicateTitle(String),

    #[error("segments '{first}' and '{second}' share the same start and finish")]
    DuplicateEndpoints { first: String, second: String },
}

/// Why a start/finish candidate was abandoned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("traversed {traversed:.0}m does not match segment distance {expected:.0}m")]
    DistanceMismatch { traversed: f64, expected: f64 },

    #[error("{endpoint} never within tolerance (closest {closest:.1}m)")]
    EndpointNotReached { endpoint: Endpoint, closest: f64 },

    #[error("interpolated time out of range")]
    TimeOutOfRange,

    #[error("finish time is not after start time")]
    NonIncreasingTime,

    #[error("no finish after start")]
    NoQualifyingFinish,
}

impl Rejection {
    /// Which end of the segment failed, if the rejection is endpoint-specific.
    pub fn endpoint(&self) -> Option<Endpoint> {
        match self {
            Rejection::EndpointNotReached { endpoint, .. } => Some(*endpoint),
            _ => None,
        }
    }
}
