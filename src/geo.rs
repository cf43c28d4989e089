//! Tenth-of-a-degree location buckets.
//!
//! Airports and weather stations are matched by equality on the bucket, not
//! by distance. Two points a few hundred metres apart can land in different
//! buckets when they straddle a bucket edge, and every station inside one
//! bucket is indistinguishable from the airport.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeoBucket {
    pub lat: i64,
    pub lon: i64,
}

pub fn quantize(lat: f64, lon: f64) -> GeoBucket {
    GeoBucket {
        lat: quantize_degrees(lat),
        lon: quantize_degrees(lon),
    }
}

pub fn quantize_degrees(degrees: f64) -> i64 {
    // `as` saturates and maps NaN to 0.
    (degrees * 10.0).trunc() as i64
}
