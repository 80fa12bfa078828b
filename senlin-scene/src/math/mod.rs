mod cartographic;

pub use cartographic::*;

pub const EPSILON5: f64 = 0.00001;
pub const EPSILON7: f64 = 0.0000001;
pub const EPSILON10: f64 = 0.0000000001;
pub const EPSILON14: f64 = 1e-14;

/// Mean radius of the earth in meters, the radius of the sphere every
/// surface distance here is measured on.
pub const EARTH_MEAN_RADIUS: f64 = 6_371_008.8;

pub fn equals_epsilon(left: f64, right: f64, epsilon: f64) -> bool {
    (left - right).abs() <= epsilon
}
