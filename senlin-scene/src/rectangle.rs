use crate::{meters_to_latitude_delta, meters_to_longitude_delta, Cartographic};
use std::f64::consts::{FRAC_PI_2, PI};

/// A geographic bounding box with edges in radians.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rectangle {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Rectangle {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Rectangle {
            west,
            south,
            east,
            north,
        }
    }

    pub fn from_degrees(west: f64, south: f64, east: f64, north: f64) -> Self {
        Rectangle {
            west: west.to_radians(),
            south: south.to_radians(),
            east: east.to_radians(),
            north: north.to_radians(),
        }
    }

    /// Rectangle covering `radius_meters` in every direction around `center`,
    /// clamped to valid coordinates at the poles and the antimeridian.
    pub fn from_center_and_radius(center: &Cartographic, radius_meters: f64) -> Self {
        let dlat = meters_to_latitude_delta(radius_meters);
        let dlon = meters_to_longitude_delta(radius_meters, center.latitude);
        Rectangle {
            west: (center.longitude - dlon).max(-PI),
            south: (center.latitude - dlat).max(-FRAC_PI_2),
            east: (center.longitude + dlon).min(PI),
            north: (center.latitude + dlat).min(FRAC_PI_2),
        }
    }

    pub fn center(&self) -> Cartographic {
        Cartographic::from_radians(
            (self.west + self.east) * 0.5,
            (self.south + self.north) * 0.5,
            0.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn contains(&self, position: &Cartographic) -> bool {
        position.longitude >= self.west
            && position.longitude <= self.east
            && position.latitude >= self.south
            && position.latitude <= self.north
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_center_and_radius_contains_center() {
        let center = Cartographic::from_degrees(120.15, 30.25, 0.0);
        let rectangle = Rectangle::from_center_and_radius(&center, 700.0);
        assert!(rectangle.contains(&center));
        assert!(rectangle.width() > 0.0);
        assert!(rectangle.height() > 0.0);
    }

    #[test]
    fn test_from_center_and_radius_widens_toward_poles() {
        let equator = Rectangle::from_center_and_radius(&Cartographic::from_degrees(0.0, 0.0, 0.0), 700.0);
        let north = Rectangle::from_center_and_radius(&Cartographic::from_degrees(0.0, 70.0, 0.0), 700.0);
        assert!(north.width() > equator.width());
        assert!((north.height() - equator.height()).abs() < 1e-12);
    }

    #[test]
    fn test_clamped_at_pole() {
        let rectangle =
            Rectangle::from_center_and_radius(&Cartographic::from_degrees(0.0, 89.9999, 0.0), 50_000.0);
        assert!(rectangle.north <= FRAC_PI_2);
        assert!(rectangle.east <= PI);
        assert!(rectangle.west >= -PI);
    }

    #[test]
    fn test_contains_excludes_outside_points() {
        let rectangle = Rectangle::from_degrees(10.0, 40.0, 11.0, 41.0);
        assert!(rectangle.contains(&Cartographic::from_degrees(10.5, 40.5, 0.0)));
        assert!(!rectangle.contains(&Cartographic::from_degrees(12.0, 40.5, 0.0)));
        assert!(!rectangle.contains(&Cartographic::from_degrees(10.5, 39.0, 0.0)));
    }
}
