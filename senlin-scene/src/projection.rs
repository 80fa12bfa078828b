use crate::{Cartographic, EARTH_MEAN_RADIUS, EPSILON10};
use bevy::math::DVec3;

/// Equirectangular projection anchored at an origin, mapping geographic
/// positions onto scene meters. Axes follow the renderer: +x east, +y up,
/// -z north. Longitude is scaled by the cosine of the origin latitude so
/// east-west meters stay true near the anchor.
#[derive(Debug, Copy, Clone)]
pub struct GeographicProjection {
    origin: Cartographic,
    cos_origin_latitude: f64,
}

impl GeographicProjection {
    pub fn new(origin: Cartographic) -> Self {
        GeographicProjection {
            origin,
            cos_origin_latitude: origin.latitude.cos().abs().max(EPSILON10),
        }
    }

    pub fn origin(&self) -> &Cartographic {
        &self.origin
    }

    pub fn project(&self, cartographic: &Cartographic) -> DVec3 {
        let east = (cartographic.longitude - self.origin.longitude)
            * self.cos_origin_latitude
            * EARTH_MEAN_RADIUS;
        let north = (cartographic.latitude - self.origin.latitude) * EARTH_MEAN_RADIUS;
        DVec3::new(east, cartographic.height, -north)
    }

    pub fn unproject(&self, position: &DVec3) -> Cartographic {
        Cartographic {
            longitude: self.origin.longitude
                + position.x / (EARTH_MEAN_RADIUS * self.cos_origin_latitude),
            latitude: self.origin.latitude - position.z / EARTH_MEAN_RADIUS,
            height: position.y,
        }
    }
}
