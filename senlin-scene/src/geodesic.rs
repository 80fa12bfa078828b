use crate::{Cartographic, EARTH_MEAN_RADIUS, EPSILON10};

/// Great-circle distance between two geographic positions in meters,
/// computed with the haversine formula on the mean-radius sphere. Heights
/// are ignored.
pub fn surface_distance(a: &Cartographic, b: &Cartographic) -> f64 {
    let half_dlat = (b.latitude - a.latitude) * 0.5;
    let half_dlon = (b.longitude - a.longitude) * 0.5;
    let h = half_dlat.sin().powi(2)
        + a.latitude.cos() * b.latitude.cos() * half_dlon.sin().powi(2);
    2.0 * EARTH_MEAN_RADIUS * h.sqrt().min(1.0).asin()
}

/// Radius of the ground disc that still lies inside a streaming sphere of
/// `streaming_radius` meters centered on a camera `camera_agl` meters above
/// the ground. Zero once the camera climbs out of the sphere.
pub fn ground_budget(streaming_radius: f64, camera_agl: f64) -> f64 {
    // a camera below the sampled ground still sees the full disc
    let agl = camera_agl.max(0.0);
    if agl >= streaming_radius {
        return 0.0;
    }
    (streaming_radius * streaming_radius - agl * agl).sqrt()
}

pub fn meters_to_latitude_delta(meters: f64) -> f64 {
    meters / EARTH_MEAN_RADIUS
}

pub fn meters_to_longitude_delta(meters: f64, latitude: f64) -> f64 {
    let cos_lat = latitude.cos().abs().max(EPSILON10);
    meters / (EARTH_MEAN_RADIUS * cos_lat)
}
