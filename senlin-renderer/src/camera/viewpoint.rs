use bevy::prelude::*;
use senlin_scene::{Cartographic, GeographicProjection, TerrainSampler};
use std::sync::Arc;

use super::StreamingCamera;

/// The anchored projection and terrain source shared by every system that
/// maps between geographic positions and the scene.
#[derive(Resource)]
pub struct SceneFrame {
    pub projection: GeographicProjection,
    pub terrain: Arc<dyn TerrainSampler>,
}

impl SceneFrame {
    pub fn new(origin: Cartographic, terrain: Arc<dyn TerrainSampler>) -> Self {
        SceneFrame {
            projection: GeographicProjection::new(origin),
            terrain,
        }
    }
}

/// The camera expressed geographically, refreshed every frame.
#[derive(Resource, Default)]
pub struct CameraViewpoint {
    pub camera: Option<Cartographic>,
    /// Terrain height under the camera, when the sampler knows it.
    pub ground_height: Option<f64>,
}

impl CameraViewpoint {
    /// Height of the camera above the ground below it. Falls back to height
    /// above the reference surface where the terrain is unknown.
    pub fn camera_agl(&self) -> Option<f64> {
        let camera = self.camera?;
        Some(camera.height - self.ground_height.unwrap_or(0.0))
    }

    /// The ground point streaming distances are measured from.
    pub fn center(&self) -> Option<Cartographic> {
        let camera = self.camera?;
        Some(Cartographic::from_radians(
            camera.longitude,
            camera.latitude,
            self.ground_height.unwrap_or(0.0),
        ))
    }
}

pub(crate) fn update_viewpoint(
    mut viewpoint: ResMut<CameraViewpoint>,
    frame: Res<SceneFrame>,
    camera_query: Query<&Transform, With<StreamingCamera>>,
) {
    let Ok(transform) = camera_query.get_single() else {
        return;
    };
    let camera = frame
        .projection
        .unproject(&transform.translation.as_dvec3());
    viewpoint.ground_height = frame.terrain.height_at(camera.longitude, camera.latitude);
    viewpoint.camera = Some(camera);
}
