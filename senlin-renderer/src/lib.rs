#![warn(
    clippy::unwrap_used,
    clippy::cast_lossless,
    clippy::unimplemented,
    clippy::indexing_slicing,
    clippy::expect_used
)]

use bevy::prelude::*;
use senlin_scene::{Cartographic, ConstantTerrain, TerrainSampler};
use std::sync::Arc;

pub mod camera;
pub mod streaming;

pub use camera::{
    ActivityState, CameraActivity, CameraSettled, CameraViewpoint, SceneFrame, StreamingCamera,
};
pub use streaming::{
    LiveEntry, PlacementSet, PoolKey, QueueItem, ResourcePool, StreamCommand, StreamStats,
    StreamingConfig, StreamingScheduler, StreamingSource,
};

/// The full vegetation streaming stack: camera observation, data loading,
/// the scheduler and scene installation.
pub struct RendererPlugin {
    pub source: StreamingSource,
    pub origin: Cartographic,
    pub terrain: Arc<dyn TerrainSampler>,
}

impl RendererPlugin {
    pub fn new(source: StreamingSource, origin: Cartographic) -> Self {
        RendererPlugin {
            source,
            origin,
            terrain: Arc::new(ConstantTerrain(0.0)),
        }
    }

    pub fn with_terrain(mut self, terrain: Arc<dyn TerrainSampler>) -> Self {
        self.terrain = terrain;
        self
    }
}

impl Plugin for RendererPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.source.clone());
        app.insert_resource(SceneFrame::new(self.origin, self.terrain.clone()));
        app.add_plugins(senlin_jobs::Plugin);
        app.add_plugins(senlin_loader::LoaderPlugin);
        app.add_plugins(camera::Plugin);
        app.add_plugins(streaming::Plugin);
    }
}
