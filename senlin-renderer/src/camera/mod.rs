use bevy::prelude::*;

mod activity;
mod viewpoint;

pub use activity::*;
pub use viewpoint::*;

/// Marks the camera whose position drives streaming.
#[derive(Component)]
pub struct StreamingCamera;

pub struct Plugin;

impl bevy::prelude::Plugin for Plugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(CameraActivity::default());
        app.insert_resource(CameraViewpoint::default());
        app.add_event::<CameraSettled>();
        app.add_systems(Update, (watch_camera_activity, update_viewpoint).chain());
    }
}
