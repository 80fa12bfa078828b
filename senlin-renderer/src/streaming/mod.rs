mod install;
mod placements;
mod pool;
mod scheduler;
mod stats;

pub use install::{placement_transform, ForceCycle, MaterialCache, SharedQuad, StreamedAsset};
pub use placements::{PlacementSet, StreamingSource};
pub use pool::{PoolKey, ResourcePool};
pub use scheduler::{
    plan_cycle, CycleInput, CyclePlan, LiveEntry, PendingLoad, QueueItem, StreamingConfig,
    StreamingScheduler,
};
pub use stats::StreamStats;

use bevy::prelude::*;
use senlin_loader::ResourceLoader;

use crate::camera::{CameraActivity, CameraSettled, CameraViewpoint};

/// Control events for the streamed layer.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCommand {
    /// Hide or show every streamed asset. Hiding cancels outstanding work
    /// and parks residents; showing re-syncs against the current camera.
    SetVisible(bool),
    /// Plan a new cycle next frame even if the camera has not moved.
    Refresh,
}

pub struct Plugin;

impl bevy::prelude::Plugin for Plugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<StreamingConfig>()
            .init_resource::<StreamingScheduler>()
            .init_resource::<ResourcePool>()
            .init_resource::<MaterialCache>()
            .init_resource::<PlacementSet>()
            .init_resource::<StreamStats>()
            .init_resource::<ForceCycle>()
            .add_event::<StreamCommand>()
            .add_systems(
                Startup,
                (install::setup_shared_assets, placements::begin_loading),
            )
            .add_systems(
                Update,
                (
                    placements::receive_placements,
                    placements::receive_heights,
                    placements::ensure_heights,
                    apply_stream_commands,
                    streaming_cycle,
                    install::evict_while_moving,
                    // removals apply before anything new spawns
                    install::apply_retirements,
                    install::refresh_transforms,
                    install::drain_queue,
                    install::receive_loaded_assets,
                    stats::update_stats,
                )
                    .chain(),
            );
    }
}

/// Plans a new cycle when something calls for one: a forced refresh, the
/// camera settling, or idle drift past the move threshold.
fn streaming_cycle(
    mut scheduler: ResMut<StreamingScheduler>,
    mut force: ResMut<ForceCycle>,
    mut settled: EventReader<CameraSettled>,
    activity: Res<CameraActivity>,
    viewpoint: Res<CameraViewpoint>,
    placement_set: Res<PlacementSet>,
    config: Res<StreamingConfig>,
    mut stats: ResMut<StreamStats>,
) {
    let forced = std::mem::take(&mut force.0);
    let settled_now = settled.iter().count() > 0;
    if !scheduler.is_visible() || !placement_set.is_loaded() {
        return;
    }
    let (Some(center), Some(camera_agl)) = (viewpoint.center(), viewpoint.camera_agl()) else {
        return;
    };
    let run = forced
        || settled_now
        || (!activity.is_moving() && scheduler.center_drifted(&center, config.move_threshold));
    if !run {
        return;
    }
    if scheduler.run_cycle(
        center,
        camera_agl,
        &placement_set.placements,
        &placement_set.index,
        &config,
    ) {
        stats.note_cycle(&scheduler);
        debug!(
            "cycle v{}: {} resident, {} queued, {} retiring",
            scheduler.version(),
            scheduler.live_count(),
            scheduler.queued_count(),
            scheduler.retiring_count(),
        );
    }
}

fn apply_stream_commands(
    mut events: EventReader<StreamCommand>,
    mut scheduler: ResMut<StreamingScheduler>,
    mut loader: ResMut<ResourceLoader>,
    mut force: ResMut<ForceCycle>,
    mut visibilities: Query<&mut Visibility, With<StreamedAsset>>,
) {
    for command in events.iter() {
        match command {
            StreamCommand::SetVisible(false) if scheduler.is_visible() => {
                scheduler.set_visible(false);
                scheduler.clear_work();
                loader.cancel_all();
                for entry in scheduler.live().values() {
                    if let Ok(mut visibility) = visibilities.get_mut(entry.entity) {
                        *visibility = Visibility::Hidden;
                    }
                }
                info!("streamed layer hidden, {} assets parked", scheduler.live_count());
            }
            StreamCommand::SetVisible(true) if !scheduler.is_visible() => {
                scheduler.set_visible(true);
                for entry in scheduler.live().values() {
                    if let Ok(mut visibility) = visibilities.get_mut(entry.entity) {
                        *visibility = Visibility::Inherited;
                    }
                }
                force.0 = true;
            }
            StreamCommand::SetVisible(_) => {}
            StreamCommand::Refresh => {
                force.0 = true;
            }
        }
    }
}
