use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use bevy::utils::HashMap;
use senlin_loader::{DecodedImage, LoadError, RequestKey, ResourceLoader};
use senlin_scene::{AssetPlacement, FeatureId};

use super::placements::PlacementSet;
use super::pool::{PoolKey, ResourcePool};
use super::scheduler::{LiveEntry, QueueItem, StreamingConfig, StreamingScheduler};
use super::stats::StreamStats;
use crate::camera::{CameraActivity, CameraViewpoint, SceneFrame};

/// Unit quad every streamed billboard instances. Scale carries the size.
#[derive(Resource)]
pub struct SharedQuad(pub Handle<Mesh>);

/// One material per texture url, shared across every asset using it.
#[derive(Resource, Default)]
pub struct MaterialCache {
    materials: HashMap<String, Handle<StandardMaterial>>,
}

impl MaterialCache {
    pub fn get(&self, url: &str) -> Option<Handle<StandardMaterial>> {
        self.materials.get(url).cloned()
    }

    pub fn insert(&mut self, url: String, handle: Handle<StandardMaterial>) {
        self.materials.insert(url, handle);
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

/// Marks an entity owned by the streaming layer.
#[derive(Component)]
pub struct StreamedAsset {
    pub fid: FeatureId,
}

/// Set to run a streaming cycle on the next frame regardless of camera
/// movement.
#[derive(Resource, Default)]
pub struct ForceCycle(pub bool);

type AssetQuery<'w, 's> =
    Query<'w, 's, (&'static mut Transform, &'static mut Visibility, &'static mut StreamedAsset)>;

pub(super) fn setup_shared_assets(mut commands: Commands, mut meshes: ResMut<Assets<Mesh>>) {
    let quad = meshes.add(Mesh::from(shape::Quad::new(Vec2::new(1.0, 1.0))));
    commands.insert_resource(SharedQuad(quad));
}

/// World transform of a placement: feet on the ground, yawed, scaled to the
/// asset's height.
pub fn placement_transform(placement: &AssetPlacement, frame: &SceneFrame) -> Transform {
    let world = frame.projection.project(&placement.cartographic());
    let scale = placement.scale as f32;
    Transform {
        // the quad is centered on its origin, lift it by half its height
        translation: world.as_vec3() + Vec3::Y * (scale * 0.5),
        rotation: Quat::from_rotation_y(placement.yaw as f32),
        scale: Vec3::splat(scale),
    }
}

fn decoded_to_image(decoded: &DecodedImage) -> Image {
    Image::new(
        Extent3d {
            width: decoded.width,
            height: decoded.height,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        decoded.rgba.clone(),
        TextureFormat::Rgba8UnormSrgb,
    )
}

#[allow(clippy::too_many_arguments)]
fn build_asset_entity(
    commands: &mut Commands,
    images: &mut Assets<Image>,
    materials: &mut Assets<StandardMaterial>,
    cache: &mut MaterialCache,
    quad: &SharedQuad,
    decoded: &DecodedImage,
    item: &QueueItem,
    placement: &AssetPlacement,
    frame: &SceneFrame,
    visible: bool,
) -> Entity {
    let material = match cache.get(&item.url) {
        Some(handle) => handle,
        None => {
            let texture = images.add(decoded_to_image(decoded));
            let handle = materials.add(StandardMaterial {
                base_color_texture: Some(texture),
                alpha_mode: AlphaMode::Mask(0.5),
                unlit: true,
                double_sided: true,
                cull_mode: None,
                ..default()
            });
            cache.insert(item.url.clone(), handle.clone());
            handle
        }
    };
    commands
        .spawn((
            PbrBundle {
                mesh: quad.0.clone(),
                material,
                transform: placement_transform(placement, frame),
                visibility: if visible {
                    Visibility::Inherited
                } else {
                    Visibility::Hidden
                },
                ..default()
            },
            StreamedAsset { fid: item.fid },
        ))
        .id()
}

/// Hides an entity and banks it in the pool keyed by what it looks like.
fn retire_entity(assets: &mut AssetQuery, pool: &mut ResourcePool, entry: &LiveEntry) {
    if let Ok((_, mut visibility, _)) = assets.get_mut(entry.entity) {
        *visibility = Visibility::Hidden;
    }
    pool.release(
        PoolKey {
            url: entry.url.clone(),
            tier: entry.tier,
        },
        entry.entity,
    );
}

/// Starts a few queue items per frame. Pool hits install immediately; misses
/// go through the throttled loader.
pub(super) fn drain_queue(
    mut scheduler: ResMut<StreamingScheduler>,
    mut pool: ResMut<ResourcePool>,
    mut loader: ResMut<ResourceLoader>,
    placement_set: Res<PlacementSet>,
    frame: Res<SceneFrame>,
    config: Res<StreamingConfig>,
    activity: Res<CameraActivity>,
    mut assets: AssetQuery,
) {
    if !scheduler.is_visible() || activity.is_moving() {
        return;
    }
    for item in scheduler.take_queued(config.drain_batch) {
        let Some(placement) = placement_set.placements.get(&item.fid) else {
            continue;
        };
        let key = PoolKey {
            url: item.url.clone(),
            tier: item.tier,
        };
        if let Some(entity) = pool.acquire(&key) {
            let reused = match assets.get_mut(entity) {
                Ok((mut transform, mut visibility, mut streamed)) => {
                    *transform = placement_transform(placement, &frame);
                    *visibility = Visibility::Inherited;
                    streamed.fid = item.fid;
                    true
                }
                Err(_) => false,
            };
            if reused {
                let displaced = scheduler.install(
                    item.fid,
                    LiveEntry {
                        entity,
                        tier: item.tier,
                        url: item.url,
                        ground_height: placement.ground_height,
                    },
                );
                if let Some(old) = displaced {
                    retire_entity(&mut assets, &mut pool, &old);
                }
                continue;
            }
        }
        let ticket = loader.request(RequestKey::from_url(&item.url), item.priority);
        scheduler.note_pending(item, ticket);
    }
}

/// Realizes finished fetches. A completion from a superseded cycle is banked
/// in the pool instead of installed, as is anything arriving while the layer
/// is hidden or the camera is in motion.
#[allow(clippy::too_many_arguments)]
pub(super) fn receive_loaded_assets(
    mut commands: Commands,
    mut scheduler: ResMut<StreamingScheduler>,
    mut pool: ResMut<ResourcePool>,
    mut cache: ResMut<MaterialCache>,
    mut stats: ResMut<StreamStats>,
    mut images: ResMut<Assets<Image>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    quad: Res<SharedQuad>,
    placement_set: Res<PlacementSet>,
    frame: Res<SceneFrame>,
    activity: Res<CameraActivity>,
    mut assets: AssetQuery,
) {
    for (pending, result) in scheduler.take_ready_pending() {
        let item = pending.item;
        match result {
            Ok(decoded) => {
                let Some(placement) = placement_set.placements.get(&item.fid) else {
                    stats.discards += 1;
                    continue;
                };
                let fresh = scheduler.is_current(item.version)
                    && scheduler.is_visible()
                    && !activity.is_moving();
                let entity = build_asset_entity(
                    &mut commands,
                    &mut images,
                    &mut materials,
                    &mut cache,
                    &quad,
                    &decoded,
                    &item,
                    placement,
                    &frame,
                    fresh,
                );
                if fresh {
                    stats.installs += 1;
                    let displaced = scheduler.install(
                        item.fid,
                        LiveEntry {
                            entity,
                            tier: item.tier,
                            url: item.url,
                            ground_height: placement.ground_height,
                        },
                    );
                    if let Some(old) = displaced {
                        retire_entity(&mut assets, &mut pool, &old);
                    }
                } else {
                    stats.discards += 1;
                    pool.release(
                        PoolKey {
                            url: item.url,
                            tier: item.tier,
                        },
                        entity,
                    );
                }
            }
            Err(LoadError::Cancelled) => {
                debug!("fetch cancelled for {}", item.url);
            }
            Err(e) => {
                warn!("asset load failed for {}: {}", item.url, e);
                stats.failures += 1;
            }
        }
    }
}

/// Applies a few retirements per frame, then despawns whatever the pool no
/// longer has room for.
pub(super) fn apply_retirements(
    mut commands: Commands,
    mut scheduler: ResMut<StreamingScheduler>,
    mut pool: ResMut<ResourcePool>,
    config: Res<StreamingConfig>,
    mut assets: AssetQuery,
) {
    for fid in scheduler.take_retirements(config.removal_batch) {
        if let Some(entry) = scheduler.remove_live(&fid) {
            retire_entity(&mut assets, &mut pool, &entry);
        }
    }
    for entity in pool.trim() {
        commands.entity(entity).despawn();
    }
}

/// Moves live assets whose ground height arrived after install.
pub(super) fn refresh_transforms(
    mut scheduler: ResMut<StreamingScheduler>,
    placement_set: Res<PlacementSet>,
    frame: Res<SceneFrame>,
    mut assets: AssetQuery,
) {
    for fid in scheduler.take_refreshes() {
        let Some(placement) = placement_set.placements.get(&fid) else {
            continue;
        };
        let Some(entry) = scheduler.live_entry_mut(&fid) else {
            continue;
        };
        if let Ok((mut transform, _, _)) = assets.get_mut(entry.entity) {
            *transform = placement_transform(placement, &frame);
            entry.ground_height = placement.ground_height;
        }
    }
}

/// While the camera is in motion only removals run. Residents that fall out
/// of the widened sphere are queued for retirement right away.
pub(super) fn evict_while_moving(
    activity: Res<CameraActivity>,
    viewpoint: Res<CameraViewpoint>,
    placement_set: Res<PlacementSet>,
    config: Res<StreamingConfig>,
    mut scheduler: ResMut<StreamingScheduler>,
) {
    if !activity.is_moving() || !scheduler.is_visible() {
        return;
    }
    let Some(center) = viewpoint.center() else {
        return;
    };
    let limit = config.radius * config.eviction_margin;
    let queued = scheduler.queue_evictions(&center, &placement_set.placements, limit);
    if queued > 0 {
        debug!("{} assets left the streaming sphere mid-flight", queued);
    }
}
