use bevy::core_pipeline::tonemapping::Tonemapping;
use bevy::prelude::*;
use senlin_renderer::{RendererPlugin, StreamingCamera, StreamingSource};
use senlin_scene::Cartographic;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(RendererPlugin::new(
            StreamingSource {
                features_path: "assets/demo_trees.json".into(),
                catalog_path: "assets/demo_species.json".into(),
            },
            Cartographic::from_degrees(120.15, 30.25, 0.0),
        ))
        .add_systems(Startup, setup)
        .run();
}

fn setup(mut commands: Commands) {
    commands.spawn((
        Camera3dBundle {
            transform: Transform::from_xyz(0.0, 80.0, 240.0).looking_at(Vec3::ZERO, Vec3::Y),
            tonemapping: Tonemapping::None,
            ..default()
        },
        StreamingCamera,
    ));
    commands.spawn(DirectionalLightBundle {
        transform: Transform::from_rotation(Quat::from_euler(EulerRot::XYZ, -0.9, 0.4, 0.0)),
        ..default()
    });
}
