use bevy::prelude::*;
use senlin_loader::LoaderCommand;
use std::time::Duration;

use super::StreamingCamera;

/// Sent once each time the camera comes to rest after moving.
#[derive(Event, Debug, Clone, Copy, Default)]
pub struct CameraSettled;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    Idle,
    Moving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityTransition {
    StartedMoving,
    Settled,
}

/// Debounced movement state of the streaming camera. Movement is observed
/// from the transform, not from input, so every navigation style is covered
/// by the same rule.
#[derive(Resource)]
pub struct CameraActivity {
    state: ActivityState,
    last_translation: Option<Vec3>,
    settle_timer: Timer,
    /// Per-frame travel below this many scene meters counts as rest.
    pub move_epsilon: f32,
}

impl Default for CameraActivity {
    fn default() -> Self {
        CameraActivity {
            state: ActivityState::Idle,
            last_translation: None,
            settle_timer: Timer::from_seconds(0.4, TimerMode::Once),
            move_epsilon: 0.05,
        }
    }
}

impl CameraActivity {
    pub fn with_settle_delay(seconds: f32) -> Self {
        CameraActivity {
            settle_timer: Timer::from_seconds(seconds, TimerMode::Once),
            ..Default::default()
        }
    }

    pub fn state(&self) -> ActivityState {
        self.state
    }

    pub fn is_moving(&self) -> bool {
        self.state == ActivityState::Moving
    }

    /// Feeds one observation of the camera. Returns the transition if this
    /// observation caused one; settling fires exactly once per rest.
    pub fn observe(&mut self, translation: Vec3, delta: Duration) -> Option<ActivityTransition> {
        let moved = match self.last_translation {
            Some(last) => translation.distance(last) > self.move_epsilon,
            None => false,
        };
        self.last_translation = Some(translation);
        match self.state {
            ActivityState::Idle => {
                if moved {
                    self.state = ActivityState::Moving;
                    self.settle_timer.reset();
                    Some(ActivityTransition::StartedMoving)
                } else {
                    None
                }
            }
            ActivityState::Moving => {
                if moved {
                    self.settle_timer.reset();
                    None
                } else {
                    self.settle_timer.tick(delta);
                    if self.settle_timer.finished() {
                        self.state = ActivityState::Idle;
                        Some(ActivityTransition::Settled)
                    } else {
                        None
                    }
                }
            }
        }
    }
}

pub(crate) fn watch_camera_activity(
    mut activity: ResMut<CameraActivity>,
    time: Res<Time>,
    camera_query: Query<&Transform, With<StreamingCamera>>,
    mut settled: EventWriter<CameraSettled>,
    mut loader_commands: EventWriter<LoaderCommand>,
) {
    let Ok(transform) = camera_query.get_single() else {
        return;
    };
    match activity.observe(transform.translation, time.delta()) {
        Some(ActivityTransition::StartedMoving) => {
            loader_commands.send(LoaderCommand::SetMoving(true));
        }
        Some(ActivityTransition::Settled) => {
            loader_commands.send(LoaderCommand::SetMoving(false));
            settled.send(CameraSettled);
        }
        None => {}
    }
}
