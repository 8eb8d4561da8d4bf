//! Local player controller: turns the pose supplied by input/physics into
//! throttled UpdatePlayer messages.

use crate::tracker::RenderPose;
use shared::{LocomotionState, Message, PlayerUpdate, Vec3};

/// Kinematics of the local player for one tick, as produced by the
/// input/physics layer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocalPose {
    pub position: Vec3,
    pub velocity: Vec3,
    pub state: LocomotionState,
    pub yaw: f32,
}

/// Whether the render loop is running or the client is paused in the
/// background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Active,
    Idle,
}

/// Send rates in updates per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdatePolicy {
    pub active_hz: f64,
    pub idle_hz: f64,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self {
            active_hz: 10.0,
            idle_hz: 2.0,
        }
    }
}

impl UpdatePolicy {
    pub fn interval(&self, activity: Activity) -> f64 {
        let hz = match activity {
            Activity::Active => self.active_hz,
            Activity::Idle => self.idle_hz,
        };
        1.0 / hz
    }
}

#[derive(Debug, Clone)]
pub struct LocalController {
    policy: UpdatePolicy,
    pose: LocalPose,
    last_sent: Option<f64>,
    updates_sent: u64,
}

impl LocalController {
    pub fn new(policy: UpdatePolicy) -> Self {
        Self {
            policy,
            pose: LocalPose::default(),
            last_sent: None,
            updates_sent: 0,
        }
    }

    pub fn policy(&self) -> UpdatePolicy {
        self.policy
    }

    pub fn updates_sent(&self) -> u64 {
        self.updates_sent
    }

    /// Records this tick's pose and returns an update if one is due.
    ///
    /// The first call always sends. After that an update goes out once more
    /// than one send interval has passed since the last one, so the send
    /// cadence is independent of the frame rate.
    pub fn poll(&mut self, now: f64, pose: LocalPose, activity: Activity) -> Option<Message> {
        self.pose = pose;

        let due = match self.last_sent {
            None => true,
            Some(last) => now - last > self.policy.interval(activity),
        };
        if !due {
            return None;
        }

        self.last_sent = Some(now);
        self.updates_sent += 1;

        // The server fills in the player id.
        Some(Message::UpdatePlayer(PlayerUpdate {
            player_id: 0,
            velocity: pose.velocity,
            position: pose.position,
            state: pose.state,
            yaw: pose.yaw,
        }))
    }

    /// The local player is drawn straight from its own kinematics.
    pub fn render_pose(&self) -> RenderPose {
        RenderPose {
            position: self.pose.position,
            yaw: self.pose.yaw,
            state: self.pose.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn pose_at(x: f32) -> LocalPose {
        LocalPose {
            position: Vec3::new(x, 0.0, 0.0),
            velocity: Vec3::new(1.0, 0.0, 0.0),
            state: LocomotionState::Walk,
            yaw: 0.3,
        }
    }

    #[test]
    fn test_policy_intervals() {
        let policy = UpdatePolicy::default();
        assert_approx_eq!(policy.interval(Activity::Active), 0.1);
        assert_approx_eq!(policy.interval(Activity::Idle), 0.5);
    }

    #[test]
    fn test_first_poll_sends() {
        let mut controller = LocalController::new(UpdatePolicy::default());
        let message = controller.poll(0.0, pose_at(1.0), Activity::Active);

        match message {
            Some(Message::UpdatePlayer(update)) => {
                assert_eq!(update.position, Vec3::new(1.0, 0.0, 0.0));
                assert_eq!(update.velocity, Vec3::new(1.0, 0.0, 0.0));
                assert_eq!(update.state, LocomotionState::Walk);
                assert_eq!(update.yaw, 0.3);
            }
            other => panic!("Expected update, got {:?}", other),
        }
        assert_eq!(controller.updates_sent(), 1);
    }

    #[test]
    fn test_active_rate_is_throttled() {
        let mut controller = LocalController::new(UpdatePolicy::default());

        // 60 frames per second for one second.
        let sent = (0..60)
            .filter(|frame| {
                let now = *frame as f64 / 60.0;
                controller.poll(now, pose_at(0.0), Activity::Active).is_some()
            })
            .count();

        assert!((5..=10).contains(&sent), "sent {} updates", sent);
    }

    #[test]
    fn test_idle_rate_is_slower() {
        let mut controller = LocalController::new(UpdatePolicy::default());

        let sent = (0..120)
            .filter(|frame| {
                let now = *frame as f64 / 60.0;
                controller.poll(now, pose_at(0.0), Activity::Idle).is_some()
            })
            .count();

        assert!((2..=4).contains(&sent), "sent {} updates", sent);
    }

    #[test]
    fn test_no_send_within_interval() {
        let mut controller = LocalController::new(UpdatePolicy::default());
        assert!(controller.poll(1.0, pose_at(0.0), Activity::Active).is_some());
        assert!(controller.poll(1.05, pose_at(0.0), Activity::Active).is_none());
        assert!(controller.poll(1.2, pose_at(0.0), Activity::Active).is_some());
    }

    #[test]
    fn test_render_pose_tracks_latest_input() {
        let mut controller = LocalController::new(UpdatePolicy::default());
        controller.poll(0.0, pose_at(1.0), Activity::Active);
        controller.poll(0.01, pose_at(2.0), Activity::Active);

        let pose = controller.render_pose();
        assert_eq!(pose.position, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(pose.state, LocomotionState::Walk);
    }
}
