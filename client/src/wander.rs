//! Scripted stand-in for keyboard/mouse input and movement physics.
//!
//! Picks a locomotion state and heading at random every few seconds and
//! integrates the resulting velocity, so a headless client produces the same
//! kind of pose stream a player would.

use crate::controller::LocalPose;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{LocomotionState, Vec3};
use std::f32::consts::PI;

pub const WALK_SPEED: f32 = 1.5;
pub const RUN_SPEED: f32 = 4.0;

/// Fraction of the heading error removed per second.
const TURN_RATE: f32 = 4.0;

pub struct Wanderer {
    rng: StdRng,
    position: Vec3,
    yaw: f32,
    target_yaw: f32,
    state: LocomotionState,
    time_to_next_choice: f32,
}

impl Wanderer {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            rng,
            position: Vec3::ZERO,
            yaw: 0.0,
            target_yaw: 0.0,
            state: LocomotionState::Idle,
            time_to_next_choice: 0.0,
        }
    }

    pub fn state(&self) -> LocomotionState {
        self.state
    }

    /// Advances the walker by `dt` seconds and returns its new pose.
    pub fn step(&mut self, dt: f32) -> LocalPose {
        self.time_to_next_choice -= dt;
        if self.time_to_next_choice <= 0.0 {
            self.choose();
        }

        self.yaw += (self.target_yaw - self.yaw) * (TURN_RATE * dt).min(1.0);

        let speed = speed_for(self.state);
        let velocity = Vec3::new(self.yaw.sin(), 0.0, self.yaw.cos()) * speed;
        self.position = self.position + velocity * dt;

        LocalPose {
            position: self.position,
            velocity,
            state: self.state,
            yaw: self.yaw,
        }
    }

    fn choose(&mut self) {
        self.state = match self.rng.gen_range(0..3) {
            0 => LocomotionState::Idle,
            1 => LocomotionState::Walk,
            _ => LocomotionState::Run,
        };
        self.target_yaw = self.yaw + self.rng.gen_range(-PI / 2.0..PI / 2.0);
        self.time_to_next_choice = self.rng.gen_range(1.0..3.0);
    }
}

pub fn speed_for(state: LocomotionState) -> f32 {
    match state {
        LocomotionState::Walk => WALK_SPEED,
        LocomotionState::Run => RUN_SPEED,
        LocomotionState::Idle | LocomotionState::Other(_) => 0.0,
    }
}
