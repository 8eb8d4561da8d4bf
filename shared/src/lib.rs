use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

pub mod protocol;

pub use protocol::{decode, encode, DecodeError, EncodeError, Message, MessageKind, PlayerUpdate};

/// Well-known rendezvous port that only ever receives Logon packets.
pub const SERVER_PORT: u16 = 27192;
/// Number of session slots, and therefore the exclusive upper bound of a PlayerId.
pub const MAX_USERS: usize = 16;
/// Receive buffer size for every socket in the system.
pub const MAX_PACKET_SIZE: usize = 1024;

/// Dense index of a session slot, also used as the player identifier on the wire.
pub type PlayerId = u32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Moves `t` of the way from `self` towards `target`.
    pub fn lerp(self, target: Vec3, t: f32) -> Vec3 {
        self + (target - self) * t
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Locomotion state id carried in every UpdatePlayer message.
///
/// The relay never interprets it; only the client maps it onto animations.
/// Values outside the known set are carried through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum LocomotionState {
    Run,
    Walk,
    #[default]
    Idle,
    Other(u32),
}

impl From<u32> for LocomotionState {
    fn from(id: u32) -> Self {
        match id {
            1 => LocomotionState::Run,
            2 => LocomotionState::Walk,
            3 => LocomotionState::Idle,
            other => LocomotionState::Other(other),
        }
    }
}

impl From<LocomotionState> for u32 {
    fn from(state: LocomotionState) -> u32 {
        match state {
            LocomotionState::Run => 1,
            LocomotionState::Walk => 2,
            LocomotionState::Idle => 3,
            LocomotionState::Other(id) => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_vec3_arithmetic() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(0.5, -1.0, 2.0);

        assert_eq!(a + b, Vec3::new(1.5, 1.0, 5.0));
        assert_eq!(a - b, Vec3::new(0.5, 3.0, 1.0));
        assert_eq!(a * 2.0, Vec3::new(2.0, 4.0, 6.0));
    }

    #[test]
    fn test_vec3_lerp() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(10.0, -4.0, 2.0);

        let half = a.lerp(b, 0.5);
        assert_approx_eq!(half.x, 5.0);
        assert_approx_eq!(half.y, -2.0);
        assert_approx_eq!(half.z, 1.0);

        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
    }

    #[test]
    fn test_vec3_length() {
        assert_approx_eq!(Vec3::new(3.0, 4.0, 0.0).length(), 5.0);
        assert_eq!(Vec3::ZERO.length(), 0.0);
    }

    #[test]
    fn test_locomotion_state_ids() {
        assert_eq!(u32::from(LocomotionState::Run), 1);
        assert_eq!(u32::from(LocomotionState::Walk), 2);
        assert_eq!(u32::from(LocomotionState::Idle), 3);

        assert_eq!(LocomotionState::from(2), LocomotionState::Walk);
        assert_eq!(LocomotionState::from(77), LocomotionState::Other(77));
        assert_eq!(u32::from(LocomotionState::from(77)), 77);
    }

    #[test]
    fn test_default_locomotion_state_is_idle() {
        assert_eq!(LocomotionState::default(), LocomotionState::Idle);
    }
}
