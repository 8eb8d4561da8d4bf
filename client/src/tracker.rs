//! Remote entity tracking and render smoothing
//!
//! Each remote player keeps its two most recent snapshots. Every frame the
//! tracker dead-reckons a target position from them and eases the rendered
//! position towards it. The result trades exactness for smooth motion under
//! jitter and loss.

use log::{debug, warn};
use shared::{LocomotionState, Message, PlayerId, PlayerUpdate, Vec3, MAX_USERS};

/// Fraction of the remaining distance covered each frame.
pub const SMOOTHING_FACTOR: f32 = 0.5;

/// What the renderer needs to draw one player.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderPose {
    pub position: Vec3,
    pub yaw: f32,
    pub state: LocomotionState,
}

/// Position and velocity as received, stamped with the local receive time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Snapshot {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Seconds on the client clock.
    pub timestamp: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RemoteEntity {
    active: bool,
    old: Snapshot,
    new: Snapshot,
    render_position: Vec3,
    render_yaw: f32,
    target_yaw: f32,
    state: LocomotionState,
}

impl RemoteEntity {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn previous(&self) -> &Snapshot {
        &self.old
    }

    pub fn latest(&self) -> &Snapshot {
        &self.new
    }

    pub fn state(&self) -> LocomotionState {
        self.state
    }

    pub fn target_yaw(&self) -> f32 {
        self.target_yaw
    }

    pub fn render_pose(&self) -> RenderPose {
        RenderPose {
            position: self.render_position,
            yaw: self.render_yaw,
            state: self.state,
        }
    }

    /// Dead-reckoned position at `now`, extrapolated along the last two
    /// snapshots. Falls back to the newest position when the snapshots share
    /// a timestamp.
    pub fn target_position(&self, now: f64) -> Vec3 {
        let interval = self.new.timestamp - self.old.timestamp;
        if interval <= 0.0 {
            return self.new.position;
        }

        let elapsed = now - self.new.timestamp;
        let delta = self.new.position - self.old.position;
        self.new.position + delta * (elapsed / interval) as f32
    }

    fn activate(&mut self, snapshot: Snapshot, update: &PlayerUpdate) {
        self.active = true;
        self.old = snapshot;
        self.new = snapshot;
        self.render_position = snapshot.position;
        self.render_yaw = update.yaw;
        self.target_yaw = update.yaw;
        self.state = update.state;
    }

    fn advance(&mut self, now: f64, smoothing: f32) {
        let target = self.target_position(now);
        self.render_position = self.render_position.lerp(target, smoothing);
        self.render_yaw += smoothing * (self.target_yaw - self.render_yaw);
    }
}

/// Outcome of feeding one message to the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackerEvent {
    /// First update for a player that was not being tracked.
    Activated {
        player_id: PlayerId,
        state: LocomotionState,
    },
    Moved {
        player_id: PlayerId,
    },
    /// The animation collaborator should blend to `to`.
    StateChanged {
        player_id: PlayerId,
        from: LocomotionState,
        to: LocomotionState,
    },
    /// The renderer should stop drawing this player.
    Deactivated {
        player_id: PlayerId,
    },
    Ignored,
}

/// Fixed table of remote players indexed by PlayerId.
#[derive(Debug, Clone)]
pub struct RemoteEntityTracker {
    entities: Vec<RemoteEntity>,
    smoothing: f32,
}

impl Default for RemoteEntityTracker {
    fn default() -> Self {
        Self::new(MAX_USERS)
    }
}

impl RemoteEntityTracker {
    pub fn new(max_users: usize) -> Self {
        Self::with_smoothing(max_users, SMOOTHING_FACTOR)
    }

    pub fn with_smoothing(max_users: usize, smoothing: f32) -> Self {
        Self {
            entities: vec![RemoteEntity::default(); max_users],
            smoothing,
        }
    }

    pub fn entity(&self, player_id: PlayerId) -> Option<&RemoteEntity> {
        self.entities.get(player_id as usize)
    }

    pub fn is_active(&self, player_id: PlayerId) -> bool {
        self.entity(player_id).map_or(false, RemoteEntity::is_active)
    }

    pub fn active_count(&self) -> usize {
        self.entities.iter().filter(|entity| entity.active).count()
    }

    /// Applies one message received from the server at client time `now`.
    pub fn apply(&mut self, message: &Message, now: f64) -> TrackerEvent {
        match message {
            Message::UpdatePlayer(update) => self.apply_update(update, now),
            Message::PlayerLoggedOff { player_id } => self.deactivate(*player_id),
            other => {
                debug!("Tracker ignoring {}", other.kind());
                TrackerEvent::Ignored
            }
        }
    }

    pub fn apply_update(&mut self, update: &PlayerUpdate, now: f64) -> TrackerEvent {
        let player_id = update.player_id;
        let Some(entity) = self.entities.get_mut(player_id as usize) else {
            warn!("Dropping update for out-of-range player {}", player_id);
            return TrackerEvent::Ignored;
        };

        let incoming = Snapshot {
            position: update.position,
            velocity: update.velocity,
            timestamp: now,
        };

        if !entity.active {
            entity.activate(incoming, update);
            return TrackerEvent::Activated {
                player_id,
                state: update.state,
            };
        }

        // A duplicate delivered in the same frame must not collapse the
        // snapshot pair.
        if incoming != entity.new {
            entity.old = entity.new;
            entity.new = incoming;
        }
        entity.target_yaw = update.yaw;

        if update.state != entity.state {
            let from = entity.state;
            entity.state = update.state;
            return TrackerEvent::StateChanged {
                player_id,
                from,
                to: update.state,
            };
        }

        TrackerEvent::Moved { player_id }
    }

    pub fn deactivate(&mut self, player_id: PlayerId) -> TrackerEvent {
        match self.entities.get_mut(player_id as usize) {
            Some(entity) if entity.active => {
                entity.active = false;
                TrackerEvent::Deactivated { player_id }
            }
            _ => TrackerEvent::Ignored,
        }
    }

    /// Per-frame smoothing step for every active entity.
    pub fn advance(&mut self, now: f64) {
        let smoothing = self.smoothing;
        for entity in self.entities.iter_mut().filter(|entity| entity.active) {
            entity.advance(now, smoothing);
        }
    }

    pub fn render_poses(&self) -> impl Iterator<Item = (PlayerId, RenderPose)> + '_ {
        self.entities
            .iter()
            .enumerate()
            .filter(|(_, entity)| entity.active)
            .map(|(id, entity)| (id as PlayerId, entity.render_pose()))
    }
}
