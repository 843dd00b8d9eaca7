use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PACKET_SIZE: usize = 65_507;

pub const DEFAULT_HEALTH: f32 = 100.0;
pub const PLAYER_TEAM: TeamId = 0;
pub const HAZARD_TEAM: TeamId = 255;
pub const PLAYER_RADIUS: f32 = 42.0;
pub const PLAYER_SPEED: f32 = 600.0;
pub const PLAYER_EYE_HEIGHT: f32 = 64.0;

pub type EntityId = u32;
pub type TeamId = u8;

/// Which side of the replication boundary a component instance lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Authority,
    ObserverProxy,
}

impl Role {
    pub fn is_authority(self) -> bool {
        self == Role::Authority
    }
}

/// Represents a vector in 3D space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    /// Positive direction is up.
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const UP: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Returns the unit vector, or zero for a zero-length input.
    pub fn normalize(&self) -> Vec3 {
        let len = self.length();
        if len == 0.0 {
            Vec3::ZERO
        } else {
            self.scale(1.0 / len)
        }
    }

    pub fn scale(&self, scalar: f32) -> Vec3 {
        Vec3::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }

    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn dot(&self, other: &Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn distance(&self, other: &Vec3) -> f32 {
        self.sub(other).length()
    }

    pub fn distance_squared(&self, other: &Vec3) -> f32 {
        let d = self.sub(other);
        d.dot(&d)
    }
}

/// Physical material struck by a hit-test. One kind is designated vulnerable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceKind {
    Default,
    Flesh,
    FleshVulnerable,
}

impl SurfaceKind {
    pub fn is_vulnerable(self) -> bool {
        self == SurfaceKind::FleshVulnerable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveState {
    WaitingToStart,
    WaveInProgress,
    /// No longer spawning; waiting for the remaining bots to be killed.
    WaitingToComplete,
    WaveComplete,
    GameOver,
}

impl WaveState {
    pub fn is_terminal(self) -> bool {
        self == WaveState::GameOver
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    ThreatUnit,
    ExplosiveBarrel,
    Pickup,
    Projectile,
}

/// Authority-computed result of one fire action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitOutcome {
    pub impact_point: Vec3,
    pub surface_kind: SurfaceKind,
    pub actor_hit: Option<EntityId>,
}

/// Latest hit of a weapon as replicated. `sequence` increments per shot so two
/// shots landing on the same point still read as a change on observers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedHit {
    pub sequence: u32,
    pub outcome: HitOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub current_health: f32,
    pub max_health: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    pub team: Option<TeamId>,
    pub position: Vec3,
    pub health: Option<HealthSnapshot>,
    pub power_level: u8,
    pub priming_self_destruct: bool,
    pub detonated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponSnapshot {
    pub weapon_id: EntityId,
    pub owner: EntityId,
    pub last_hit: Option<ReplicatedHit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PlayerAction {
    /// Planar movement intent, each axis in [-1, 1].
    Move { x: f32, y: f32 },
    Aim { direction: Vec3 },
    Fire,
    StartFire,
    StopFire,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Action {
        sequence: u32,
        timestamp: u64,
        action: PlayerAction,
    },
    Disconnect,

    Connected {
        client_id: u32,
        entity_id: EntityId,
        weapon_id: EntityId,
    },
    Snapshot {
        tick: u32,
        timestamp: u64,
        wave_state: WaveState,
        wave_count: u32,
        last_processed_action: u32,
        entities: Vec<EntitySnapshot>,
        weapons: Vec<WeaponSnapshot>,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct ActionState {
    pub sequence: u32,
    pub timestamp: u64,
    pub action: PlayerAction,
}
