//! Entity simulation: vehicles, projectiles, autonomous control and the round lifecycle

pub mod autonomous;
pub mod projectile;
pub mod round;
pub mod simulation;
pub mod vehicle;

pub use autonomous::AutonomousController;
pub use projectile::Projectile;
pub use round::{RankEntry, RoundPhase, RoundState};
pub use simulation::{SimEvent, SimulationContext};
pub use vehicle::{HumanIntent, Vehicle, VehicleKind, VehicleStats};

/// Stable per-connection identifier assigned by the relay
pub type PlayerId = uuid::Uuid;

/// Half the side length of the square arena. Client and relay must agree on it.
pub const HALF_ARENA: f32 = 40.0;

/// Distance kept between a vehicle centre and the arena wall
pub const WALL_MARGIN: f32 = 2.0;

/// Largest legal coordinate for a vehicle centre on either horizontal axis
pub const fn vehicle_limit() -> f32 {
    HALF_ARENA - WALL_MARGIN
}

/// Identifies a vehicle inside one client's simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleRef {
    /// The human-controlled vehicle owned by this client
    Local,
    /// Autonomous vehicle by slot index
    Autonomous(usize),
}
