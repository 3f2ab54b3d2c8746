//! Projectile entity: spawn rule, wall reflection and lifetime

use glam::Vec3;
use rand::Rng;

use super::vehicle::heading_vector;
use super::{VehicleRef, HALF_ARENA};

/// Projectile speed in arena units per tick
pub const PROJECTILE_SPEED: f32 = 1.0;
/// Lifetime in ticks (three seconds)
pub const PROJECTILE_LIFE: i32 = 180;
pub const PROJECTILE_RADIUS: f32 = 0.5;
/// Below this on both horizontal axes a shot has no direction
pub const MIN_VELOCITY: f32 = 1e-3;
/// Maximum sideways nudge applied on a wall bounce
pub const BOUNCE_JITTER: f32 = 0.05;

/// Active projectile
#[derive(Debug, Clone)]
pub struct Projectile {
    pub owner: VehicleRef,
    pub position: Vec3,
    pub velocity: Vec3,
    pub remaining_life: i32,
    pub max_life: i32,
    pub radius: f32,
    speed: f32,
}

impl Projectile {
    /// Fire from `position` along `heading`. Returns `None` for a directionless shot.
    pub fn spawn(
        owner: VehicleRef,
        position: Vec3,
        heading: f32,
        speed: f32,
        max_life: i32,
    ) -> Option<Self> {
        let velocity = heading_vector(heading) * speed;
        if is_degenerate(velocity) || max_life <= 0 {
            return None;
        }

        Some(Self {
            owner,
            position,
            velocity,
            remaining_life: max_life,
            max_life,
            radius: PROJECTILE_RADIUS,
            speed,
        })
    }

    /// Spawn with the standard speed and lifetime
    pub fn fire(owner: VehicleRef, position: Vec3, heading: f32) -> Option<Self> {
        Self::spawn(owner, position, heading, PROJECTILE_SPEED, PROJECTILE_LIFE)
    }

    /// Advance one tick. Returns false once the projectile should be removed.
    pub fn update<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        self.position += self.velocity;
        self.remaining_life -= 1;

        let mut bounced = false;
        if self.position.x.abs() > HALF_ARENA {
            self.position.x = HALF_ARENA.copysign(self.position.x);
            self.velocity.x = -self.velocity.x;
            self.velocity.z += rng.gen_range(-BOUNCE_JITTER..=BOUNCE_JITTER);
            bounced = true;
        }
        if self.position.z.abs() > HALF_ARENA {
            self.position.z = HALF_ARENA.copysign(self.position.z);
            self.velocity.z = -self.velocity.z;
            self.velocity.x += rng.gen_range(-BOUNCE_JITTER..=BOUNCE_JITTER);
            bounced = true;
        }
        if bounced {
            // jitter must not change speed
            self.velocity = self.velocity.normalize_or_zero() * self.speed;
        }

        self.remaining_life > 0 && !is_degenerate(self.velocity)
    }

    /// 1.0 at spawn, 0.0 at expiry
    pub fn life_fraction(&self) -> f32 {
        (self.remaining_life.max(0) as f32) / (self.max_life as f32)
    }

    /// Rendered scale, shrinking from 4x to 1x over the lifetime
    pub fn visual_scale(&self) -> f32 {
        1.0 + 3.0 * self.life_fraction()
    }
}

fn is_degenerate(velocity: Vec3) -> bool {
    velocity.x.abs() < MIN_VELOCITY && velocity.z.abs() < MIN_VELOCITY
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn spawn_direction_follows_heading() {
        let p = Projectile::fire(VehicleRef::Local, Vec3::ZERO, 0.0).unwrap();
        assert!((p.velocity.x - 1.0).abs() < 1e-6);
        assert_eq!(p.velocity.y, 0.0);
        assert!(p.velocity.z.abs() < 1e-6);
    }

    #[test]
    fn zero_speed_shot_is_discarded() {
        assert!(Projectile::spawn(VehicleRef::Local, Vec3::ZERO, 1.0, 0.0, 180).is_none());
    }

    #[test]
    fn expires_exactly_at_max_life() {
        let mut rng = rng();
        let mut p = Projectile::fire(VehicleRef::Autonomous(0), Vec3::ZERO, 0.3).unwrap();
        for tick in 1..PROJECTILE_LIFE {
            assert!(p.update(&mut rng), "removed early at tick {tick}");
            assert_eq!(p.remaining_life, PROJECTILE_LIFE - tick);
        }
        assert!(!p.update(&mut rng));
        assert_eq!(p.remaining_life, 0);
    }

    #[test]
    fn bounces_off_x_wall_with_jitter_but_same_speed() {
        let mut rng = rng();
        let mut p = Projectile::fire(VehicleRef::Local, Vec3::new(39.5, 0.0, 0.0), 0.0).unwrap();
        assert!(p.update(&mut rng));
        assert_eq!(p.position.x, HALF_ARENA);
        assert!(p.velocity.x < 0.0);
        assert!(p.velocity.z.abs() <= BOUNCE_JITTER + 1e-6);
        assert!((p.velocity.length() - PROJECTILE_SPEED).abs() < 1e-5);
    }

    #[test]
    fn visual_scale_runs_from_four_to_one() {
        let mut rng = rng();
        let mut p = Projectile::spawn(VehicleRef::Local, Vec3::ZERO, 0.0, 0.1, 4).unwrap();
        assert_eq!(p.visual_scale(), 4.0);
        p.update(&mut rng);
        p.update(&mut rng);
        assert_eq!(p.life_fraction(), 0.5);
        p.update(&mut rng);
        p.update(&mut rng);
        assert_eq!(p.visual_scale(), 1.0);
    }

    proptest! {
        #[test]
        fn life_strictly_decreases(heading in -10.0f32..10.0, seed in 0u64..500) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut p = Projectile::fire(VehicleRef::Local, Vec3::ZERO, heading).unwrap();
            let mut last = p.remaining_life;
            while p.update(&mut rng) {
                prop_assert!(p.remaining_life < last);
                prop_assert!(p.position.x.abs() <= HALF_ARENA);
                prop_assert!(p.position.z.abs() <= HALF_ARENA);
                last = p.remaining_life;
            }
            prop_assert!(p.remaining_life < last);
        }
    }
}
