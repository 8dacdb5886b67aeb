//! Combat system - shells, damage, armor

use super::entity::{AmmoKind, Direction, EntityIndex, Position, Team};
use super::physics::{Rect, TANK_SIZE};

/// Edge length of a shell hitbox (pixels)
pub const SHELL_SIZE: i16 = 10;

/// Freeze applied to a tank hit by its own team
pub const FRIENDLY_FIRE_FREEZE_MS: i16 = 2_000;

/// Weapon stats per ammo kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmmoStats {
    /// Damage per hit before armor
    pub damage: u16,
    /// Pixels travelled per tick
    pub speed: u8,
    /// Distance before the shell fizzles
    pub range: i16,
}

impl AmmoStats {
    pub fn for_kind(kind: AmmoKind) -> Self {
        match kind {
            AmmoKind::Basic => Self {
                damage: 30,
                speed: 12,
                range: 300,
            },
            AmmoKind::Rocket => Self {
                damage: 80,
                speed: 18,
                range: 500,
            },
            AmmoKind::FireBall => Self {
                damage: 80,
                speed: 10,
                range: 300,
            },
            AmmoKind::Shuriken => Self {
                damage: 50,
                speed: 20,
                range: 800,
            },
        }
    }
}

/// Shell in flight
#[derive(Debug, Clone)]
pub struct Shell {
    pub owner: EntityIndex,
    pub team: Team,
    pub position: Position,
    pub direction: Direction,
    pub speed: u8,
    pub damage: u16,
    pub range_left: i16,
}

impl Shell {
    /// Shell leaving the muzzle of a tank at `tank_position` facing `direction`.
    ///
    /// `speed` is the tank's ammo speed, which items may have changed.
    pub fn fired(
        owner: EntityIndex,
        team: Team,
        tank_position: Position,
        direction: Direction,
        kind: AmmoKind,
        speed: u8,
    ) -> Self {
        let stats = AmmoStats::for_kind(kind);
        let center = (TANK_SIZE - SHELL_SIZE) / 2;
        let (dx, dy) = direction.step();

        Self {
            owner,
            team,
            position: Position::new(
                tank_position.x + center + dx * center,
                tank_position.y + center + dy * center,
            ),
            direction,
            speed,
            damage: stats.damage,
            range_left: stats.range,
        }
    }

    /// Advance one tick, returns false once out of range
    pub fn update(&mut self) -> bool {
        let (dx, dy) = self.direction.step();
        let speed = i16::from(self.speed);
        self.position.x = self.position.x.saturating_add(dx * speed);
        self.position.y = self.position.y.saturating_add(dy * speed);
        self.range_left -= speed;
        self.range_left > 0 && self.direction != Direction::None
    }

    pub fn area(&self) -> Rect {
        Rect {
            x: self.position.x,
            y: self.position.y,
            w: SHELL_SIZE,
            h: SHELL_SIZE,
        }
    }
}

/// What a shell did to the tank it hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    Damaged { health: u8, killed: bool },
    /// Same team: no damage, the target is frozen instead
    Frozen(i16),
    /// Target is invulnerable
    Absorbed,
}

/// Combat rules for shells hitting tanks
pub struct CombatSystem;

impl CombatSystem {
    pub fn can_fire(cooldown_ms: i32) -> bool {
        cooldown_ms <= 0
    }

    /// Damage after armor: `damage / (1 + 0.06 * armor)`, rounded down
    pub fn mitigated_damage(damage: u16, armor: u8) -> u16 {
        let scaled = u32::from(damage) * 100 / (100 + 6 * u32::from(armor));
        scaled as u16
    }

    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(health: u8, damage: u16) -> (u8, bool) {
        let left = i32::from(health) - i32::from(damage);
        let left = left.max(0) as u8;
        (left, left == 0)
    }

    /// Resolve a hit of `shell` on a tank
    pub fn resolve_hit(
        shell: &Shell,
        target_team: Team,
        target_health: u8,
        target_armor: u8,
        target_invulnerable: bool,
    ) -> HitOutcome {
        if shell.team == target_team {
            return HitOutcome::Frozen(FRIENDLY_FIRE_FREEZE_MS);
        }
        if target_invulnerable {
            return HitOutcome::Absorbed;
        }

        let damage = Self::mitigated_damage(shell.damage, target_armor);
        let (health, killed) = Self::apply_damage(target_health, damage);
        HitOutcome::Damaged { health, killed }
    }
}
