//! Position reconciliation between local prediction and host truth

use super::entity::{Direction, Position};

/// Decide whether a locally predicted tank must snap to the host position.
///
/// The host runs slightly ahead of the last state the client acknowledged, so
/// along the travel axis the host may be behind us or up to one tick of
/// movement (`speed`) ahead without a correction. A heading change always
/// snaps.
pub fn needs_correction(
    local: Position,
    host: Position,
    local_dir: Direction,
    host_dir: Direction,
    speed: u8,
) -> bool {
    if local_dir != host_dir {
        return true;
    }

    let dx = i32::from(host.x) - i32::from(local.x);
    let dy = i32::from(host.y) - i32::from(local.y);
    if dx == 0 && dy == 0 {
        return false;
    }

    let speed = i32::from(speed);
    match host_dir {
        // "Ahead" is towards smaller y
        Direction::Up => dy < -speed,
        Direction::Down => dy > speed,
        Direction::Left => dx < -speed,
        Direction::Right => dx > speed,
        // Standing still: any disagreement is drift
        Direction::None => true,
    }
}
