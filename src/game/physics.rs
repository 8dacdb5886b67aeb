//! Tank movement and collision on the pixel grid

use super::entity::{Cell, Direction, Position};

/// Edge length of a tank's square hitbox (pixels)
pub const TANK_SIZE: i16 = 50;

/// Edge length of a terrain cell (pixels)
pub const CELL_SIZE: i16 = 20;

/// Playable area in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub width: i16,
    pub height: i16,
}

impl Bounds {
    /// Area covered by a `columns` x `rows` cell grid
    pub fn from_grid(columns: u8, rows: u8) -> Self {
        Self {
            width: i16::from(columns) * CELL_SIZE,
            height: i16::from(rows) * CELL_SIZE,
        }
    }
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i16,
    pub y: i16,
    pub w: i16,
    pub h: i16,
}

impl Rect {
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }
}

/// Physics system for tank movement
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Position after one tick of travel along `direction`, kept inside `bounds`
    pub fn step(position: Position, direction: Direction, speed: u8, bounds: Bounds) -> Position {
        let (dx, dy) = direction.step();
        let speed = i16::from(speed);
        let x = position.x.saturating_add(dx * speed);
        let y = position.y.saturating_add(dy * speed);

        Position::new(
            x.clamp(0, (bounds.width - TANK_SIZE).max(0)),
            y.clamp(0, (bounds.height - TANK_SIZE).max(0)),
        )
    }

    /// Hitbox of a tank whose top-left corner is at `position`
    pub fn tank_area(position: Position) -> Rect {
        Rect {
            x: position.x,
            y: position.y,
            w: TANK_SIZE,
            h: TANK_SIZE,
        }
    }

    pub fn cell_area(cell: Cell) -> Rect {
        Rect {
            x: i16::from(cell.x) * CELL_SIZE,
            y: i16::from(cell.y) * CELL_SIZE,
            w: CELL_SIZE,
            h: CELL_SIZE,
        }
    }

    /// Every grid cell a rectangle touches
    pub fn cells_under(area: Rect) -> Vec<Cell> {
        let to_cell = |v: i16| (v.max(0) / CELL_SIZE).min(i16::from(u8::MAX)) as u8;
        let (x0, y0) = (to_cell(area.x), to_cell(area.y));
        let (x1, y1) = (to_cell(area.x + area.w - 1), to_cell(area.y + area.h - 1));

        (y0..=y1)
            .flat_map(|y| (x0..=x1).map(move |x| Cell::new(x, y)))
            .collect()
    }

    /// Check collision between two tanks
    pub fn tanks_collide(a: Position, b: Position) -> bool {
        Self::tank_area(a).intersects(&Self::tank_area(b))
    }
}
