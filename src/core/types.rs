//! Core type definitions used throughout the codebase

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Unique identifier for entities
///
/// Ids come from the document or are minted by the engine for spawned
/// entities (`<type>#<serial>`). Ordering is plain string ordering, which is
/// the iteration order of every entity table.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From,
)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Simulation tick counter
pub type Tick = u64;

/// Integer cell coordinate, serialized as `[x, y]`
///
/// Signed so that off-grid targets (e.g. `x - 1` at the left edge) can be
/// represented and rejected instead of wrapping.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Build a position from evaluator integers, `None` if either axis
    /// does not fit in an `i32`
    pub fn from_i64(x: i64, y: i64) -> Option<Self> {
        Some(Self {
            x: i32::try_from(x).ok()?,
            y: i32::try_from(y).ok()?,
        })
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    pub fn manhattan(&self, other: &Position) -> i64 {
        (i64::from(self.x) - i64::from(other.x)).abs() + (i64::from(self.y) - i64::from(other.y)).abs()
    }

    /// The four cardinal neighbours in N, E, S, W order (y grows downward)
    pub fn neighbors(&self) -> [Position; 4] {
        [
            self.offset(0, -1),
            self.offset(1, 0),
            self.offset(0, 1),
            self.offset(-1, 0),
        ]
    }
}

impl From<[i32; 2]> for Position {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Position> for [i32; 2] {
    fn from(pos: Position) -> Self {
        [pos.x, pos.y]
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Player input direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    /// Advance the tick without moving the player
    Wait,
}

impl Direction {
    /// Cell delta for this direction; `Up` is `y - 1`
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
            Direction::Wait => (0, 0),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim().to_ascii_lowercase().as_str() {
            "up" | "north" => Ok(Direction::Up),
            "down" | "south" => Ok(Direction::Down),
            "left" | "west" => Ok(Direction::Left),
            "right" | "east" => Ok(Direction::Right),
            "wait" | "stay" => Ok(Direction::Wait),
            other => Err(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_ordering() {
        let a = EntityId::from("box1");
        let b = EntityId::from("box2");
        let c = EntityId::from("player");
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.to_string(), "box1");
    }

    #[test]
    fn test_position_serializes_as_pair() {
        let pos = Position::new(3, 2);
        assert_eq!(serde_json::to_string(&pos).unwrap(), "[3,2]");
        let back: Position = serde_json::from_str("[3,2]").unwrap();
        assert_eq!(back, pos);
    }

    #[test]
    fn test_manhattan_distance() {
        let a = Position::new(1, 1);
        assert_eq!(a.manhattan(&Position::new(4, 3)), 5);
        assert_eq!(a.manhattan(&a), 0);
    }

    #[test]
    fn test_neighbors_order() {
        let n = Position::new(2, 2).neighbors();
        assert_eq!(
            n,
            [
                Position::new(2, 1),
                Position::new(3, 2),
                Position::new(2, 3),
                Position::new(1, 2)
            ]
        );
    }

    #[test]
    fn test_from_i64_rejects_overflow() {
        assert!(Position::from_i64(i64::MAX, 0).is_none());
        assert_eq!(Position::from_i64(-1, 4), Some(Position::new(-1, 4)));
    }

    #[test]
    fn test_direction_tokens() {
        assert_eq!("up".parse::<Direction>(), Ok(Direction::Up));
        assert_eq!(" Right ".parse::<Direction>(), Ok(Direction::Right));
        assert_eq!("wait".parse::<Direction>(), Ok(Direction::Wait));
        assert!("jump".parse::<Direction>().is_err());
        assert_eq!(Direction::Up.delta(), (0, -1));
    }
}
