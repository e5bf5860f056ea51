//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Simulation tick counter (host simulation time unit)
pub type Tick = u64;

/// Offsets of the eight cells surrounding a cell
pub const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Unique identifier for occupants and spawned creatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Deterministic id, used by environments that must replay identically
    pub fn from_index(index: u64) -> Self {
        Self(Uuid::from_u128(index as u128 + 1))
    }
}

/// Identifier of the map/world that hosts a cavern entrance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId(pub u32);

/// Grid cell coordinate
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
}

impl CellCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The eight surrounding cells (may be out of bounds)
    pub fn neighbors(self) -> impl Iterator<Item = CellCoord> {
        NEIGHBOR_OFFSETS
            .iter()
            .map(move |&(dx, dy)| CellCoord::new(self.x + dx, self.y + dy))
    }

    /// This cell plus its eight neighbors
    pub fn neighborhood(self) -> impl Iterator<Item = CellCoord> {
        std::iter::once(self).chain(self.neighbors())
    }

    pub fn distance_squared(&self, other: &Self) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        dx * dx + dy * dy
    }

    /// True when `other` lies within `radius` cells (euclidean, inclusive)
    #[inline]
    pub fn within_radius(&self, other: &Self, radius: f32) -> bool {
        if radius <= 0.0 {
            return false;
        }
        (self.distance_squared(other) as f32) <= radius * radius
    }
}

impl std::fmt::Display for CellCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Creature kind identifier, resolved by the environment's creature catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreatureKind(pub String);

impl CreatureKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CreatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbors_count_and_exclusion() {
        let c = CellCoord::new(5, 5);
        let n: Vec<_> = c.neighbors().collect();
        assert_eq!(n.len(), 8);
        assert!(!n.contains(&c));
        assert!(n.contains(&CellCoord::new(4, 4)));
        assert!(n.contains(&CellCoord::new(6, 6)));
    }

    #[test]
    fn test_neighborhood_includes_self() {
        let c = CellCoord::new(0, 0);
        assert_eq!(c.neighborhood().count(), 9);
        assert!(c.neighborhood().any(|n| n == c));
    }

    #[test]
    fn test_within_radius() {
        let a = CellCoord::new(0, 0);
        assert!(a.within_radius(&CellCoord::new(3, 4), 5.0));
        assert!(!a.within_radius(&CellCoord::new(4, 4), 5.0));
        assert!(!a.within_radius(&a, 0.0));
    }

    #[test]
    fn test_entity_id_from_index_is_stable() {
        assert_eq!(EntityId::from_index(7), EntityId::from_index(7));
        assert_ne!(EntityId::from_index(7), EntityId::from_index(8));
    }

    #[test]
    fn test_creature_kind_serializes_as_string() {
        let kind = CreatureKind::new("cave_spider");
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, "\"cave_spider\"");
    }
}
