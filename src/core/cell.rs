//! Cells and factions.
//!
//! ## CellId
//!
//! Stable index into the scene's ordered cell list, assigned at creation and
//! never reused within a session. Every wire message references cells by
//! `CellId` — identity is explicit, never inferred from coordinates.
//!
//! ## Cell
//!
//! A cell's position is immutable after placement. Capture flips faction and
//! resets points; it never destroys the cell. Strength is always derived
//! from points, never stored.

use serde::{Deserialize, Serialize};

/// Stable identifier for a cell.
///
/// ```
/// use cellbridge::core::CellId;
///
/// let id = CellId::new(3);
/// assert_eq!(id.raw(), 3);
/// assert_eq!(format!("{}", id), "Cell(3)");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub u16);

impl CellId {
    /// Create a new cell ID.
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Get the raw index value.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Index into an ordered cell collection.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cell({})", self.0)
    }
}

/// Owning side of a cell or bridge.
///
/// Exactly two playable factions plus neutral territory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Faction {
    Player,
    Enemy,
    Neutral,
}

impl Faction {
    /// The opposing playable faction. Neutral has no opponent.
    ///
    /// ```
    /// use cellbridge::core::Faction;
    ///
    /// assert_eq!(Faction::Player.opponent(), Faction::Enemy);
    /// assert_eq!(Faction::Neutral.opponent(), Faction::Neutral);
    /// ```
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Faction::Player => Faction::Enemy,
            Faction::Enemy => Faction::Player,
            Faction::Neutral => Faction::Neutral,
        }
    }

    /// Whether this faction takes turns and accrues production.
    #[must_use]
    pub const fn is_playable(self) -> bool {
        !matches!(self, Faction::Neutral)
    }

    /// Wire token used in text frames.
    #[must_use]
    pub const fn wire_token(self) -> &'static str {
        match self {
            Faction::Player => "player",
            Faction::Enemy => "enemy",
            Faction::Neutral => "neutral",
        }
    }

    /// Parse a wire token back into a faction.
    #[must_use]
    pub fn from_wire_token(token: &str) -> Option<Self> {
        match token {
            "player" => Some(Faction::Player),
            "enemy" => Some(Faction::Enemy),
            "neutral" => Some(Faction::Neutral),
            _ => None,
        }
    }
}

impl std::fmt::Display for Faction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_token())
    }
}

/// A territory cell.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    /// Stable identity.
    pub id: CellId,

    x: f32,
    y: f32,

    /// Current owner.
    pub faction: Faction,

    /// Resource points, always ≥ 0.
    pub points: u32,

    /// Freeze expiry on the sim clock; `None` when not frozen.
    pub frozen_until: Option<u64>,
}

impl Cell {
    /// Create a cell at a fixed position.
    #[must_use]
    pub fn new(id: CellId, x: f32, y: f32, faction: Faction, points: u32) -> Self {
        Self {
            id,
            x,
            y,
            faction,
            points,
            frozen_until: None,
        }
    }

    /// X position (immutable after placement).
    #[inline]
    #[must_use]
    pub fn x(&self) -> f32 {
        self.x
    }

    /// Y position (immutable after placement).
    #[inline]
    #[must_use]
    pub fn y(&self) -> f32 {
        self.y
    }

    /// Derived strength: `points / 10 + 1`.
    ///
    /// Always recomputed, never stored. Bounds the cell's outgoing
    /// bridge count.
    ///
    /// ```
    /// use cellbridge::core::{Cell, CellId, Faction};
    ///
    /// let cell = Cell::new(CellId::new(0), 0.0, 0.0, Faction::Player, 25);
    /// assert_eq!(cell.strength(), 3);
    /// ```
    #[inline]
    #[must_use]
    pub fn strength(&self) -> u32 {
        self.points / 10 + 1
    }

    /// Whether the cell is frozen at the given sim time.
    #[must_use]
    pub fn is_frozen(&self, now_ms: u64) -> bool {
        self.frozen_until.is_some_and(|until| now_ms < until)
    }

    /// Euclidean distance to another cell.
    #[must_use]
    pub fn distance_to(&self, other: &Cell) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_derivation() {
        let mut cell = Cell::new(CellId::new(0), 0.0, 0.0, Faction::Player, 0);
        assert_eq!(cell.strength(), 1);

        cell.points = 9;
        assert_eq!(cell.strength(), 1);

        cell.points = 10;
        assert_eq!(cell.strength(), 2);

        cell.points = 42;
        assert_eq!(cell.strength(), 5);
    }

    #[test]
    fn test_faction_opponent() {
        assert_eq!(Faction::Player.opponent(), Faction::Enemy);
        assert_eq!(Faction::Enemy.opponent(), Faction::Player);
        assert_eq!(Faction::Neutral.opponent(), Faction::Neutral);
    }

    #[test]
    fn test_faction_wire_tokens_round_trip() {
        for faction in [Faction::Player, Faction::Enemy, Faction::Neutral] {
            assert_eq!(Faction::from_wire_token(faction.wire_token()), Some(faction));
        }
        assert_eq!(Faction::from_wire_token("observer"), None);
    }

    #[test]
    fn test_freeze_expiry() {
        let mut cell = Cell::new(CellId::new(1), 0.0, 0.0, Faction::Enemy, 5);
        assert!(!cell.is_frozen(0));

        cell.frozen_until = Some(2_000);
        assert!(cell.is_frozen(1_999));
        assert!(!cell.is_frozen(2_000));
    }

    #[test]
    fn test_distance() {
        let a = Cell::new(CellId::new(0), 0.0, 0.0, Faction::Player, 1);
        let b = Cell::new(CellId::new(1), 3.0, 4.0, Faction::Enemy, 1);
        assert!((a.distance_to(&b) - 5.0).abs() < f32::EPSILON);
    }
}
