//! Escape routing for retreat and panic movement.
//!
//! The router keeps a tiny memory of the last moves it chose and biases the
//! next choice away from an immediate reversal. Without it, two consecutive
//! escape ticks can pick opposite keys and the character jitters in place.

use std::fmt;

use serde::Serialize;

/// One of the eight compass directions, named by its vi-key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// West.
    H,
    /// South.
    J,
    /// North.
    K,
    /// East.
    L,
    /// North-west.
    Y,
    /// North-east.
    U,
    /// South-west.
    B,
    /// South-east.
    N,
}

impl Direction {
    /// Candidate order used when no preferred direction survives.
    pub const ALL: [Direction; 8] = [
        Direction::H,
        Direction::J,
        Direction::K,
        Direction::L,
        Direction::Y,
        Direction::U,
        Direction::B,
        Direction::N,
    ];

    pub fn opposite(self) -> Self {
        match self {
            Direction::H => Direction::L,
            Direction::L => Direction::H,
            Direction::J => Direction::K,
            Direction::K => Direction::J,
            Direction::Y => Direction::N,
            Direction::N => Direction::Y,
            Direction::U => Direction::B,
            Direction::B => Direction::U,
        }
    }

    pub fn key(self) -> char {
        match self {
            Direction::H => 'h',
            Direction::J => 'j',
            Direction::K => 'k',
            Direction::L => 'l',
            Direction::Y => 'y',
            Direction::U => 'u',
            Direction::B => 'b',
            Direction::N => 'n',
        }
    }

    pub fn from_key(key: char) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.key() == key)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Result of a single routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscapeChoice {
    pub chosen: Direction,
    /// Opposite of `chosen`; becomes the forbidden direction for the next tick.
    pub opposite: Direction,
    /// The `last_move` the choice was made against.
    pub previous: Option<Direction>,
}

/// Pure routing policy.
///
/// Prefers the direct opposite of `last_move` unless that is the forbidden
/// `avoid` direction. Otherwise takes the first compass direction that is
/// neither the last retreat choice nor `avoid`, and drops the `avoid` filter
/// only when nothing survives both.
pub fn choose_move(
    last_move: Option<Direction>,
    last_retreat_choice: Option<Direction>,
    avoid: Option<Direction>,
) -> EscapeChoice {
    let preferred = last_move
        .map(Direction::opposite)
        .filter(|d| Some(*d) != avoid);

    let chosen = preferred
        .or_else(|| {
            Direction::ALL
                .into_iter()
                .find(|d| Some(*d) != last_retreat_choice && Some(*d) != avoid)
        })
        .or_else(|| {
            Direction::ALL
                .into_iter()
                .find(|d| Some(*d) != last_retreat_choice)
        })
        .unwrap_or(Direction::H);

    EscapeChoice {
        chosen,
        opposite: chosen.opposite(),
        previous: last_move,
    }
}

/// Movement memory carried by the decision engine between ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscapeRouter {
    last_move: Option<Direction>,
    last_retreat_choice: Option<Direction>,
    avoid: Option<Direction>,
}

impl EscapeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_move(&self) -> Option<Direction> {
        self.last_move
    }

    pub fn avoid(&self) -> Option<Direction> {
        self.avoid
    }

    /// Choose the next escape direction and update the memory.
    pub fn next_move(&mut self) -> EscapeChoice {
        let choice = choose_move(self.last_move, self.last_retreat_choice, self.avoid);
        self.last_move = Some(choice.chosen);
        self.last_retreat_choice = Some(choice.chosen);
        self.avoid = Some(choice.opposite);
        choice
    }

    /// Plan `len` consecutive escape moves, updating memory after each one.
    pub fn plan(&mut self, len: usize) -> Vec<Direction> {
        (0..len).map(|_| self.next_move().chosen).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposites_are_involutions() {
        for d in Direction::ALL {
            assert_ne!(d, d.opposite());
            assert_eq!(d, d.opposite().opposite());
        }
    }

    #[test]
    fn keys_round_trip() {
        for d in Direction::ALL {
            assert_eq!(Direction::from_key(d.key()), Some(d));
        }
        assert_eq!(Direction::from_key('x'), None);
    }

    #[test]
    fn fresh_memory_picks_first_direction() {
        let choice = choose_move(None, None, None);
        assert_eq!(choice.chosen, Direction::H);
        assert_eq!(choice.opposite, Direction::L);
        assert_eq!(choice.previous, None);
    }

    #[test]
    fn prefers_opposite_of_last_move() {
        let choice = choose_move(Some(Direction::K), None, None);
        assert_eq!(choice.chosen, Direction::J);
        assert_eq!(choice.previous, Some(Direction::K));
    }

    #[test]
    fn avoided_opposite_falls_through_to_scan() {
        // Opposite of K is J, which is forbidden.
        let choice = choose_move(Some(Direction::K), Some(Direction::K), Some(Direction::J));
        assert_eq!(choice.chosen, Direction::H);
    }

    #[test]
    fn scan_skips_last_retreat_and_avoid() {
        let choice = choose_move(None, Some(Direction::H), Some(Direction::J));
        assert_eq!(choice.chosen, Direction::K);
    }

    #[test]
    fn router_never_reverses_consecutively() {
        let mut router = EscapeRouter::new();
        let moves = router.plan(6);
        for pair in moves.windows(2) {
            assert_ne!(pair[1], pair[0].opposite(), "reversal in {moves:?}");
        }
    }

    #[test]
    fn router_memory_tracks_choice() {
        let mut router = EscapeRouter::new();
        let choice = router.next_move();
        assert_eq!(router.last_move(), Some(choice.chosen));
        assert_eq!(router.avoid(), Some(choice.chosen.opposite()));
    }

    #[test]
    fn display_is_vi_key() {
        assert_eq!(Direction::Y.to_string(), "y");
    }
}
