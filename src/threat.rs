//! Threat evaluation.
//!
//! Rules are checked in order and the first match wins:
//!
//! 1. health Caution or Panic → High
//! 2. melee contact → High
//! 3. no presence or sighting → Low
//! 4. two or more monsters → High
//! 5. one sleeping monster while healthy → Low
//! 6. anything else → Mid

use std::fmt;

use serde::Serialize;

use crate::health::HealthMode;
use crate::perception::PerceptionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatLevel {
    Low,
    Mid,
    High,
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ThreatLevel::Low => "LOW",
            ThreatLevel::Mid => "MID",
            ThreatLevel::High => "HIGH",
        };
        f.write_str(label)
    }
}

pub fn evaluate(perception: &PerceptionSnapshot, mode: HealthMode) -> ThreatLevel {
    if mode.is_compromised() {
        return ThreatLevel::High;
    }
    if perception.melee_contact {
        return ThreatLevel::High;
    }
    if !perception.monsters_present && !perception.monster_seen_edge {
        return ThreatLevel::Low;
    }
    if perception.monster_count >= 2 {
        return ThreatLevel::High;
    }
    if perception.monster_count == 1 && perception.monster_asleep && mode == HealthMode::Normal {
        return ThreatLevel::Low;
    }
    ThreatLevel::Mid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn present(count: u32) -> PerceptionSnapshot {
        PerceptionSnapshot {
            monsters_present: count > 0,
            monster_count: count,
            ..PerceptionSnapshot::default()
        }
    }

    #[test]
    fn compromised_health_is_always_high() {
        let quiet = PerceptionSnapshot::default();
        assert_eq!(evaluate(&quiet, HealthMode::Caution), ThreatLevel::High);
        assert_eq!(evaluate(&quiet, HealthMode::Panic), ThreatLevel::High);
    }

    #[test]
    fn melee_contact_is_high() {
        let snap = PerceptionSnapshot {
            melee_contact: true,
            ..present(1)
        };
        assert_eq!(evaluate(&snap, HealthMode::Normal), ThreatLevel::High);
    }

    #[test]
    fn nothing_seen_is_low() {
        assert_eq!(
            evaluate(&PerceptionSnapshot::default(), HealthMode::Normal),
            ThreatLevel::Low
        );
    }

    #[test]
    fn groups_are_high() {
        assert_eq!(evaluate(&present(2), HealthMode::Normal), ThreatLevel::High);
    }

    #[test]
    fn lone_sleeper_is_low() {
        let snap = PerceptionSnapshot {
            monster_asleep: true,
            ..present(1)
        };
        assert_eq!(evaluate(&snap, HealthMode::Normal), ThreatLevel::Low);
    }

    #[test]
    fn lone_awake_monster_is_mid() {
        assert_eq!(evaluate(&present(1), HealthMode::Normal), ThreatLevel::Mid);
    }

    #[test]
    fn sighting_without_detail_is_mid() {
        let snap = PerceptionSnapshot {
            monster_seen_edge: true,
            ..PerceptionSnapshot::default()
        };
        assert_eq!(evaluate(&snap, HealthMode::Normal), ThreatLevel::Mid);
    }

    #[test]
    fn levels_are_ordered() {
        assert!(ThreatLevel::Low < ThreatLevel::Mid);
        assert!(ThreatLevel::Mid < ThreatLevel::High);
    }
}
