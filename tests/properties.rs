use std::time::{Duration, Instant};

use proptest::prelude::*;

use crawlbot::engine::{DecisionEngine, Emission, EngineConfig};
use crawlbot::escape::{Direction, EscapeRouter, choose_move};
use crawlbot::health::{HealthMode, HealthThresholds, HealthTracker, update_mode};
use crawlbot::perception::PerceptionSnapshot;
use crawlbot::threat::evaluate;

const T: HealthThresholds = HealthThresholds::STANDARD;

fn any_mode() -> impl Strategy<Value = HealthMode> {
    prop_oneof![
        Just(HealthMode::Normal),
        Just(HealthMode::Caution),
        Just(HealthMode::Panic),
    ]
}

fn any_direction() -> impl Strategy<Value = Direction> {
    proptest::sample::select(Direction::ALL.to_vec())
}

prop_compose! {
    fn any_snapshot()(
        ratio in proptest::option::of(0.0f64..=1.0),
        seen in any::<bool>(),
        melee in any::<bool>(),
        count in 0u32..4,
        asleep in any::<bool>(),
        more in any::<bool>(),
        confirm in any::<bool>(),
    ) -> PerceptionSnapshot {
        PerceptionSnapshot {
            health_ratio: ratio,
            monster_seen_edge: seen,
            melee_contact: melee,
            monsters_present: count > 0,
            monster_count: count,
            monster_asleep: asleep && count > 0,
            more_prompt: more,
            confirm_y_prompt: confirm,
            ..PerceptionSnapshot::default()
        }
    }
}

proptest! {
    /// Between panic_exit and caution_enter nothing leaves CAUTION.
    #[test]
    fn caution_band_is_sticky(ratios in proptest::collection::vec(0.401f64..0.549, 1..40)) {
        let mut mode = HealthMode::Caution;
        for r in ratios {
            mode = update_mode(mode, r, &T);
            prop_assert_eq!(mode, HealthMode::Caution);
        }
    }

    /// From any starting mode, in-band readings change the mode at most
    /// once, and only to CAUTION.
    #[test]
    fn in_band_changes_at_most_once(
        start in any_mode(),
        ratios in proptest::collection::vec(0.401f64..0.549, 1..40),
    ) {
        let mut mode = start;
        let mut changes = 0;
        for r in ratios {
            let next = update_mode(mode, r, &T);
            if next != mode {
                changes += 1;
                prop_assert_eq!(next, HealthMode::Caution);
            }
            mode = next;
        }
        prop_assert!(changes <= 1);
    }

    /// The tracker never reports NORMAL on a reading below caution_enter.
    #[test]
    fn tracker_never_normal_when_low(ratios in proptest::collection::vec(0.0f64..=1.0, 1..60)) {
        let mut tracker = HealthTracker::new(T);
        for r in ratios {
            let update = tracker.observe(r);
            if r < T.caution_enter {
                prop_assert_ne!(update.current, HealthMode::Normal);
            }
        }
    }

    #[test]
    fn threat_is_monotone_in_health(snapshot in any_snapshot()) {
        let normal = evaluate(&snapshot, HealthMode::Normal);
        let caution = evaluate(&snapshot, HealthMode::Caution);
        let panic = evaluate(&snapshot, HealthMode::Panic);
        prop_assert!(panic >= caution);
        prop_assert!(caution >= normal);
    }

    /// The forbidden direction is never chosen; every memory state leaves
    /// alternatives.
    #[test]
    fn escape_avoids_forbidden(
        last in proptest::option::of(any_direction()),
        retreat in proptest::option::of(any_direction()),
        avoid in proptest::option::of(any_direction()),
    ) {
        let choice = choose_move(last, retreat, avoid);
        prop_assert_ne!(Some(choice.chosen), avoid);
        prop_assert_eq!(choice.opposite, choice.chosen.opposite());
    }

    #[test]
    fn router_never_reverses(len in 2usize..30) {
        let mut router = EscapeRouter::new();
        let plan = router.plan(len);
        for pair in plan.windows(2) {
            prop_assert_ne!(pair[1], pair[0].opposite());
        }
    }

    /// Nothing is ever emitted onto a busy channel, and only the PANIC
    /// burst carries more than one command.
    #[test]
    fn single_slot_discipline(
        frames in proptest::collection::vec((any_snapshot(), any::<bool>()), 1..60),
    ) {
        let mut engine = DecisionEngine::new(EngineConfig::default());
        let start = Instant::now();
        for (i, (snapshot, queue_empty)) in frames.iter().enumerate() {
            let now = start + Duration::from_millis(500 * i as u64);
            let tick = engine.step(snapshot, *queue_empty, now);
            if !queue_empty || snapshot.health_ratio.is_none() {
                prop_assert!(tick.emission.is_none());
            }
            if let Some(Emission::Burst(cmds)) = &tick.emission {
                prop_assert!(cmds.len() <= 3);
                prop_assert!(tick.mode.is_some_and(|m| m.entered_panic()));
            }
        }
    }
}
