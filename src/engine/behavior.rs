//! Behavior state machine.
//!
//! ```text
//! EXPLORE ── monster edge ──▶ ALERT ── HIGH + healthy ──▶ FIGHT
//!    ▲                          │  ── HIGH + hurt / MID ──▶ RETREAT
//!    │                          │  ── LOW, still visible after N extensions ──▶ FIGHT
//!    └── absence confirmed ─────┘
//! FIGHT   ── hurt / MID at recheck ──▶ RETREAT
//! RETREAT ── hold expired, clear + healthy ──▶ EXPLORE
//! RETREAT ── hold expired, threatened + healthy ──▶ ALERT
//! ```
//!
//! A rising presence edge sends every state except ALERT back into ALERT.
//! The entry tick only arms the hold; threat is evaluated from the next tick.
//!
//! FIGHT is normally entered on HIGH threat with healthy mode. The one other
//! way in is a LOW threat that is still on the panel after
//! `max_alert_extensions` hold extensions, so a sleeping monster in view
//! cannot pin the bot in ALERT. Setting `max_alert_extensions` to `0` turns
//! that engagement off and ALERT keeps extending.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::command::Command;
use crate::escape::EscapeRouter;
use crate::health::HealthMode;
use crate::perception::PerceptionSnapshot;
use crate::threat::{ThreatLevel, evaluate};

use super::EngineConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BehaviorState {
    #[default]
    Explore,
    Alert,
    Retreat,
    Fight,
}

impl fmt::Display for BehaviorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BehaviorState::Explore => "EXPLORE",
            BehaviorState::Alert => "ALERT",
            BehaviorState::Retreat => "RETREAT",
            BehaviorState::Fight => "FIGHT",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    MonsterEdge,
    AbsenceConfirmed,
    ThreatHigh,
    ThreatMid,
    HealthCompromised,
    LingeringThreat,
    RetreatTimeout,
    ThreatCleared,
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransitionReason::MonsterEdge => "monster edge",
            TransitionReason::AbsenceConfirmed => "absence confirmed",
            TransitionReason::ThreatHigh => "threat high",
            TransitionReason::ThreatMid => "threat mid",
            TransitionReason::HealthCompromised => "health compromised",
            TransitionReason::LingeringThreat => "lingering threat",
            TransitionReason::RetreatTimeout => "retreat timeout",
            TransitionReason::ThreatCleared => "threat cleared",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: BehaviorState,
    pub to: BehaviorState,
    pub reason: TransitionReason,
    /// Threat level the decision was based on, if one was evaluated.
    pub threat: Option<ThreatLevel>,
}

/// Inputs shared by the transition and action halves of a tick.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub snapshot: &'a PerceptionSnapshot,
    pub mode: HealthMode,
    pub now: Instant,
}

/// Behavior state plus the timers and counters that drive it.
#[derive(Debug, Clone)]
pub struct BehaviorMachine {
    config: EngineConfig,
    state: BehaviorState,
    last_seen: bool,
    absent_streak: u32,
    /// Deadline of the current ALERT or RETREAT hold.
    hold_until: Option<Instant>,
    alert_extensions: u32,
    alert_waited: bool,
    next_recheck: Option<Instant>,
    last_autoexplore: Option<Instant>,
    last_attack: Option<Instant>,
    last_threat: Option<ThreatLevel>,
}

impl BehaviorMachine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: BehaviorState::Explore,
            last_seen: false,
            absent_streak: 0,
            hold_until: None,
            alert_extensions: 0,
            alert_waited: false,
            next_recheck: None,
            last_autoexplore: None,
            last_attack: None,
            last_threat: None,
        }
    }

    pub fn state(&self) -> BehaviorState {
        self.state
    }

    /// Consecutive ticks with no presence or sighting signal.
    pub fn absent_streak(&self) -> u32 {
        self.absent_streak
    }

    pub fn hold_until(&self) -> Option<Instant> {
        self.hold_until
    }

    /// Threat level evaluated during the most recent `advance`, if any.
    pub fn last_threat(&self) -> Option<ThreatLevel> {
        self.last_threat
    }

    /// Run the transition rules for one tick.
    pub fn advance(&mut self, ctx: &TickContext<'_>) -> Option<Transition> {
        self.last_threat = None;

        let seen_now = ctx.snapshot.threat_signal();
        let edge = seen_now && !self.last_seen;
        self.last_seen = seen_now;

        if ctx.snapshot.all_clear() {
            self.absent_streak = self.absent_streak.saturating_add(1);
        } else {
            self.absent_streak = 0;
        }

        if edge && self.state != BehaviorState::Alert {
            return Some(self.enter(BehaviorState::Alert, TransitionReason::MonsterEdge, ctx.now));
        }

        match self.state {
            BehaviorState::Explore => None,
            BehaviorState::Alert => self.advance_alert(ctx),
            BehaviorState::Fight => self.advance_fight(ctx),
            BehaviorState::Retreat => self.advance_retreat(ctx),
        }
    }

    fn absence_confirmed(&self) -> bool {
        self.absent_streak >= self.config.absence_confirm_ticks
    }

    fn hold_expired(&self, now: Instant) -> bool {
        self.hold_until.is_none_or(|deadline| now >= deadline)
    }

    fn assess(&mut self, ctx: &TickContext<'_>) -> ThreatLevel {
        let threat = evaluate(ctx.snapshot, ctx.mode);
        self.last_threat = Some(threat);
        threat
    }

    fn advance_alert(&mut self, ctx: &TickContext<'_>) -> Option<Transition> {
        if self.absence_confirmed() {
            return Some(self.enter(
                BehaviorState::Explore,
                TransitionReason::AbsenceConfirmed,
                ctx.now,
            ));
        }

        match self.assess(ctx) {
            ThreatLevel::High if ctx.mode == HealthMode::Normal => Some(self.enter(
                BehaviorState::Fight,
                TransitionReason::ThreatHigh,
                ctx.now,
            )),
            ThreatLevel::High => Some(self.enter(
                BehaviorState::Retreat,
                TransitionReason::HealthCompromised,
                ctx.now,
            )),
            ThreatLevel::Mid => Some(self.enter(
                BehaviorState::Retreat,
                TransitionReason::ThreatMid,
                ctx.now,
            )),
            ThreatLevel::Low => {
                if !self.hold_expired(ctx.now) || !ctx.snapshot.monsters_present {
                    // Still holding, or waiting on the absence streak.
                    return None;
                }
                let limit = self.config.max_alert_extensions;
                if limit > 0 && self.alert_extensions >= limit {
                    return Some(self.enter(
                        BehaviorState::Fight,
                        TransitionReason::LingeringThreat,
                        ctx.now,
                    ));
                }
                self.alert_extensions = self.alert_extensions.saturating_add(1);
                self.hold_until = Some(ctx.now + self.config.alert_extend);
                debug!(
                    extensions = self.alert_extensions,
                    "alert hold extended, low threat still visible"
                );
                None
            }
        }
    }

    fn advance_fight(&mut self, ctx: &TickContext<'_>) -> Option<Transition> {
        if self.absence_confirmed() {
            let (to, reason) = if ctx.mode.is_compromised() {
                (BehaviorState::Retreat, TransitionReason::HealthCompromised)
            } else {
                (BehaviorState::Explore, TransitionReason::AbsenceConfirmed)
            };
            return Some(self.enter(to, reason, ctx.now));
        }

        if ctx.mode.is_compromised() {
            self.last_threat = Some(ThreatLevel::High);
            return Some(self.enter(
                BehaviorState::Retreat,
                TransitionReason::HealthCompromised,
                ctx.now,
            ));
        }

        let due = self.next_recheck.is_none_or(|at| ctx.now >= at);
        if !due {
            return None;
        }
        self.next_recheck = Some(ctx.now + self.config.fight_recheck);
        match self.assess(ctx) {
            ThreatLevel::Mid => Some(self.enter(
                BehaviorState::Retreat,
                TransitionReason::ThreatMid,
                ctx.now,
            )),
            ThreatLevel::High | ThreatLevel::Low => None,
        }
    }

    fn advance_retreat(&mut self, ctx: &TickContext<'_>) -> Option<Transition> {
        if self.absence_confirmed() {
            if ctx.mode == HealthMode::Normal {
                return Some(self.enter(
                    BehaviorState::Explore,
                    TransitionReason::AbsenceConfirmed,
                    ctx.now,
                ));
            }
            if self.hold_expired(ctx.now) {
                self.hold_until = Some(ctx.now + self.config.retreat_extend);
            }
            return None;
        }

        if !self.hold_expired(ctx.now) {
            return None;
        }

        if ctx.snapshot.all_clear() && !ctx.mode.is_compromised() {
            return Some(self.enter(
                BehaviorState::Explore,
                TransitionReason::ThreatCleared,
                ctx.now,
            ));
        }

        if ctx.mode.is_compromised() {
            self.hold_until = Some(ctx.now + self.config.retreat_extend);
            debug!(mode = %ctx.mode, "retreat hold extended");
            return None;
        }

        let threat = self.assess(ctx);
        let mut transition =
            self.enter(BehaviorState::Alert, TransitionReason::RetreatTimeout, ctx.now);
        transition.threat = Some(threat);
        Some(transition)
    }

    /// Switch state and arm the timers the new state runs on.
    fn enter(&mut self, to: BehaviorState, reason: TransitionReason, now: Instant) -> Transition {
        let from = self.state;
        self.state = to;

        match to {
            BehaviorState::Explore => {
                self.hold_until = None;
                self.alert_extensions = 0;
            }
            BehaviorState::Alert => {
                self.hold_until = Some(now + self.config.alert_hold);
                self.alert_extensions = 0;
                self.alert_waited = false;
            }
            BehaviorState::Retreat => {
                self.hold_until = Some(now + self.config.retreat_hold);
            }
            BehaviorState::Fight => {
                self.hold_until = None;
                self.next_recheck = Some(now + self.config.fight_recheck);
                self.last_attack = None;
            }
        }

        Transition {
            from,
            to,
            reason,
            threat: self.last_threat,
        }
    }

    /// The state's own action for a tick nothing else claimed.
    ///
    /// Only call this when the command channel is empty; cooldowns and the
    /// once-per-alert WAIT are consumed here.
    pub fn action(&mut self, ctx: &TickContext<'_>, router: &mut EscapeRouter) -> Option<Command> {
        match self.state {
            BehaviorState::Explore => {
                if ctx.mode.is_compromised() {
                    // Recover in place rather than wander into trouble.
                    return Some(Command::Wait);
                }
                let ready = self.last_autoexplore.is_none_or(|at| {
                    ctx.now.duration_since(at) >= self.config.autoexplore_cooldown
                });
                if ready {
                    self.last_autoexplore = Some(ctx.now);
                    Some(Command::Autoexplore)
                } else {
                    None
                }
            }
            BehaviorState::Alert => {
                if self.alert_waited {
                    None
                } else {
                    self.alert_waited = true;
                    Some(Command::Wait)
                }
            }
            BehaviorState::Retreat => Some(Command::Move(router.next_move().chosen)),
            BehaviorState::Fight => {
                if !ctx.snapshot.monsters_present {
                    return None;
                }
                let ready = self.last_attack.is_none_or(|at| {
                    ctx.now.duration_since(at) >= self.config.attack_cooldown
                });
                if ready {
                    self.last_attack = Some(ctx.now);
                    Some(Command::Attack)
                } else {
                    None
                }
            }
        }
    }
}
