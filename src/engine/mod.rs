//! Decision engine: one perception snapshot in, at most one emission out.
//!
//! Each tick runs the same cascade:
//!
//! 1. no health reading → frame dropped, nothing changes
//! 2. health tracker observes the ratio
//! 3. behavior transitions run (also during PANIC)
//! 4. first matching rule answers the tick, only if the channel is empty:
//!    PANIC-entry burst, prompt table, sustained PANIC escape, state action
//!
//! The engine does no I/O. Time is passed in so tests can drive it with
//! synthetic instants.
//!
//! Deciding an emission consumes latches, cooldowns and router memory. When
//! the channel then refuses the write, [`DecisionEngine::emission_dropped`]
//! puts that bookkeeping back, leaving the engine as if the tick had seen a
//! busy channel.

pub mod behavior;
pub mod rules;

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::command::Command;
use crate::escape::EscapeRouter;
use crate::health::{HealthMode, HealthThresholds, HealthTracker, ModeUpdate};
use crate::perception::PerceptionSnapshot;
use crate::threat::ThreatLevel;

pub use behavior::{BehaviorMachine, BehaviorState, TickContext, Transition, TransitionReason};
pub use rules::{PROMPT_RULES, PromptKind, PromptLatches, PromptRule};

/// Timing and threshold knobs for the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub thresholds: HealthThresholds,
    /// Minimum gap between two AUTOEXPLORE commands.
    pub autoexplore_cooldown: Duration,
    pub alert_hold: Duration,
    pub alert_extend: Duration,
    /// ALERT extensions granted to a visible low threat before engaging it.
    /// `0` never engages.
    pub max_alert_extensions: u32,
    pub retreat_hold: Duration,
    pub retreat_extend: Duration,
    pub attack_cooldown: Duration,
    pub fight_recheck: Duration,
    /// Consecutive all-clear ticks that count as "monsters gone".
    pub absence_confirm_ticks: u32,
    pub panic_burst_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: HealthThresholds::STANDARD,
            autoexplore_cooldown: Duration::from_secs(3),
            alert_hold: Duration::from_secs(3),
            alert_extend: Duration::from_secs(1),
            max_alert_extensions: 5,
            retreat_hold: Duration::from_secs(3),
            retreat_extend: Duration::from_secs(1),
            attack_cooldown: Duration::from_secs(1),
            fight_recheck: Duration::from_secs(1),
            absence_confirm_ticks: 2,
            panic_burst_len: 3,
        }
    }
}

/// What the engine wants written to the command channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "commands", rename_all = "snake_case")]
pub enum Emission {
    Single(Command),
    /// Written as one whole-file replace.
    Burst(Vec<Command>),
}

impl Emission {
    pub fn commands(&self) -> &[Command] {
        match self {
            Emission::Single(cmd) => std::slice::from_ref(cmd),
            Emission::Burst(cmds) => cmds,
        }
    }
}

/// The rule that answered a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", content = "prompt", rename_all = "snake_case")]
pub enum TickRule {
    PanicBurst,
    Prompt(PromptKind),
    PanicEscape,
    StateAction,
}

/// Result of one engine step.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub index: u64,
    /// `None` when the frame had no health reading and was dropped.
    pub mode: Option<ModeUpdate>,
    pub state: BehaviorState,
    pub transition: Option<Transition>,
    pub threat: Option<ThreatLevel>,
    pub rule: Option<TickRule>,
    pub emission: Option<Emission>,
}

impl Tick {
    pub fn skipped(&self) -> bool {
        self.mode.is_none()
    }
}

pub struct DecisionEngine {
    config: EngineConfig,
    health: HealthTracker,
    behavior: BehaviorMachine,
    prompts: PromptLatches,
    router: EscapeRouter,
    ticks: u64,
    /// Decision-phase state from before the latest emission.
    pending: Option<Savepoint>,
}

/// What `decide` may consume, captured so a refused write can be undone.
#[derive(Debug, Clone)]
struct Savepoint {
    tick: u64,
    behavior: BehaviorMachine,
    prompts: PromptLatches,
    router: EscapeRouter,
}

impl DecisionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            health: HealthTracker::new(config.thresholds),
            behavior: BehaviorMachine::new(config),
            prompts: PromptLatches::new(),
            router: EscapeRouter::new(),
            ticks: 0,
            pending: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mode(&self) -> HealthMode {
        self.health.mode()
    }

    pub fn state(&self) -> BehaviorState {
        self.behavior.state()
    }

    pub fn router(&self) -> &EscapeRouter {
        &self.router
    }

    pub fn prompts(&self) -> &PromptLatches {
        &self.prompts
    }

    /// Advance one tick.
    ///
    /// `queue_empty` is the channel state observed just before this call;
    /// nothing is emitted unless it is `true`.
    pub fn step(&mut self, snapshot: &PerceptionSnapshot, queue_empty: bool, now: Instant) -> Tick {
        self.ticks += 1;
        let index = self.ticks;
        self.pending = None;

        let Some(ratio) = snapshot.health_ratio else {
            debug!(tick = index, "no health reading, frame dropped");
            return Tick {
                index,
                mode: None,
                state: self.behavior.state(),
                transition: None,
                threat: None,
                rule: None,
                emission: None,
            };
        };

        let update = self.health.observe(ratio);
        if update.changed() {
            info!(
                from = %update.previous,
                to = %update.current,
                ratio = update.stable_ratio,
                "health mode changed"
            );
        }

        let ctx = TickContext {
            snapshot,
            mode: update.current,
            now,
        };

        let transition = self.behavior.advance(&ctx);
        if let Some(t) = &transition {
            info!(from = %t.from, to = %t.to, reason = %t.reason, "behavior state changed");
        }
        let threat = self.behavior.last_threat();

        self.prompts.refresh(snapshot);

        let (rule, emission) = if queue_empty {
            let savepoint = Savepoint {
                tick: index,
                behavior: self.behavior.clone(),
                prompts: self.prompts.clone(),
                router: self.router.clone(),
            };
            match self.decide(&ctx, &update) {
                Some((rule, emission)) => {
                    self.pending = Some(savepoint);
                    (Some(rule), Some(emission))
                }
                None => (None, None),
            }
        } else {
            (None, None)
        };

        Tick {
            index,
            mode: Some(update),
            state: self.behavior.state(),
            transition,
            threat,
            rule,
            emission,
        }
    }

    /// Undo what deciding `tick`'s emission consumed, after the channel
    /// turned it away.
    ///
    /// The engine ends up as if `tick` had observed a busy channel, so the
    /// same command is decided again on the next empty-channel tick. Only
    /// the most recent tick can be rolled back; older ticks are ignored.
    pub fn emission_dropped(&mut self, tick: &Tick) {
        let Some(savepoint) = self.pending.take() else {
            return;
        };
        if savepoint.tick != tick.index {
            return;
        }
        self.behavior = savepoint.behavior;
        self.prompts = savepoint.prompts;
        self.router = savepoint.router;
        debug!(tick = tick.index, "emission dropped, decision rolled back");
    }

    fn decide(&mut self, ctx: &TickContext<'_>, update: &ModeUpdate) -> Option<(TickRule, Emission)> {
        if update.entered_panic() {
            let moves = self
                .router
                .plan(self.config.panic_burst_len)
                .into_iter()
                .map(Command::Move)
                .collect();
            return Some((TickRule::PanicBurst, Emission::Burst(moves)));
        }

        if let Some((kind, command)) = self.prompts.respond(ctx.snapshot) {
            return Some((TickRule::Prompt(kind), Emission::Single(command)));
        }

        if update.current == HealthMode::Panic {
            let step = self.router.next_move();
            return Some((
                TickRule::PanicEscape,
                Emission::Single(Command::Move(step.chosen)),
            ));
        }

        self.behavior
            .action(ctx, &mut self.router)
            .map(|cmd| (TickRule::StateAction, Emission::Single(cmd)))
    }
}
