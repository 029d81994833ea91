//! Prompt response rules.
//!
//! Modal UI prompts swallow keystrokes, so they are answered before any
//! behavior action. The table is checked top to bottom and the first rule
//! whose guard matches answers the tick.

use serde::Serialize;

use crate::command::Command;
use crate::perception::PerceptionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    RepeatCount,
    More,
    Shop,
    ConfirmY,
}

/// A single guard → response entry.
#[derive(Debug, Clone, Copy)]
pub struct PromptRule {
    pub kind: PromptKind,
    pub guard: fn(&PerceptionSnapshot) -> bool,
    pub response: Command,
    /// Answer only once while the prompt stays on screen.
    pub once_per_appearance: bool,
}

fn repeat_count_shown(s: &PerceptionSnapshot) -> bool {
    s.repeat_count_prompt
}

fn more_shown(s: &PerceptionSnapshot) -> bool {
    s.more_prompt
}

fn shop_shown(s: &PerceptionSnapshot) -> bool {
    s.shop_prompt
}

fn confirm_shown(s: &PerceptionSnapshot) -> bool {
    s.confirm_y_prompt
}

pub const PROMPT_RULES: [PromptRule; 4] = [
    PromptRule {
        kind: PromptKind::RepeatCount,
        guard: repeat_count_shown,
        response: Command::Esc,
        once_per_appearance: true,
    },
    PromptRule {
        kind: PromptKind::More,
        guard: more_shown,
        response: Command::More,
        once_per_appearance: true,
    },
    PromptRule {
        kind: PromptKind::Shop,
        guard: shop_shown,
        response: Command::Esc,
        once_per_appearance: false,
    },
    PromptRule {
        kind: PromptKind::ConfirmY,
        guard: confirm_shown,
        response: Command::ConfirmY,
        once_per_appearance: false,
    },
];

/// Which once-per-appearance prompts have already been answered.
#[derive(Debug, Clone, Default)]
pub struct PromptLatches {
    answered: [bool; PROMPT_RULES.len()],
}

impl PromptLatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release latches whose prompt is no longer on screen.
    pub fn refresh(&mut self, snapshot: &PerceptionSnapshot) {
        for (latch, rule) in self.answered.iter_mut().zip(PROMPT_RULES.iter()) {
            if !(rule.guard)(snapshot) {
                *latch = false;
            }
        }
    }

    /// First unlatched prompt rule that matches, latching it if needed.
    ///
    /// A latched prompt that lingers on screen does not block the rules
    /// below it.
    pub fn respond(&mut self, snapshot: &PerceptionSnapshot) -> Option<(PromptKind, Command)> {
        for (latch, rule) in self.answered.iter_mut().zip(PROMPT_RULES.iter()) {
            if *latch || !(rule.guard)(snapshot) {
                continue;
            }
            if rule.once_per_appearance {
                *latch = true;
            }
            return Some((rule.kind, rule.response));
        }
        None
    }

    pub fn is_latched(&self, kind: PromptKind) -> bool {
        PROMPT_RULES
            .iter()
            .position(|r| r.kind == kind)
            .is_some_and(|i| self.answered[i])
    }
}
