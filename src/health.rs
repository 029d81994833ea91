//! Health mode tracking with hysteresis.
//!
//! ```text
//! NORMAL  ── ratio < caution_enter ──▶ CAUTION ── ratio < panic_enter ──▶ PANIC
//!    ▲                                   │  ▲                               │
//!    └──── ratio ≥ caution_exit ─────────┘  └──── ratio ≥ panic_exit ───────┘
//! NORMAL ── ratio < panic_enter ──▶ PANIC (direct drop)
//! ```
//!
//! The tracker smooths raw readings with a 3-sample rolling minimum, so a
//! single optimistic frame cannot pull the mode out of danger.

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

use crate::config::ConfigError;

const SAMPLE_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthMode {
    #[default]
    Normal,
    Caution,
    Panic,
}

impl HealthMode {
    /// Caution or Panic.
    pub fn is_compromised(self) -> bool {
        !matches!(self, HealthMode::Normal)
    }
}

impl fmt::Display for HealthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthMode::Normal => "NORMAL",
            HealthMode::Caution => "CAUTION",
            HealthMode::Panic => "PANIC",
        };
        f.write_str(label)
    }
}

/// Enter/exit thresholds for both danger bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthThresholds {
    pub caution_enter: f64,
    pub caution_exit: f64,
    pub panic_enter: f64,
    pub panic_exit: f64,
}

impl HealthThresholds {
    pub const STANDARD: Self = Self {
        caution_enter: 0.55,
        caution_exit: 0.65,
        panic_enter: 0.30,
        panic_exit: 0.40,
    };

    pub const CAUTIOUS: Self = Self {
        caution_enter: 0.75,
        caution_exit: 0.90,
        panic_enter: 0.45,
        panic_exit: 0.65,
    };

    /// Look up a named tuning profile.
    pub fn profile(name: &str) -> Result<Self, ConfigError> {
        match name {
            "standard" => Ok(Self::STANDARD),
            "cautious" => Ok(Self::CAUTIOUS),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }

    /// Check `panic_enter < panic_exit < caution_enter < caution_exit`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = self.panic_enter < self.panic_exit
            && self.panic_exit < self.caution_enter
            && self.caution_enter < self.caution_exit;
        let in_range = [
            self.panic_enter,
            self.panic_exit,
            self.caution_enter,
            self.caution_exit,
        ]
        .iter()
        .all(|v| (0.0..=1.0).contains(v));

        if ordered && in_range {
            Ok(())
        } else {
            Err(ConfigError::InvalidThresholds(*self))
        }
    }
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Pure mode transition for one stabilized ratio.
pub fn update_mode(last: HealthMode, ratio: f64, t: &HealthThresholds) -> HealthMode {
    match last {
        HealthMode::Normal => {
            if ratio < t.panic_enter {
                HealthMode::Panic
            } else if ratio < t.caution_enter {
                HealthMode::Caution
            } else {
                HealthMode::Normal
            }
        }
        HealthMode::Caution => {
            if ratio < t.panic_enter {
                HealthMode::Panic
            } else if ratio >= t.caution_exit {
                HealthMode::Normal
            } else {
                HealthMode::Caution
            }
        }
        HealthMode::Panic => {
            if ratio >= t.panic_exit {
                HealthMode::Caution
            } else {
                HealthMode::Panic
            }
        }
    }
}

/// Outcome of feeding one reading to the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeUpdate {
    pub previous: HealthMode,
    pub current: HealthMode,
    /// The rolling-minimum ratio the transition was decided on.
    pub stable_ratio: f64,
}

impl ModeUpdate {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }

    pub fn entered_panic(&self) -> bool {
        self.current == HealthMode::Panic && self.previous != HealthMode::Panic
    }
}

#[derive(Debug, Clone)]
pub struct HealthTracker {
    thresholds: HealthThresholds,
    samples: VecDeque<f64>,
    mode: HealthMode,
}

impl HealthTracker {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            samples: VecDeque::with_capacity(SAMPLE_WINDOW),
            mode: HealthMode::Normal,
        }
    }

    pub fn mode(&self) -> HealthMode {
        self.mode
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Rolling minimum of the retained samples.
    pub fn stable_ratio(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::min)
    }

    /// Feed one raw ratio and advance the mode.
    pub fn observe(&mut self, ratio: f64) -> ModeUpdate {
        if self.samples.len() == SAMPLE_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(ratio);

        let mut stable = self.stable_ratio().unwrap_or(ratio);
        // A recovered reading flushes the stale low samples.
        if ratio >= self.thresholds.caution_exit && stable < self.thresholds.caution_exit {
            self.samples.clear();
            self.samples.push_back(ratio);
            stable = ratio;
        }

        let previous = self.mode;
        self.mode = update_mode(previous, stable, &self.thresholds);

        ModeUpdate {
            previous,
            current: self.mode,
            stable_ratio: stable,
        }
    }
}
