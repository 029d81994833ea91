use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::engine::EngineConfig;
use crate::health::HealthThresholds;
use crate::perception::DEFAULT_SCREEN_WIDTH;

const CONFIG_FILENAME: &str = "config.toml";
const CONFIG_DIR: &str = ".crawlbot";

/// Longest PANIC-entry burst the queue contract allows.
pub const MAX_PANIC_BURST: usize = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "health thresholds must satisfy 0 <= panic_enter < panic_exit < caution_enter < caution_exit <= 1 (got {0:?})"
    )]
    InvalidThresholds(HealthThresholds),
    #[error("unknown health profile '{0}' (expected 'standard' or 'cautious')")]
    UnknownProfile(String),
    #[error("panic_burst_len must be between 1 and {MAX_PANIC_BURST} (got {0})")]
    BurstLength(usize),
    #[error("absence_confirm_ticks must be at least 1")]
    AbsenceStreak,
}

#[derive(Debug, Deserialize)]
pub struct PathsConfig {
    /// Mailbox directory shared with the capture and executor loops.
    #[serde(default)]
    pub run_dir: Option<PathBuf>,
    #[serde(default = "default_dump_file")]
    pub dump_file: String,
    #[serde(default = "default_queue_file")]
    pub queue_file: String,
    #[serde(default = "default_journal_file")]
    pub journal_file: String,
}

fn default_dump_file() -> String {
    "console_dump.txt".to_string()
}

fn default_queue_file() -> String {
    "queue.txt".to_string()
}

fn default_journal_file() -> String {
    "decisions.jsonl".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            run_dir: None,
            dump_file: default_dump_file(),
            queue_file: default_queue_file(),
            journal_file: default_journal_file(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PerceptionSettings {
    #[serde(default = "default_screen_width")]
    pub screen_width: usize,
    #[serde(default = "default_stale_after_millis")]
    pub stale_after_millis: u64,
}

fn default_screen_width() -> usize {
    DEFAULT_SCREEN_WIDTH
}

fn default_stale_after_millis() -> u64 {
    5000
}

impl Default for PerceptionSettings {
    fn default() -> Self {
        Self {
            screen_width: default_screen_width(),
            stale_after_millis: default_stale_after_millis(),
        }
    }
}

/// Threshold profile plus optional per-value overrides.
///
/// ```toml
/// [health]
/// profile = "cautious"
/// panic_enter = 0.40
/// ```
#[derive(Debug, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub caution_enter: Option<f64>,
    #[serde(default)]
    pub caution_exit: Option<f64>,
    #[serde(default)]
    pub panic_enter: Option<f64>,
    #[serde(default)]
    pub panic_exit: Option<f64>,
}

fn default_profile() -> String {
    "standard".to_string()
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            caution_enter: None,
            caution_exit: None,
            panic_enter: None,
            panic_exit: None,
        }
    }
}

impl HealthSettings {
    /// Merge overrides onto the named profile and validate the result.
    pub fn thresholds(&self) -> Result<HealthThresholds, ConfigError> {
        let base = HealthThresholds::profile(&self.profile)?;
        let merged = HealthThresholds {
            caution_enter: self.caution_enter.unwrap_or(base.caution_enter),
            caution_exit: self.caution_exit.unwrap_or(base.caution_exit),
            panic_enter: self.panic_enter.unwrap_or(base.panic_enter),
            panic_exit: self.panic_exit.unwrap_or(base.panic_exit),
        };
        merged.validate()?;
        Ok(merged)
    }
}

#[derive(Debug, Deserialize)]
pub struct BehaviorSettings {
    #[serde(default = "default_autoexplore_cooldown_millis")]
    pub autoexplore_cooldown_millis: u64,
    #[serde(default = "default_alert_hold_millis")]
    pub alert_hold_millis: u64,
    #[serde(default = "default_alert_extend_millis")]
    pub alert_extend_millis: u64,
    #[serde(default = "default_max_alert_extensions")]
    pub max_alert_extensions: u32,
    #[serde(default = "default_retreat_hold_millis")]
    pub retreat_hold_millis: u64,
    #[serde(default = "default_retreat_extend_millis")]
    pub retreat_extend_millis: u64,
    #[serde(default = "default_attack_cooldown_millis")]
    pub attack_cooldown_millis: u64,
    #[serde(default = "default_fight_recheck_millis")]
    pub fight_recheck_millis: u64,
    #[serde(default = "default_absence_confirm_ticks")]
    pub absence_confirm_ticks: u32,
    #[serde(default = "default_panic_burst_len")]
    pub panic_burst_len: usize,
}

fn default_autoexplore_cooldown_millis() -> u64 {
    3000
}

fn default_alert_hold_millis() -> u64 {
    3000
}

fn default_alert_extend_millis() -> u64 {
    1000
}

fn default_max_alert_extensions() -> u32 {
    5
}

fn default_retreat_hold_millis() -> u64 {
    3000
}

fn default_retreat_extend_millis() -> u64 {
    1000
}

fn default_attack_cooldown_millis() -> u64 {
    1000
}

fn default_fight_recheck_millis() -> u64 {
    1000
}

fn default_absence_confirm_ticks() -> u32 {
    2
}

fn default_panic_burst_len() -> usize {
    MAX_PANIC_BURST
}

impl Default for BehaviorSettings {
    fn default() -> Self {
        Self {
            autoexplore_cooldown_millis: default_autoexplore_cooldown_millis(),
            alert_hold_millis: default_alert_hold_millis(),
            alert_extend_millis: default_alert_extend_millis(),
            max_alert_extensions: default_max_alert_extensions(),
            retreat_hold_millis: default_retreat_hold_millis(),
            retreat_extend_millis: default_retreat_extend_millis(),
            attack_cooldown_millis: default_attack_cooldown_millis(),
            fight_recheck_millis: default_fight_recheck_millis(),
            absence_confirm_ticks: default_absence_confirm_ticks(),
            panic_burst_len: default_panic_burst_len(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RunnerSettings {
    #[serde(default = "default_tick_interval_millis")]
    pub tick_interval_millis: u64,
    #[serde(default = "default_journal")]
    pub journal: bool,
}

fn default_tick_interval_millis() -> u64 {
    1000
}

fn default_journal() -> bool {
    true
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            tick_interval_millis: default_tick_interval_millis(),
            journal: default_journal(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ProjectConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub perception: PerceptionSettings,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub behavior: BehaviorSettings,
    #[serde(default)]
    pub runner: RunnerSettings,
}

impl ProjectConfig {
    /// Search upward from `start` for a `.crawlbot/config.toml` file and load it.
    /// Returns the default config if no file is found.
    pub fn load(start: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = Self::find_config_file(start) {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let config: ProjectConfig = toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            config
                .engine_config()
                .with_context(|| format!("invalid settings in {}", path.display()))?;
            Ok((config, Some(path)))
        } else {
            Ok((ProjectConfig::default(), None))
        }
    }

    fn find_config_file(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILENAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Timing and threshold settings for the decision engine.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let b = &self.behavior;
        if b.panic_burst_len == 0 || b.panic_burst_len > MAX_PANIC_BURST {
            return Err(ConfigError::BurstLength(b.panic_burst_len));
        }
        if b.absence_confirm_ticks == 0 {
            return Err(ConfigError::AbsenceStreak);
        }

        Ok(EngineConfig {
            thresholds: self.health.thresholds()?,
            autoexplore_cooldown: Duration::from_millis(b.autoexplore_cooldown_millis),
            alert_hold: Duration::from_millis(b.alert_hold_millis),
            alert_extend: Duration::from_millis(b.alert_extend_millis),
            max_alert_extensions: b.max_alert_extensions,
            retreat_hold: Duration::from_millis(b.retreat_hold_millis),
            retreat_extend: Duration::from_millis(b.retreat_extend_millis),
            attack_cooldown: Duration::from_millis(b.attack_cooldown_millis),
            fight_recheck: Duration::from_millis(b.fight_recheck_millis),
            absence_confirm_ticks: b.absence_confirm_ticks,
            panic_burst_len: b.panic_burst_len,
        })
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.perception.stale_after_millis)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.runner.tick_interval_millis)
    }
}
