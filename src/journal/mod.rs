//! Decision journal: JSON lines per session.
//!
//! Records why the bot did what it did: dropped frames, health-mode
//! changes, behavior transitions with their reason, and every command that
//! reached the queue. Each line is a self-contained JSON object with an
//! RFC 3339 timestamp.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::debug;

use crate::engine::{BehaviorState, Emission, Tick, TickRule, TransitionReason};
use crate::health::HealthMode;
use crate::threat::ThreatLevel;

#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub timestamp: String,
    #[serde(flatten)]
    pub event: JournalEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum JournalEvent {
    SessionStarted {
        dump: String,
        queue: String,
        profile: String,
    },
    FrameSkipped {
        tick: u64,
        reason: String,
    },
    ModeChanged {
        tick: u64,
        from: HealthMode,
        to: HealthMode,
        stable_ratio: f64,
    },
    StateChanged {
        tick: u64,
        from: BehaviorState,
        to: BehaviorState,
        reason: TransitionReason,
        threat: Option<ThreatLevel>,
    },
    CommandQueued {
        tick: u64,
        command: String,
        rule: TickRule,
        state: BehaviorState,
        mode: HealthMode,
    },
    BurstQueued {
        tick: u64,
        commands: Vec<String>,
    },
    ChannelError {
        tick: u64,
        error: String,
    },
    SessionEnded {
        ticks: u64,
        commands: u64,
        reason: String,
    },
}

impl JournalEvent {
    /// Events describing one tick's decisions.
    ///
    /// `queued` is whether the emission actually reached the channel.
    pub fn for_tick(tick: &Tick, queued: bool) -> Vec<JournalEvent> {
        let mut events = Vec::new();

        let Some(update) = &tick.mode else {
            events.push(JournalEvent::FrameSkipped {
                tick: tick.index,
                reason: "no health reading".to_string(),
            });
            return events;
        };

        if update.changed() {
            events.push(JournalEvent::ModeChanged {
                tick: tick.index,
                from: update.previous,
                to: update.current,
                stable_ratio: update.stable_ratio,
            });
        }

        if let Some(t) = &tick.transition {
            events.push(JournalEvent::StateChanged {
                tick: tick.index,
                from: t.from,
                to: t.to,
                reason: t.reason,
                threat: t.threat,
            });
        }

        if !queued {
            return events;
        }
        match (&tick.emission, tick.rule) {
            (Some(Emission::Single(cmd)), Some(rule)) => {
                events.push(JournalEvent::CommandQueued {
                    tick: tick.index,
                    command: cmd.to_string(),
                    rule,
                    state: tick.state,
                    mode: update.current,
                });
            }
            (Some(Emission::Burst(cmds)), _) => {
                events.push(JournalEvent::BurstQueued {
                    tick: tick.index,
                    commands: cmds.iter().map(ToString::to_string).collect(),
                });
            }
            _ => {}
        }

        events
    }
}

/// Append-only JSONL writer.
pub struct DecisionJournal {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl DecisionJournal {
    /// Open the journal at `path`, creating parent directories. Appends to
    /// an existing file.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create journal directory: {}", parent.display())
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open journal: {}", path.display()))?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    pub fn record(&self, event: JournalEvent) -> Result<()> {
        let entry = JournalEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        };

        let json = serde_json::to_string(&entry).context("failed to serialize journal entry")?;
        debug!(entry = %json, "journal");

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("journal writer lock poisoned"))?;
        writeln!(writer, "{json}").context("failed to write journal entry")?;
        writer.flush().context("failed to flush journal")?;

        Ok(())
    }

    pub fn record_all(&self, events: Vec<JournalEvent>) -> Result<()> {
        for event in events {
            self.record(event)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
