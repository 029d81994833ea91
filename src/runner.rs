//! The decision loop: read the dump, decide, write the queue, sleep.
//!
//! Failures outside the engine never stop the loop. A missing or stale dump
//! is a dropped frame; a queue error is logged and the tick counts as busy.
//! An emission the channel turns away is rolled back in the engine and
//! decided again on a later tick.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::engine::{DecisionEngine, EngineConfig, Tick};
use crate::journal::{DecisionJournal, JournalEvent};
use crate::perception::{DumpRead, Extractor, PerceptionSnapshot, read_dump};
use crate::queue::{CommandChannel, FileChannel, QueueArbiter, Submission};

pub struct RunnerConfig {
    pub dump_path: PathBuf,
    pub queue_path: PathBuf,
    /// `None` disables the decision journal.
    pub journal_path: Option<PathBuf>,
    pub engine: EngineConfig,
    /// Threshold profile name, recorded in the journal.
    pub profile: String,
    pub screen_width: usize,
    pub stale_after: Duration,
    pub tick_interval: Duration,
    /// Stop after this many ticks (`None` = run until stopped).
    pub max_ticks: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    /// Stop flag was raised (Ctrl-C).
    Stopped,
    /// `max_ticks` reached.
    TickLimit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u64,
    pub skipped: u64,
    pub commands: u64,
    pub busy: u64,
}

/// One engine wired to its perception source and command channel.
pub struct DecisionLoop<C> {
    engine: DecisionEngine,
    extractor: Extractor,
    arbiter: QueueArbiter<C>,
    journal: Option<DecisionJournal>,
    dump_path: PathBuf,
    stale_after: Duration,
    stats: RunStats,
}

impl<C: CommandChannel> DecisionLoop<C> {
    pub fn new(
        engine: DecisionEngine,
        extractor: Extractor,
        channel: C,
        journal: Option<DecisionJournal>,
        dump_path: PathBuf,
        stale_after: Duration,
    ) -> Self {
        Self {
            engine,
            extractor,
            arbiter: QueueArbiter::new(channel),
            journal,
            dump_path,
            stale_after,
            stats: RunStats::default(),
        }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn channel(&self) -> &C {
        self.arbiter.channel()
    }

    /// Run one full cycle. `now` drives the engine's timers, `wall` the
    /// dump staleness check.
    pub fn tick(&mut self, now: Instant, wall: SystemTime) -> Tick {
        self.stats.ticks += 1;

        let read = read_dump(&self.dump_path, self.stale_after, wall);
        let snapshot = match read {
            DumpRead::Fresh(text) => self.extractor.extract(&text),
            other => {
                debug!(dump = %self.dump_path.display(), status = %other.describe(), "no usable frame");
                PerceptionSnapshot::empty()
            }
        };

        let queue_empty = match self.arbiter.is_idle() {
            Ok(empty) => empty,
            Err(e) => {
                warn!(error = %e, "queue check failed, treating channel as busy");
                self.journal_event(JournalEvent::ChannelError {
                    tick: self.stats.ticks,
                    error: format!("{e:#}"),
                });
                false
            }
        };

        let tick = self.engine.step(&snapshot, queue_empty, now);
        if tick.skipped() {
            self.stats.skipped += 1;
        }

        let mut queued = false;
        if let Some(emission) = &tick.emission {
            match self.arbiter.submit(emission) {
                Ok(Submission::Written(n)) => {
                    queued = true;
                    self.stats.commands += n as u64;
                    let tokens: Vec<String> =
                        emission.commands().iter().map(ToString::to_string).collect();
                    info!(
                        tick = tick.index,
                        state = %tick.state,
                        commands = ?tokens,
                        "queued"
                    );
                }
                Ok(Submission::Busy) => {
                    self.stats.busy += 1;
                    self.engine.emission_dropped(&tick);
                }
                Err(e) => {
                    warn!(error = %e, "queue write failed");
                    self.stats.busy += 1;
                    self.engine.emission_dropped(&tick);
                    self.journal_event(JournalEvent::ChannelError {
                        tick: tick.index,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.record_all(JournalEvent::for_tick(&tick, queued)) {
                warn!(error = %e, "journal write failed");
            }
        }

        tick
    }

    fn journal_event(&self, event: JournalEvent) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.record(event) {
                warn!(error = %e, "journal write failed");
            }
        }
    }
}

/// Build the loop from `config` and run it until stopped or out of ticks.
pub fn run(config: RunnerConfig, stop: Arc<AtomicBool>) -> Result<(RunResult, RunStats)> {
    let journal = match &config.journal_path {
        Some(path) => Some(DecisionJournal::new(path)?),
        None => None,
    };
    if let Some(journal) = &journal {
        journal.record(JournalEvent::SessionStarted {
            dump: config.dump_path.display().to_string(),
            queue: config.queue_path.display().to_string(),
            profile: config.profile.clone(),
        })?;
    }

    let mut decision_loop = DecisionLoop::new(
        DecisionEngine::new(config.engine),
        Extractor::new(config.screen_width),
        FileChannel::new(&config.queue_path),
        journal,
        config.dump_path.clone(),
        config.stale_after,
    );

    info!(
        dump = %config.dump_path.display(),
        queue = %config.queue_path.display(),
        interval_ms = config.tick_interval.as_millis() as u64,
        "decision loop starting"
    );

    let result = loop {
        if stop.load(Ordering::Relaxed) {
            break RunResult::Stopped;
        }

        decision_loop.tick(Instant::now(), SystemTime::now());

        if config
            .max_ticks
            .is_some_and(|max| decision_loop.stats().ticks >= max)
        {
            break RunResult::TickLimit;
        }

        std::thread::sleep(config.tick_interval);
    };

    let stats = decision_loop.stats();
    info!(result = ?result, ticks = stats.ticks, commands = stats.commands, "decision loop ended");
    decision_loop.journal_event(JournalEvent::SessionEnded {
        ticks: stats.ticks,
        commands: stats.commands,
        reason: match result {
            RunResult::Stopped => "stopped".to_string(),
            RunResult::TickLimit => "tick limit".to_string(),
        },
    });

    Ok((result, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::engine::{BehaviorState, Emission};
    use std::fs;

    /// In-memory channel whose first `failures` writes error out.
    #[derive(Default)]
    struct FlakyChannel {
        lines: Vec<String>,
        failures: usize,
    }

    impl CommandChannel for FlakyChannel {
        fn is_empty(&self) -> Result<bool> {
            Ok(self.lines.is_empty())
        }

        fn replace(&mut self, commands: &[Command]) -> Result<()> {
            if self.failures > 0 {
                self.failures -= 1;
                anyhow::bail!("disk full");
            }
            self.lines = commands.iter().map(ToString::to_string).collect();
            Ok(())
        }
    }

    fn flaky_loop(dir: &std::path::Path, failures: usize) -> DecisionLoop<FlakyChannel> {
        DecisionLoop::new(
            DecisionEngine::new(EngineConfig::default()),
            Extractor::new(120),
            FlakyChannel {
                lines: Vec::new(),
                failures,
            },
            None,
            dir.join("console_dump.txt"),
            Duration::from_secs(5),
        )
    }

    fn config_in(dir: &std::path::Path) -> RunnerConfig {
        RunnerConfig {
            dump_path: dir.join("console_dump.txt"),
            queue_path: dir.join("queue.txt"),
            journal_path: Some(dir.join("decisions.jsonl")),
            engine: EngineConfig::default(),
            profile: "standard".to_string(),
            screen_width: 120,
            stale_after: Duration::from_secs(5),
            tick_interval: Duration::ZERO,
            max_ticks: Some(1),
        }
    }

    fn file_loop(dir: &std::path::Path) -> DecisionLoop<FileChannel> {
        DecisionLoop::new(
            DecisionEngine::new(EngineConfig::default()),
            Extractor::new(120),
            FileChannel::new(dir.join("queue.txt")),
            None,
            dir.join("console_dump.txt"),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn missing_dump_is_a_dropped_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let mut decision_loop = file_loop(tmp.path());

        let tick = decision_loop.tick(Instant::now(), SystemTime::now());
        assert!(tick.skipped());
        assert_eq!(decision_loop.stats().skipped, 1);
        assert!(!tmp.path().join("queue.txt").exists());
    }

    #[test]
    fn fresh_dump_queues_autoexplore() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("console_dump.txt"), "Health: 20/20\n").unwrap();
        let mut decision_loop = file_loop(tmp.path());

        decision_loop.tick(Instant::now(), SystemTime::now());
        assert_eq!(
            fs::read_to_string(tmp.path().join("queue.txt")).unwrap(),
            "AUTOEXPLORE\n"
        );
        assert_eq!(decision_loop.stats().commands, 1);
    }

    #[test]
    fn pending_queue_is_not_touched() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("console_dump.txt"), "Health: 20/20\n").unwrap();
        fs::write(tmp.path().join("queue.txt"), "WAIT\n").unwrap();
        let mut decision_loop = file_loop(tmp.path());

        let tick = decision_loop.tick(Instant::now(), SystemTime::now());
        assert_eq!(tick.emission, None);
        assert_eq!(
            fs::read_to_string(tmp.path().join("queue.txt")).unwrap(),
            "WAIT\n"
        );
    }

    #[test]
    fn failed_write_reissues_prompt_answer() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("console_dump.txt"),
            "Health: 20/20\n_Something happens. --more--\n",
        )
        .unwrap();
        let mut decision_loop = flaky_loop(tmp.path(), 1);
        let t0 = Instant::now();

        let first = decision_loop.tick(t0, SystemTime::now());
        assert_eq!(first.emission, Some(Emission::Single(Command::More)));
        assert!(decision_loop.channel().lines.is_empty());
        assert_eq!(decision_loop.stats().busy, 1);

        let second = decision_loop.tick(t0 + Duration::from_secs(1), SystemTime::now());
        assert_eq!(second.emission, Some(Emission::Single(Command::More)));
        assert_eq!(decision_loop.channel().lines, vec!["MORE"]);
        assert_eq!(decision_loop.stats().commands, 1);
    }

    #[test]
    fn failed_write_on_alert_entry_keeps_the_wait() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("console_dump.txt"),
            "Health: 20/20\n  g   goblin (asleep)\n",
        )
        .unwrap();
        let mut decision_loop = flaky_loop(tmp.path(), 1);
        let t0 = Instant::now();

        let edge = decision_loop.tick(t0, SystemTime::now());
        assert_eq!(edge.state, BehaviorState::Alert);
        assert_eq!(edge.emission, Some(Emission::Single(Command::Wait)));
        assert!(decision_loop.channel().lines.is_empty());

        let next = decision_loop.tick(t0 + Duration::from_secs(1), SystemTime::now());
        assert_eq!(next.state, BehaviorState::Alert);
        assert_eq!(decision_loop.channel().lines, vec!["WAIT"]);
    }

    #[test]
    fn run_stops_at_tick_limit_and_journals() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("console_dump.txt"), "Health: 20/20\n").unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let (result, stats) = run(config_in(tmp.path()), stop).unwrap();
        assert_eq!(result, RunResult::TickLimit);
        assert_eq!(stats.ticks, 1);

        let journal = fs::read_to_string(tmp.path().join("decisions.jsonl")).unwrap();
        let lines: Vec<&str> = journal.lines().collect();
        assert!(lines[0].contains("session_started"));
        assert!(lines.iter().any(|l| l.contains("command_queued")));
        assert!(lines[lines.len() - 1].contains("session_ended"));
    }

    #[test]
    fn run_honors_stop_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_in(tmp.path());
        config.max_ticks = None;
        config.journal_path = None;

        let stop = Arc::new(AtomicBool::new(true));
        let (result, stats) = run(config, stop).unwrap();
        assert_eq!(result, RunResult::Stopped);
        assert_eq!(stats.ticks, 0);
    }
}
