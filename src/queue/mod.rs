//! Single-slot command channel.
//!
//! The executor pops one token per line from the queue file and rewrites
//! the rest. This side only writes when the file is empty, and every write
//! replaces the whole file, so at most one decision is ever in flight.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::command::Command;
use crate::engine::Emission;

/// Transport behind the arbiter.
pub trait CommandChannel {
    /// True when nothing is waiting for the executor.
    fn is_empty(&self) -> Result<bool>;

    /// Replace the channel contents with `commands`, one token per line.
    fn replace(&mut self, commands: &[Command]) -> Result<()>;
}

/// Queue file shared with the executor.
#[derive(Debug, Clone)]
pub struct FileChannel {
    path: PathBuf,
}

impl FileChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tokens currently waiting in the file.
    pub fn pending(&self) -> Result<Vec<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => {
                Err(e).with_context(|| format!("failed to read queue {}", self.path.display()))
            }
        }
    }
}

impl CommandChannel for FileChannel {
    fn is_empty(&self) -> Result<bool> {
        Ok(self.pending()?.is_empty())
    }

    fn replace(&mut self, commands: &[Command]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let mut body = String::new();
        for cmd in commands {
            body.push_str(&cmd.to_string());
            body.push('\n');
        }

        // Write beside the target and rename so the executor never sees a
        // half-written file.
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, body)
            .with_context(|| format!("failed to write {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("failed to replace queue {}", self.path.display()))?;
        Ok(())
    }
}

/// Result of handing an emission to the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The channel was empty and now holds this many tokens.
    Written(usize),
    /// The executor had not drained the channel; nothing was written.
    Busy,
}

/// Gatekeeper that enforces the single-slot rule on a channel.
pub struct QueueArbiter<C> {
    channel: C,
}

impl<C: CommandChannel> QueueArbiter<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn is_idle(&self) -> Result<bool> {
        self.channel.is_empty()
    }

    /// Write `emission` if, and only if, the channel is still empty.
    pub fn submit(&mut self, emission: &Emission) -> Result<Submission> {
        let commands = emission.commands();
        if commands.is_empty() {
            return Ok(Submission::Written(0));
        }
        // The executor may have been slow since the engine looked.
        if !self.channel.is_empty()? {
            debug!(commands = commands.len(), "channel busy, emission dropped");
            return Ok(Submission::Busy);
        }
        self.channel.replace(commands)?;
        Ok(Submission::Written(commands.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escape::Direction;

    #[derive(Default)]
    struct MemoryChannel {
        lines: Vec<String>,
        writes: usize,
    }

    impl CommandChannel for MemoryChannel {
        fn is_empty(&self) -> Result<bool> {
            Ok(self.lines.is_empty())
        }

        fn replace(&mut self, commands: &[Command]) -> Result<()> {
            self.lines = commands.iter().map(|c| c.to_string()).collect();
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn writes_into_empty_channel() {
        let mut arbiter = QueueArbiter::new(MemoryChannel::default());
        let result = arbiter.submit(&Emission::Single(Command::Wait)).unwrap();
        assert_eq!(result, Submission::Written(1));
        assert_eq!(arbiter.channel().lines, vec!["WAIT"]);
    }

    #[test]
    fn busy_channel_is_left_alone() {
        let mut arbiter = QueueArbiter::new(MemoryChannel {
            lines: vec!["AUTOEXPLORE".to_string()],
            writes: 0,
        });
        let result = arbiter.submit(&Emission::Single(Command::Attack)).unwrap();
        assert_eq!(result, Submission::Busy);
        assert_eq!(arbiter.channel().lines, vec!["AUTOEXPLORE"]);
        assert_eq!(arbiter.channel().writes, 0);
    }

    #[test]
    fn burst_is_one_write() {
        let mut arbiter = QueueArbiter::new(MemoryChannel::default());
        let burst = Emission::Burst(vec![
            Command::Move(Direction::H),
            Command::Move(Direction::J),
            Command::Move(Direction::H),
        ]);
        assert_eq!(arbiter.submit(&burst).unwrap(), Submission::Written(3));
        assert_eq!(arbiter.channel().writes, 1);
        assert_eq!(arbiter.channel().lines, vec!["MOVE h", "MOVE j", "MOVE h"]);
    }

    #[test]
    fn file_channel_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let channel = FileChannel::new(tmp.path().join("queue.txt"));
        assert!(channel.is_empty().unwrap());
    }

    #[test]
    fn file_channel_whitespace_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("queue.txt");
        fs::write(&path, "\n  \n\t\n").unwrap();
        assert!(FileChannel::new(&path).is_empty().unwrap());
    }

    #[test]
    fn file_channel_replaces_whole_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("run").join("queue.txt");
        let mut channel = FileChannel::new(&path);

        channel
            .replace(&[Command::Move(Direction::K), Command::Wait])
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "MOVE k\nWAIT\n");

        channel.replace(&[Command::Esc]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "ESC\n");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn arbiter_never_appends_to_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("queue.txt");
        fs::write(&path, "WAIT\n").unwrap();

        let mut arbiter = QueueArbiter::new(FileChannel::new(&path));
        assert_eq!(
            arbiter.submit(&Emission::Single(Command::Attack)).unwrap(),
            Submission::Busy
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), "WAIT\n");

        fs::write(&path, "").unwrap();
        assert!(arbiter.is_idle().unwrap());
        assert_eq!(
            arbiter.submit(&Emission::Single(Command::Attack)).unwrap(),
            Submission::Written(1)
        );
        assert_eq!(
            arbiter.channel().pending().unwrap(),
            vec!["ATTACK".to_string()]
        );
    }
}
