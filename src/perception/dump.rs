//! Reading the capture mailbox.
//!
//! The capture loop overwrites the dump file roughly once a second. A dump
//! that has not been touched for `stale_after` means the capture side is
//! stuck or gone; its contents describe the past and must not drive actions.

use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Outcome of one dump read.
#[derive(Debug)]
pub enum DumpRead {
    /// Current screen text.
    Fresh(String),
    /// No dump file yet.
    Missing,
    /// The file exists but has not been rewritten recently.
    Stale { age: Duration },
    /// The file could not be read.
    Unreadable(std::io::Error),
}

impl DumpRead {
    pub fn into_text(self) -> Option<String> {
        match self {
            DumpRead::Fresh(text) => Some(text),
            _ => None,
        }
    }

    /// Short label for logs and the journal.
    pub fn describe(&self) -> String {
        match self {
            DumpRead::Fresh(_) => "fresh".to_string(),
            DumpRead::Missing => "dump missing".to_string(),
            DumpRead::Stale { age } => format!("dump stale ({}ms old)", age.as_millis()),
            DumpRead::Unreadable(e) => format!("dump unreadable: {e}"),
        }
    }
}

/// Read the dump at `path`, classifying it against `now`.
///
/// Invalid UTF-8 is replaced rather than rejected; console buffers routinely
/// contain stray bytes.
pub fn read_dump(path: &Path, stale_after: Duration, now: SystemTime) -> DumpRead {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return DumpRead::Missing,
        Err(e) => return DumpRead::Unreadable(e),
    };

    if let Ok(modified) = metadata.modified() {
        // A clock step backwards reads as age zero.
        let age = now.duration_since(modified).unwrap_or_default();
        if age > stale_after {
            return DumpRead::Stale { age };
        }
    }

    match std::fs::read(path) {
        Ok(bytes) => DumpRead::Fresh(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == ErrorKind::NotFound => DumpRead::Missing,
        Err(e) => DumpRead::Unreadable(e),
    }
}
