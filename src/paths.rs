use std::path::{Path, PathBuf};

use crate::config::PathsConfig;

/// Resolve the run directory holding the dump, queue and journal files.
///
/// An explicit `configured` directory wins (relative paths are taken from
/// `base`). Otherwise prefers `.crawlbot/run/` if it exists, then the legacy
/// `run_logs/`. When neither exists, returns `.crawlbot/run/` so new setups
/// get the consolidated layout.
pub fn resolve_run_dir(base: &Path, configured: Option<&Path>) -> PathBuf {
    if let Some(dir) = configured {
        return base.join(dir);
    }

    let preferred = base.join(".crawlbot").join("run");
    if preferred.is_dir() {
        preferred
    } else {
        let legacy = base.join("run_logs");
        if legacy.is_dir() { legacy } else { preferred }
    }
}

/// Concrete file locations for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub run_dir: PathBuf,
    pub dump: PathBuf,
    pub queue: PathBuf,
    pub journal: PathBuf,
}

impl RunPaths {
    pub fn resolve(base: &Path, config: &PathsConfig) -> Self {
        let run_dir = resolve_run_dir(base, config.run_dir.as_deref());
        Self {
            dump: run_dir.join(&config.dump_file),
            queue: run_dir.join(&config.queue_file),
            journal: run_dir.join(&config.journal_file),
            run_dir,
        }
    }
}
