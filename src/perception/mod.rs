//! Perception: raw screen text to structured signals.
//!
//! The capture side dumps the game console to a text file once per cycle.
//! This module turns one dump into a [`PerceptionSnapshot`]: health ratio,
//! transient UI prompts, and monster presence. Matching is deliberately
//! shallow (substrings and a handful of regexes); anything not recognized is
//! simply absent from the snapshot.
//!
//! ## Screen regions
//!
//! - **Status area**: `Health: cur/max` anywhere on screen.
//! - **Monster panel**: right-hand lines like `g   goblin (wandering)`.
//! - **Message log**: the bottom lines; prompts and combat messages live
//!   here, so only the recent window is scanned for them.

mod dump;

pub use dump::{DumpRead, read_dump};

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Width of the console buffer the capture side reads.
pub const DEFAULT_SCREEN_WIDTH: usize = 120;

/// Lines scanned for prompts and combat messages.
const RECENT_LINES: usize = 15;
/// Lines scanned for "is nearby" warnings.
const NEARBY_LINES: usize = 30;
/// Detail entries kept on the snapshot for reporting.
const DETAIL_LIMIT: usize = 5;

static DEFAULT_EXTRACTOR: LazyLock<Extractor> =
    LazyLock::new(|| Extractor::new(DEFAULT_SCREEN_WIDTH));

/// A monster listed in the side panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeenMonster {
    pub name: String,
    /// Lower-cased status text from the parentheses, e.g. `"asleep"`.
    pub status: String,
}

impl SeenMonster {
    pub fn is_asleep(&self) -> bool {
        self.status.contains("asleep")
    }
}

/// Signals inferred from one capture cycle. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerceptionSnapshot {
    /// `cur / max` clamped to `[0, 1]`; `None` when no health line was found.
    pub health_ratio: Option<f64>,
    pub confirm_y_prompt: bool,
    pub shop_prompt: bool,
    pub more_prompt: bool,
    pub repeat_count_prompt: bool,
    /// A "comes into view" message in the recent lines.
    pub monster_seen_edge: bool,
    pub monsters_present: bool,
    pub monster_count: u32,
    pub monster_asleep: bool,
    pub melee_contact: bool,
    pub monsters: Vec<SeenMonster>,
    pub nearby: Vec<String>,
}

impl PerceptionSnapshot {
    /// The "no signals" snapshot used for stale or unreadable dumps.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Any presence or sighting signal this tick.
    pub fn threat_signal(&self) -> bool {
        self.monsters_present || self.monster_seen_edge || self.melee_contact
    }

    /// Nothing suggests a monster is around.
    pub fn all_clear(&self) -> bool {
        !self.threat_signal()
    }
}

/// Compiled extraction patterns.
pub struct Extractor {
    health: Regex,
    panel: Regex,
    nearby: Regex,
    melee: Vec<Regex>,
    repeat_count: Regex,
    screen_width: usize,
}

impl Extractor {
    pub fn new(screen_width: usize) -> Self {
        Self {
            health: Regex::new(r"Health:\s*(-?\d+)/(\d+)").unwrap(),
            // "S   ball python (constriction, asleep)" at the start of a line,
            // or after the map with a wide gap; message text has narrower ones.
            panel: Regex::new(
                r"(?:^\s*|\s{3,})[A-Za-z]\s{2,}([A-Za-z][A-Za-z '\-]*[A-Za-z])\s*\(([^)]*)\)\s*$",
            )
            .unwrap(),
            nearby: Regex::new(r"(?i)(?:^|[^a-z])an?\s+(.+?)\s+is nearby!").unwrap(),
            melee: vec![
                Regex::new(
                    r"(?i)\b(?:hits|bites|claws|stings|kicks|punches|slashes|strikes|gores|butts|headbutts|constricts|engulfs|misses)\s+you\b",
                )
                .unwrap(),
                Regex::new(r"(?i)\byou\s+(?:hit|miss|slash|stab|bite|punch|kick|smite|bash)\s+the\b")
                    .unwrap(),
            ],
            repeat_count: Regex::new(
                r"(?i)(?:number of times to repeat|repeat count|\bcount:\s*\d*\s*$)",
            )
            .unwrap(),
            screen_width,
        }
    }

    /// Build a snapshot from one raw screen dump.
    pub fn extract(&self, raw: &str) -> PerceptionSnapshot {
        let lines = screen_lines(raw, self.screen_width);
        let recent: Vec<String> = tail(&lines, RECENT_LINES)
            .iter()
            .map(|l| l.to_lowercase())
            .collect();
        let recent_blob = recent.join("\n");

        let health_ratio = self.health_ratio(raw);

        let confirm_y_prompt = recent_blob.contains("(y/n)")
            || recent_blob.contains("[y/n]")
            || (recent_blob.contains("pick up") && recent_blob.contains("y/n"));
        let shop_prompt = recent_blob.contains("welcome to") && recent_blob.contains("shop");
        let more_prompt = recent_blob.contains("--more--");
        let repeat_count_prompt = recent.iter().any(|l| self.repeat_count.is_match(l.trim_end()));
        let monster_seen_edge = recent_blob.contains("comes into view");

        let nearby: Vec<String> = tail(&lines, NEARBY_LINES)
            .iter()
            .filter_map(|l| self.nearby.captures(l))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
            .collect();

        let monsters: Vec<SeenMonster> = lines
            .iter()
            .filter_map(|l| self.panel.captures(l.trim_end()))
            .filter_map(|caps| {
                let name = caps.get(1)?.as_str().trim().to_string();
                let status = caps.get(2)?.as_str().trim().to_lowercase();
                Some(SeenMonster { name, status })
            })
            .collect();

        let melee_contact = recent
            .iter()
            .any(|l| self.melee.iter().any(|re| re.is_match(l)));

        let monster_count = if !monsters.is_empty() {
            monsters.len() as u32
        } else if !nearby.is_empty() {
            nearby.len() as u32
        } else if melee_contact {
            1
        } else {
            0
        };
        let monster_asleep = !monsters.is_empty() && monsters.iter().all(SeenMonster::is_asleep);

        PerceptionSnapshot {
            health_ratio,
            confirm_y_prompt,
            shop_prompt,
            more_prompt,
            repeat_count_prompt,
            monster_seen_edge,
            monsters_present: monster_count > 0,
            monster_count,
            monster_asleep,
            melee_contact,
            monsters: monsters.into_iter().take(DETAIL_LIMIT).collect(),
            nearby: nearby.into_iter().take(DETAIL_LIMIT).collect(),
        }
    }

    fn health_ratio(&self, raw: &str) -> Option<f64> {
        let caps = self.health.captures(raw)?;
        let cur: i64 = caps.get(1)?.as_str().parse().ok()?;
        let max: i64 = caps.get(2)?.as_str().parse().ok()?;
        Some(compute_ratio(cur, max))
    }
}

/// Extract with the default screen width.
pub fn extract(raw: &str) -> PerceptionSnapshot {
    DEFAULT_EXTRACTOR.extract(raw)
}

/// `cur / max` clamped to `[0, 1]`; a non-positive max reads as empty.
pub fn compute_ratio(cur: i64, max: i64) -> f64 {
    if max <= 0 {
        return 0.0;
    }
    (cur as f64 / max as f64).clamp(0.0, 1.0)
}

/// Split a dump into screen rows.
///
/// Console buffers read cell-by-cell come back as one flat run with no
/// newlines; those are cut into rows of `width` characters.
pub fn screen_lines(raw: &str, width: usize) -> Vec<String> {
    if raw.contains('\n') || width == 0 {
        return raw.lines().map(|l| l.trim_end_matches('\r').to_string()).collect();
    }

    let chars: Vec<char> = raw.chars().collect();
    chars
        .chunks(width)
        .map(|row| row.iter().collect::<String>())
        .collect()
}

fn tail(lines: &[String], n: usize) -> &[String] {
    &lines[lines.len().saturating_sub(n)..]
}
