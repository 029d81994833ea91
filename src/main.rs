mod cli;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use cli::{Cli, Command};
use crawlbot::config::ProjectConfig;
use crawlbot::paths::RunPaths;
use crawlbot::perception::Extractor;
use crawlbot::runner::{self, RunResult, RunnerConfig};

fn config_source_label(config_path: Option<&Path>) -> String {
    config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults, no .crawlbot/config.toml found)".to_string())
}

fn push_kv(output: &mut String, key: &str, value: impl std::fmt::Display) {
    output.push_str(&format!("  {key:<24} {value}\n"));
}

fn render_config_human(
    config: &ProjectConfig,
    config_path: Option<&Path>,
    paths: &RunPaths,
) -> Result<String> {
    let engine = config.engine_config()?;
    let mut output = String::new();

    output.push_str("Paths\n");
    push_kv(&mut output, "run_dir", paths.run_dir.display());
    push_kv(&mut output, "dump", paths.dump.display());
    push_kv(&mut output, "queue", paths.queue.display());
    push_kv(&mut output, "journal", paths.journal.display());
    output.push('\n');

    output.push_str("Perception\n");
    push_kv(&mut output, "screen_width", config.perception.screen_width);
    push_kv(
        &mut output,
        "stale_after",
        format!("{}ms", config.perception.stale_after_millis),
    );
    output.push('\n');

    output.push_str("Health\n");
    push_kv(&mut output, "profile", &config.health.profile);
    push_kv(&mut output, "caution_enter", engine.thresholds.caution_enter);
    push_kv(&mut output, "caution_exit", engine.thresholds.caution_exit);
    push_kv(&mut output, "panic_enter", engine.thresholds.panic_enter);
    push_kv(&mut output, "panic_exit", engine.thresholds.panic_exit);
    output.push('\n');

    let b = &config.behavior;
    output.push_str("Behavior\n");
    push_kv(
        &mut output,
        "autoexplore_cooldown",
        format!("{}ms", b.autoexplore_cooldown_millis),
    );
    push_kv(&mut output, "alert_hold", format!("{}ms", b.alert_hold_millis));
    push_kv(&mut output, "alert_extend", format!("{}ms", b.alert_extend_millis));
    push_kv(&mut output, "max_alert_extensions", b.max_alert_extensions);
    push_kv(&mut output, "retreat_hold", format!("{}ms", b.retreat_hold_millis));
    push_kv(
        &mut output,
        "retreat_extend",
        format!("{}ms", b.retreat_extend_millis),
    );
    push_kv(
        &mut output,
        "attack_cooldown",
        format!("{}ms", b.attack_cooldown_millis),
    );
    push_kv(&mut output, "fight_recheck", format!("{}ms", b.fight_recheck_millis));
    push_kv(&mut output, "absence_confirm_ticks", b.absence_confirm_ticks);
    push_kv(&mut output, "panic_burst_len", b.panic_burst_len);
    output.push('\n');

    output.push_str("Runner\n");
    push_kv(
        &mut output,
        "tick_interval",
        format!("{}ms", config.runner.tick_interval_millis),
    );
    push_kv(&mut output, "journal", config.runner.journal);
    output.push('\n');

    output.push_str("Source Path\n");
    push_kv(&mut output, "config", config_source_label(config_path));

    Ok(output)
}

fn render_config_json(
    config: &ProjectConfig,
    config_path: Option<&Path>,
    paths: &RunPaths,
) -> Result<String> {
    let engine = config.engine_config()?;
    let b = &config.behavior;
    let payload = serde_json::json!({
        "paths": {
            "run_dir": paths.run_dir.display().to_string(),
            "dump": paths.dump.display().to_string(),
            "queue": paths.queue.display().to_string(),
            "journal": paths.journal.display().to_string()
        },
        "perception": {
            "screen_width": config.perception.screen_width,
            "stale_after_millis": config.perception.stale_after_millis
        },
        "health": {
            "profile": &config.health.profile,
            "thresholds": engine.thresholds
        },
        "behavior": {
            "autoexplore_cooldown_millis": b.autoexplore_cooldown_millis,
            "alert_hold_millis": b.alert_hold_millis,
            "alert_extend_millis": b.alert_extend_millis,
            "max_alert_extensions": b.max_alert_extensions,
            "retreat_hold_millis": b.retreat_hold_millis,
            "retreat_extend_millis": b.retreat_extend_millis,
            "attack_cooldown_millis": b.attack_cooldown_millis,
            "fight_recheck_millis": b.fight_recheck_millis,
            "absence_confirm_ticks": b.absence_confirm_ticks,
            "panic_burst_len": b.panic_burst_len
        },
        "runner": {
            "tick_interval_millis": config.runner.tick_interval_millis,
            "journal": config.runner.journal
        },
        "source_path": config_source_label(config_path)
    });
    serde_json::to_string_pretty(&payload).context("failed to serialize config")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let quiet_command = matches!(
        &cli.command,
        Command::Config { .. } | Command::Extract { .. }
    );

    let filter = match cli.verbose {
        0 if quiet_command => "crawlbot=warn",
        0 => "crawlbot=info",
        1 => "crawlbot=debug",
        _ => "crawlbot=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cwd = std::env::current_dir().context("failed to get current directory (was it deleted?)")?;
    let (config, config_path) = ProjectConfig::load(&cwd)?;

    if !quiet_command || cli.verbose > 0 {
        match config_path {
            Some(ref p) => info!("loaded config from {}", p.display()),
            None => info!("no .crawlbot/config.toml found, using defaults"),
        }
    }

    let paths = RunPaths::resolve(&cwd, &config.paths);

    match cli.command {
        Command::Run {
            max_ticks,
            dump,
            queue,
            no_journal,
        } => {
            let engine = config.engine_config()?;
            let journal_path =
                (config.runner.journal && !no_journal).then(|| paths.journal.clone());
            let runner_config = RunnerConfig {
                dump_path: dump.unwrap_or_else(|| paths.dump.clone()),
                queue_path: queue.unwrap_or_else(|| paths.queue.clone()),
                journal_path,
                engine,
                profile: config.health.profile.clone(),
                screen_width: config.perception.screen_width,
                stale_after: config.stale_after(),
                tick_interval: config.tick_interval(),
                max_ticks,
            };

            println!(
                "\x1b[36m[crawlbot]\x1b[0m watching {} → {}",
                runner_config.dump_path.display(),
                runner_config.queue_path.display()
            );

            let stop = Arc::new(AtomicBool::new(false));
            let stop_clone = stop.clone();
            ctrlc::set_handler(move || {
                stop_clone.store(true, Ordering::Relaxed);
            })
            .ok(); // best-effort, may fail if a handler is already set

            let (result, stats) = runner::run(runner_config, stop)?;
            let how = match result {
                RunResult::Stopped => "stopped",
                RunResult::TickLimit => "tick limit reached",
            };
            println!(
                "\x1b[36m[crawlbot]\x1b[0m {how}: {} ticks, {} skipped, {} commands queued",
                stats.ticks, stats.skipped, stats.commands
            );
        }
        Command::Extract { file, width } => {
            let raw = std::fs::read(&file)
                .with_context(|| format!("failed to read dump {}", file.display()))?;
            let text = String::from_utf8_lossy(&raw);
            let extractor =
                Extractor::new(width.unwrap_or(config.perception.screen_width));
            let snapshot = extractor.extract(&text);
            println!(
                "{}",
                serde_json::to_string_pretty(&snapshot).context("failed to serialize snapshot")?
            );
        }
        Command::Config { json } => {
            if json {
                println!(
                    "{}",
                    render_config_json(&config, config_path.as_deref(), &paths)?
                );
            } else {
                print!(
                    "{}",
                    render_config_human(&config, config_path.as_deref(), &paths)?
                );
            }
        }
    }

    Ok(())
}
