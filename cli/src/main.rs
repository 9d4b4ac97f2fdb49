//! ctxi CLI: driving adapter for the ctxi context injection engine.
//!
//! Subcommands:
//! - `check <config>`: validate and compile a config
//! - `detect <config> <text> [--caller id]`: print ranked matches as JSON
//! - `inject <config> <text> [--caller id] [--content-dir dir] [--payload file] [--dry-run]`
//! - `watch <config> [--content-dir dir]`: inject each stdin line, reloading on config change
//!
//! Logs go to stderr, filtered by `RUST_LOG` (default `warn`).

mod reader;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ctxi::{
    compile, ConfigSource, ConfigWatcher, FileConfigSource, Injector, InjectorConfig,
    SchemaValidator,
};
use serde_json::Value;
use tracing::info;

use crate::reader::FsContentReader;

// ═══════════════════════════════════════════════════════════════════════════════
// Arguments
// ═══════════════════════════════════════════════════════════════════════════════

/// Detect intent in prompts and inject matching reference content.
#[derive(Parser, Debug)]
#[command(name = "ctxi", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a config and report its rules.
    Check {
        /// Config file (.json, otherwise YAML).
        config: PathBuf,
    },
    /// Print the rules that fire for TEXT, ranked.
    Detect {
        config: PathBuf,
        text: String,
        #[arg(long, default_value = "cli")]
        caller: String,
    },
    /// Inject context for TEXT and print the resulting payload.
    Inject {
        config: PathBuf,
        text: String,
        #[command(flatten)]
        opts: InjectOpts,
        /// JSON payload file to inject into instead of TEXT itself.
        #[arg(long)]
        payload: Option<PathBuf>,
        /// Print a metrics snapshot to stderr afterwards.
        #[arg(long)]
        metrics: bool,
    },
    /// Inject each line read from stdin, reloading when the config changes.
    Watch {
        config: PathBuf,
        #[command(flatten)]
        opts: InjectOpts,
    },
}

#[derive(Args, Debug)]
struct InjectOpts {
    #[arg(long, default_value = "cli")]
    caller: String,
    /// Directory that context references are resolved against.
    #[arg(long, env = "CTXI_CONTENT_DIR", default_value = ".")]
    content_dir: PathBuf,
    /// Detect and notify without modifying the payload.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Check { config } => cmd_check(&config),
        Command::Detect {
            config,
            text,
            caller,
        } => cmd_detect(&config, &text, &caller),
        Command::Inject {
            config,
            text,
            opts,
            payload,
            metrics,
        } => cmd_inject(&config, &text, &opts, payload.as_deref(), metrics),
        Command::Watch { config, opts } => cmd_watch(&config, &opts),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_check(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let rules = compile(&config).context("config invalid")?;

    println!("Config valid: {} rule(s)", rules.len());
    for rule in rules.rules() {
        println!(
            "  {} (priority {}, threshold {}, {} regex)",
            rule.name(),
            rule.priority(),
            rule.confidence_threshold(),
            rule.pattern_count()
        );
    }
    Ok(())
}

fn cmd_detect(path: &Path, text: &str, caller: &str) -> Result<()> {
    let injector = build_injector(load_config(path)?, Path::new("."))?;
    let matches = injector.detect(text, caller);
    println!("{}", serde_json::to_string_pretty(&matches)?);
    Ok(())
}

fn cmd_inject(
    path: &Path,
    text: &str,
    opts: &InjectOpts,
    payload: Option<&Path>,
    show_metrics: bool,
) -> Result<()> {
    let mut config = load_config(path)?;
    config.feature_flags.dry_run_mode |= opts.dry_run;
    let injector = build_injector(config, &opts.content_dir)?;

    let notifications = match payload {
        Some(file) => {
            let raw = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read payload \"{}\"", file.display()))?;
            let value: Value = serde_json::from_str(&raw)
                .with_context(|| format!("payload \"{}\" is not JSON", file.display()))?;
            let out = injector.inject(text, &opts.caller, value);
            println!("{}", serde_json::to_string_pretty(&out.payload)?);
            out.notifications
        }
        None => {
            let out = injector.inject(text, &opts.caller, text.to_string());
            println!("{}", out.payload);
            out.notifications
        }
    };

    for note in &notifications {
        eprintln!("note: {note}");
    }
    if show_metrics {
        eprintln!("{}", serde_json::to_string_pretty(&injector.metrics())?);
    }
    Ok(())
}

fn cmd_watch(path: &Path, opts: &InjectOpts) -> Result<()> {
    // Fail fast on a bad config instead of serving the disabled default.
    let config = load_config(path)?;
    compile(&config).context("config invalid")?;

    let injector = Arc::new(
        Injector::builder(FsContentReader::new(&opts.content_dir))
            .source(FileConfigSource::new(path))
            .build()?,
    );
    let _watcher = ConfigWatcher::spawn(path, Arc::clone(&injector))?;
    info!(config = %path.display(), "reading prompts from stdin");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let result = injector.inject(&line, &opts.caller, line.clone());
        for note in &result.notifications {
            eprintln!("note: {note}");
        }
        writeln!(out, "{}", result.payload)?;
        out.flush()?;
    }

    eprintln!("{}", serde_json::to_string_pretty(&injector.metrics())?);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Config loading
// ═══════════════════════════════════════════════════════════════════════════════

fn load_config(path: &Path) -> Result<InjectorConfig> {
    let raw = FileConfigSource::new(path).load()?;
    let config = InjectorConfig::from_value(raw, &SchemaValidator)
        .with_context(|| format!("config \"{}\" rejected", path.display()))?;
    Ok(config)
}

fn build_injector(config: InjectorConfig, content_dir: &Path) -> Result<Injector> {
    compile(&config).context("config invalid")?;
    Ok(Injector::new(config, FsContentReader::new(content_dir))?)
}
