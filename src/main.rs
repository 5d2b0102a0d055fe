//! VocalLab CLI
//!
//! Usage:
//!   vocallab --serve                         # HTTP + WebSocket server (default)
//!   vocallab --check                         # Validate the catalog and audio files
//!   vocallab --replay frames.jsonl           # Feed recorded frames through a session
//!   vocallab --replay - --json < frames.jsonl

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use serde::Deserialize;
use tracing::{info, warn};

use vocallab::core::{all_lab_labels, load_catalog, map_detections, run_server, Session};
use vocallab::types::{Catalog, Detection, FrameResult, TextKind};
use vocallab::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "vocallab",
    version = VERSION,
    about = "VocalLab - step guidance for camera-assisted lab experiments",
    long_about = "VocalLab walks a student through a fixed sequence of lab steps.\n\n\
                  Each frame's detected objects decide whether the current step\n\
                  is complete, and dangerous object pairs raise safety alerts.\n\n\
                  Modes:\n  \
                  --serve   HTTP + WebSocket server (default)\n  \
                  --check   Validate catalog, audio files and label coverage\n  \
                  --replay  Run recorded frames (JSON lines) through a session\n\n\
                  Step states:\n  \
                  ACTIVE      - Waiting for the step's objects to be stable\n  \
                  TRANSITION  - Step done, waiting for its objects to be cleared\n  \
                  COMPLETED   - All steps done"
)]
struct Args {
    /// Experiment catalog (JSON)
    #[arg(short, long, env = "VOCALLAB_CONFIG", default_value = "config/experiment.json")]
    config: PathBuf,

    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address
    #[arg(long, env = "VOCALLAB_ADDR", default_value = "0.0.0.0:8000")]
    addr: String,

    /// Directory with per-language audio cues ({dir}/{lang}/{cue}.mp3)
    #[arg(long, env = "VOCALLAB_AUDIO_DIR", default_value = "audio")]
    audio_dir: PathBuf,

    /// Validate the catalog and exit
    #[arg(long)]
    check: bool,

    /// Replay frames from a JSON-lines file ("-" for stdin)
    #[arg(short, long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Simulated time between replayed frames
    #[arg(long, default_value_t = 500)]
    frame_interval_ms: u64,

    /// Language for replay output
    #[arg(short, long, default_value = "en")]
    language: String,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

/// One replayed frame: a bare detection list or a full frame object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayFrame {
    Bare(Vec<Detection>),
    Full {
        #[serde(default)]
        detections: Vec<Detection>,
        #[serde(default)]
        language: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug);
    if args.no_color {
        colored::control::set_override(false);
    }

    let catalog = load_catalog(&args.config)
        .with_context(|| format!("cannot start from catalog {}", args.config.display()))?;
    let catalog = Arc::new(catalog);

    // --serve wins over the offline modes
    if !args.serve {
        if args.check {
            run_check(&catalog, &args.audio_dir);
            return Ok(());
        }
        if let Some(path) = args.replay.as_deref() {
            return run_replay(catalog, path, &args).await;
        }
    }
    run_serve(catalog, &args).await
}

fn init_logging(debug: bool) {
    use tracing_subscriber::prelude::*;

    let default_directive = if debug {
        "vocallab=debug,tower_http=debug,info"
    } else {
        "vocallab=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

/// Run HTTP API server
async fn run_serve(catalog: Arc<Catalog>, args: &Args) -> anyhow::Result<()> {
    println!();
    println!("{}", "╔═══════════════════════════════════════════════════════════╗".cyan());
    println!("{}", format!("║  🧪 VocalLab - lab step guidance          v{:<16}║", VERSION).cyan());
    println!("{}", "╚═══════════════════════════════════════════════════════════╝".cyan());
    println!();
    info!(
        experiment = %catalog.name,
        steps = catalog.total_steps(),
        languages = ?catalog.languages,
        "starting server"
    );

    run_server(&args.addr, catalog, Some(args.audio_dir.clone()))
        .await
        .map_err(|e| anyhow::anyhow!("server error: {}", e))
}

/// Validate catalog, audio coverage and label vocabulary
fn run_check(catalog: &Catalog, audio_dir: &Path) {
    println!("{} {}", "Catalog OK:".green().bold(), catalog.name);
    println!("  fingerprint: {}", catalog.fingerprint);
    println!("  languages:   {} (default {})", catalog.languages.join(", "), catalog.default_language);
    println!(
        "  safety:      {} pairs, {:.0}px, {:.1}s cooldown",
        catalog.safety_rules.dangerous_pairs.len(),
        catalog.safety_rules.proximity_threshold,
        catalog.safety_rules.alert_cooldown_seconds
    );
    println!();

    let vocabulary = all_lab_labels();
    let mut warnings = 0usize;

    for step in &catalog.steps {
        println!("  [{}] {} needs {:?}", step.id, step.name.bold(), step.required_objects);

        for lang in &catalog.languages {
            for (kind, texts) in [(TextKind::Hint, &step.hint), (TextKind::Transition, &step.transition)] {
                if texts.get(lang).map_or(true, |t| t.trim().is_empty()) {
                    println!("      {} no {} text for {:?}, falls back", "⚠".yellow(), kind, lang);
                    warnings += 1;
                }
            }
        }

        for obj in &step.required_objects {
            if !vocabulary.iter().any(|l| *l == obj.as_str()) {
                println!("      {} {:?} is not produced by the label map", "⚠".yellow(), obj);
                warnings += 1;
            }
        }

        if audio_dir.is_dir() {
            for lang in &catalog.languages {
                for cue in [&step.audio_intro, &step.audio_transition, &step.audio_complete] {
                    let file = audio_dir.join(lang).join(format!("{}.mp3", cue));
                    if !file.is_file() {
                        println!("      {} missing audio {}", "⚠".yellow(), file.display());
                        warnings += 1;
                    }
                }
            }
        }
    }

    if !audio_dir.is_dir() {
        println!();
        println!("  {} audio directory {} not found", "⚠".yellow(), audio_dir.display());
        warnings += 1;
    }

    println!();
    if warnings == 0 {
        println!("{}", "No warnings.".green());
    } else {
        println!("{}", format!("{} warning(s).", warnings).yellow());
    }
}

/// Feed recorded frames through a fresh session
async fn run_replay(catalog: Arc<Catalog>, path: &Path, args: &Args) -> anyhow::Result<()> {
    let reader: Box<dyn BufRead> = if path == Path::new("-") {
        Box::new(io::BufReader::new(io::stdin()))
    } else {
        let file = std::fs::File::open(path)
            .with_context(|| format!("cannot open replay file {}", path.display()))?;
        Box::new(io::BufReader::new(file))
    };

    let interval = Duration::from_millis(args.frame_interval_ms);
    let start = Instant::now();
    let session = Session::new_at(catalog, start);
    let mut frame_no: u32 = 0;
    let mut now = start;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.context("cannot read replay input")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (mut detections, language) = match serde_json::from_str::<ReplayFrame>(line) {
            Ok(ReplayFrame::Bare(d)) => (d, None),
            Ok(ReplayFrame::Full { detections, language }) => (detections, language),
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "skipping malformed frame");
                continue;
            }
        };
        map_detections(&mut detections);

        let language = language.unwrap_or_else(|| args.language.clone());
        now = replay_clock(start, interval, frame_no).with_context(|| {
            format!(
                "replay clock overflow at frame {} ({} ms per frame)",
                frame_no + 1,
                args.frame_interval_ms
            )
        })?;
        frame_no += 1;
        let result = session.process_at(&detections, &language, now).await;

        if args.json {
            println!("{}", serde_json::to_string(&result)?);
        } else {
            print_result(frame_no, &result, args.no_color);
        }
    }

    let stats = session.stats_at(now).await;
    if !args.json {
        println!();
        println!(
            "Replay finished: {} frames, {} advances, {} alerts, step {}/{}{}",
            stats.frames_processed,
            stats.step_advances,
            stats.safety_alerts,
            stats.current_step,
            stats.total_steps,
            if stats.completed { " (complete)" } else { "" }
        );
    }
    Ok(())
}

/// Simulated time of frame `frame_no`, `None` once it no longer fits an `Instant`
fn replay_clock(start: Instant, interval: Duration, frame_no: u32) -> Option<Instant> {
    interval
        .checked_mul(frame_no)
        .and_then(|offset| start.checked_add(offset))
}

fn print_result(frame_no: u32, result: &FrameResult, no_color: bool) {
    let line = if no_color {
        result.to_parseable_string()
    } else {
        result.to_terminal_string()
    };
    println!("#{:<4} {}", frame_no, line);

    if let Some(alert) = &result.safety_alert {
        println!("      {}", format!("⚠ SAFETY: {}", alert.message).red().bold());
    }
    if result.step_advance {
        let msg = if result.experiment_complete {
            "  🎉 Experiment complete!".to_string()
        } else {
            format!("  ✓ Next: {}", result.step_info.step_name)
        };
        println!("      {}", msg.green());
    } else if result.step_info.step_status == vocallab::types::StepStatus::Transition
        && result.audio_to_play.is_some()
    {
        println!("      {}", format!("  ➜ {}", result.step_info.hint).cyan());
    }
}
