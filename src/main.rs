use anyhow::{Context, Result, bail};
use std::env;
use std::fs;
use std::path::PathBuf;

use rune_config::SettleConfig;
use rune_settle::{PlaybackEvent, ReadyState, Runtime, RuntimeEvent, SettleEvent};

struct Args {
    input: PathBuf,
    config: Option<PathBuf>,
    drop: Vec<String>,
    duplicate: bool,
    json: bool,
    until: Option<u64>,
}

fn usage() {
    eprintln!(
        "Usage: settle <html-file> [--config <path>] [--drop <animation>]... [--duplicate] [--json] [--until <ms>]"
    );
}

fn parse_args() -> Result<Args> {
    let mut args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        usage();
        bail!("missing <html-file>");
    }

    let input = PathBuf::from(args.remove(0));
    if !input.exists() {
        bail!("input file not found: {}", input.display());
    }

    let mut parsed = Args {
        input,
        config: None,
        drop: Vec::new(),
        duplicate: false,
        json: false,
        until: None,
    };
    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let path = args.get(i + 1).context("--config expects a path")?;
                parsed.config = Some(PathBuf::from(path));
                i += 2;
            }
            "--drop" => {
                let name = args.get(i + 1).context("--drop expects an animation name")?;
                parsed.drop.push(name.clone());
                i += 2;
            }
            "--until" => {
                let ms = args.get(i + 1).context("--until expects milliseconds")?;
                parsed.until = Some(
                    ms.parse()
                        .with_context(|| format!("--until: not a number: {ms}"))?,
                );
                i += 2;
            }
            "--duplicate" => {
                parsed.duplicate = true;
                i += 1;
            }
            "--json" => {
                parsed.json = true;
                i += 1;
            }
            other => {
                usage();
                bail!("unknown argument: {other}");
            }
        }
    }
    Ok(parsed)
}

fn describe(event: &RuntimeEvent) -> String {
    match event {
        RuntimeEvent::Playback(PlaybackEvent::Scheduled {
            label,
            animation_name,
            due_ms,
            ..
        }) => format!("{label}: {animation_name} will finish at {due_ms}ms"),
        RuntimeEvent::Playback(PlaybackEvent::Ended {
            label,
            animation_name,
            ..
        }) => format!("{label}: {animation_name} finished"),
        RuntimeEvent::Playback(PlaybackEvent::Dropped {
            label,
            animation_name,
            ..
        }) => format!("{label}: {animation_name} finished-signal lost"),
        RuntimeEvent::Settle(SettleEvent::RootBound {
            label,
            participants,
            tracked,
            ..
        }) => format!("{label}: bound, {tracked}/{participants} participants animating"),
        RuntimeEvent::Settle(SettleEvent::ParticipantDone { label, via, .. }) => {
            format!("{label}: done ({via:?})")
        }
        RuntimeEvent::Settle(SettleEvent::RootFinalized {
            label, fast_path, ..
        }) => {
            if *fast_path {
                format!("{label}: finalized (nothing to wait for)")
            } else {
                format!("{label}: finalized")
            }
        }
    }
}

fn timestamp(event: &RuntimeEvent, now_ms: u64) -> u64 {
    match event {
        RuntimeEvent::Settle(event) => event.at_ms(),
        RuntimeEvent::Playback(PlaybackEvent::Ended { at_ms, .. })
        | RuntimeEvent::Playback(PlaybackEvent::Dropped { at_ms, .. }) => *at_ms,
        RuntimeEvent::Playback(PlaybackEvent::Scheduled { .. }) => now_ms,
    }
}

fn main() -> Result<()> {
    let _ = env_logger::try_init();
    let args = parse_args()?;

    let mut config = match &args.config {
        Some(path) => {
            let mut config = SettleConfig::load_from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            config.merge_with_env();
            config
        }
        None => SettleConfig::load(),
    };
    config.playback.drop_animations.extend(args.drop.iter().cloned());
    config.playback.duplicate_events |= args.duplicate;

    let html = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let mut runtime = Runtime::from_html(&html, &config);
    log::info!(
        "loaded {} ({} style rules)",
        args.input.display(),
        runtime.styles().rule_count()
    );

    let mut timeline = runtime.drain_events();
    runtime.set_ready_state(ReadyState::Interactive);
    runtime.install();
    timeline.extend(runtime.drain_events());

    match args.until {
        Some(ms) => {
            runtime.advance_to(ms)?;
        }
        None => {
            runtime.run_until_idle()?;
        }
    }
    let now_ms = runtime.now_ms();
    timeline.extend(runtime.drain_events());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&timeline)?);
    } else {
        let mut clock = 0;
        for event in &timeline {
            clock = clock.max(timestamp(event, clock));
            println!("{clock:>6}ms  {}", describe(event));
        }
    }

    let pending = runtime.coordinator().pending_roots();
    if pending.is_empty() {
        eprintln!("all roots settled by {now_ms}ms");
    } else {
        for root in &pending {
            let remaining = runtime.coordinator().remaining(*root).unwrap_or(0);
            eprintln!(
                "pending: {} ({remaining} participant(s) outstanding at {now_ms}ms)",
                runtime.document().describe(*root)
            );
        }
    }
    Ok(())
}
