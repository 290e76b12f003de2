use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use repflow_core::storage::Database;
use repflow_core::{
    Config, Event, MediaCoordinator, NullBackend, Phase, PlaybackSession, RestContext, Schedule,
    StepId,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Args)]
pub struct PlayArgs {
    /// Stored schedule id
    #[arg(long, conflicts_with_all = ["file", "sample"])]
    schedule: Option<String>,
    /// Schedule file (JSON, or TOML with a .toml extension)
    #[arg(long, conflicts_with = "sample")]
    file: Option<PathBuf>,
    /// Play the built-in sample circuit (the default)
    #[arg(long)]
    sample: bool,
    /// Rest seconds between repeats and steps; <= 0 disables rests
    #[arg(long, allow_hyphen_values = true)]
    rest: Option<i64>,
    /// Repeat count for one step, as STEP=N. May be given more than once.
    #[arg(long = "repeat", value_name = "STEP=N", value_parser = parse_repeat)]
    repeats: Vec<(String, i64)>,
    /// Use each step's authored sprint count as its repeat count
    #[arg(long)]
    sprint_hints: bool,
    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

fn parse_repeat(s: &str) -> Result<(String, i64), String> {
    let (step, count) = s
        .split_once('=')
        .ok_or_else(|| format!("expected STEP=N, got '{s}'"))?;
    let count = count
        .trim()
        .parse()
        .map_err(|_| format!("invalid repeat count '{count}'"))?;
    Ok((step.trim().to_string(), count))
}

/// A line typed while a session plays.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    TogglePause,
    Skip,
    ToggleMute,
    ExtendRest(u64),
    Repeat(StepId, i64),
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        if let Some(secs) = line.strip_prefix('+') {
            let secs = secs
                .trim()
                .parse()
                .map_err(|_| format!("invalid rest extension '{line}'"))?;
            return Ok(Some(Self::ExtendRest(secs)));
        }

        let mut parts = line.split_whitespace();
        let command = match parts.next() {
            Some("p") => Self::TogglePause,
            Some("s") => Self::Skip,
            Some("m") => Self::ToggleMute,
            Some("q") => Self::Quit,
            Some("r") => {
                let (Some(step), Some(count), None) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err("usage: r STEP N".into());
                };
                let count = count
                    .parse()
                    .map_err(|_| format!("invalid repeat count '{count}'"))?;
                Self::Repeat(StepId::new(step), count)
            }
            _ => return Err(format!("unknown command '{line}' (p, s, m, +N, r STEP N, q)")),
        };
        Ok(Some(command))
    }
}

pub fn run(args: PlayArgs, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let schedule = resolve_schedule(&args, &db)?;
    let rest = match args.rest {
        Some(secs) => secs,
        None => db
            .default_rest_secs()?
            .unwrap_or(config.playback.default_rest_secs),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(drive(Arc::new(schedule), rest, &args, config));
    // The stdin reader may still be parked in a blocking read.
    runtime.shutdown_background();
    result
}

fn resolve_schedule(args: &PlayArgs, db: &Database) -> Result<Schedule, Box<dyn std::error::Error>> {
    if let Some(id) = &args.schedule {
        return db
            .get_schedule(id)?
            .ok_or_else(|| format!("schedule not found: {id}").into());
    }
    if let Some(path) = &args.file {
        return super::read_schedule_file(path);
    }
    Ok(Schedule::sample())
}

async fn drive(
    schedule: Arc<Schedule>,
    rest: i64,
    args: &PlayArgs,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = PlaybackSession::new(config.playback.tick_interval());
    let mut events = session.events();

    let cancel = CancellationToken::new();
    let media_task = config.media.enabled.then(|| {
        let coordinator = MediaCoordinator::new(Arc::new(NullBackend::new()));
        tokio::spawn(coordinator.run(session.subscribe(), cancel.clone()))
    });

    session.initialize(schedule.clone(), rest);
    if args.sprint_hints {
        session.apply_sprint_hints();
    }
    for (step, count) in &args.repeats {
        session.set_repeat_count(&StepId::new(step.as_str()), *count);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let done = matches!(event, Event::SessionCompleted { .. });
                    if config.playback.countdown_cues || !matches!(event, Event::CountdownCue { .. }) {
                        print_event(&event, &schedule, args.json)?;
                    }
                    if done {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event output fell behind"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match Command::parse(&line) {
                    Ok(Some(Command::Quit)) => {
                        info!("playback stopped by user");
                        break;
                    }
                    Ok(Some(command)) => apply(&mut session, command),
                    Ok(None) => {}
                    Err(message) => eprintln!("{message}"),
                },
                None => stdin_open = false,
            },
        }
    }

    session.shutdown();
    cancel.cancel();
    if let Some(task) = media_task {
        task.await?;
    }
    Ok(())
}

fn apply(session: &mut PlaybackSession, command: Command) {
    match command {
        Command::TogglePause => {
            session.toggle_pause();
        }
        Command::Skip => {
            session.skip();
        }
        Command::ToggleMute => {
            let muted = session.snapshot().state.is_muted;
            session.set_muted(!muted);
        }
        Command::ExtendRest(secs) => {
            session.extend_rest(secs);
        }
        Command::Repeat(step, count) => {
            session.set_repeat_count(&step, count);
        }
        Command::Quit => {}
    }
}

/// Render an event from its own fields, never from the live session, so a
/// line always describes the state the event was emitted for.
fn print_event(event: &Event, schedule: &Schedule, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event {
        Event::SessionStarted { step_count, .. } => {
            println!("▶ {} ({step_count} steps)", schedule.title);
            if let Some(first) = schedule.steps.first() {
                println!(
                    "{}",
                    describe(Phase::Step, 0, 1, first.effective_duration_secs(), schedule)
                );
            }
        }
        Event::PhaseChanged {
            skipped,
            to,
            step_index,
            repeat_index,
            remaining_secs,
            ..
        } if !to.is_complete() => {
            let marker = if *skipped { " (skipped)" } else { "" };
            let line = describe(*to, *step_index, *repeat_index, *remaining_secs, schedule);
            println!("{line}{marker}");
        }
        Event::PhaseChanged { .. } => {}
        Event::SessionCompleted { .. } => println!("✔ complete"),
        Event::Paused { remaining_secs, .. } => println!("⏸ paused ({remaining_secs}s left)"),
        Event::Resumed { remaining_secs, .. } => println!("▶ resumed ({remaining_secs}s left)"),
        Event::MuteChanged { muted, .. } => {
            println!("{}", if *muted { "muted" } else { "unmuted" })
        }
        Event::RestExtended {
            added_secs,
            remaining_secs,
            ..
        } => println!("rest +{added_secs}s ({remaining_secs}s left)"),
        Event::RepeatCountChanged { step_id, count, .. } => {
            println!("{step_id}: {count} repeats");
        }
        Event::CountdownCue { remaining_secs, .. } => println!("  {remaining_secs}…"),
    }
    Ok(())
}

fn describe(
    phase: Phase,
    step_index: usize,
    repeat_index: u32,
    remaining_secs: u64,
    schedule: &Schedule,
) -> String {
    let total = schedule.steps.len();
    match phase {
        Phase::Step => {
            let step = schedule.steps.get(step_index);
            let name = step.map_or("?", |s| s.name.as_str());
            let mut line = format!(
                "[{}/{total}] {name} rep {repeat_index} {remaining_secs}s",
                step_index + 1
            );
            if let Some(media) = step.and_then(|s| s.media.as_ref()) {
                line.push_str(&format!(" ({:?} {})", media.kind, media.url));
            }
            line
        }
        Phase::Rest(RestContext::BetweenRepeats) => {
            format!("  rest {remaining_secs}s, then repeat {}", repeat_index + 1)
        }
        Phase::Rest(RestContext::BetweenSteps) => {
            let next = schedule
                .steps
                .get(step_index + 1)
                .map_or("finish", |s| s.name.as_str());
            format!("  rest {remaining_secs}s, next: {next}")
        }
        Phase::Complete => "complete".into(),
    }
}
