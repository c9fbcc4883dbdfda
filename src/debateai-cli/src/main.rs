//! DebateAI Watch - follow an AI debate live
//!
//! A terminal viewer that streams a running debate from the DebateAI service
//! and narrates it with per-speaker voices.

use clap::Parser;
use colored::Colorize;
use debateai_live::{
    Config, DebateError, DebateSession, HttpDebateService, KokoroSpeech, SessionStatus, SessionView, Turn,
    VoiceDirectory, default_config,
};
use std::collections::BTreeSet;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "debateai-watch",
    version,
    about = "Watch an AI debate live and listen along",
    long_about = "Streams a debate from the DebateAI service as it is generated and narrates committed turns with text-to-speech.\n\nWhile watching, type `play [N]`, `stop`, `voices` or `quit`."
)]
struct Cli {
    /// The debate to follow
    #[arg(value_name = "DEBATE_ID")]
    debate_id: String,

    /// Debate service base URL (overrides DEBATEAI_API_BASE and the config file)
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Start narrating right away and exit once the debate is over and narration finished
    #[arg(short, long)]
    narrate: bool,

    /// Turn position to start narrating from
    #[arg(long, default_value = "0", value_name = "N")]
    from: usize,

    /// Reconnect attempts after the event stream drops
    #[arg(long, value_name = "N")]
    reconnects: Option<u32>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// A line typed while watching.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Play(usize),
    Stop,
    Voices,
    Quit,
    Help,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let command = match words.next()?.to_lowercase().as_str() {
        "play" | "p" => Command::Play(words.next().and_then(|n| n.parse().ok()).unwrap_or(0)),
        "stop" | "s" => Command::Stop,
        "voices" | "v" => Command::Voices,
        "quit" | "q" | "exit" => Command::Quit,
        _ => Command::Help,
    };
    Some(command)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config: Config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => default_config(),
    };
    if let Ok(base) = env::var("DEBATEAI_API_BASE") {
        config = config.with_base_url(base);
    }
    if let Some(server) = &cli.server {
        config = config.with_base_url(server.clone());
    }
    if let Some(reconnects) = cli.reconnects {
        config.stream.max_reconnects = reconnects;
    }

    info!(debate_id = %cli.debate_id, base_url = %config.service.base_url, "watching debate");
    println!("{}", "Loading debate...".dimmed());

    let directory = VoiceDirectory::new(&config.voices);
    let engine = Arc::new(KokoroSpeech::load_in_background(
        directory.clone(),
        config.narration.chunk_chars,
    ));
    let service = Arc::new(HttpDebateService::new(&config.service)?);

    let mut session = match DebateSession::open(&cli.debate_id, service, engine, directory.clone(), &config).await {
        Ok(session) => session,
        Err(DebateError::NotFound(id)) => {
            eprintln!("{} Debate '{}' not found.", "Error:".red().bold(), id);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    print_header(&session);
    if directory.snapshot().is_empty() {
        println!("{}", "  Loading voices (first run downloads the TTS model)...".dimmed());
    }
    println!("{}", "─".repeat(70).dimmed());

    let mut renderer = Renderer::default();
    renderer.render(&session.view());

    if cli.narrate {
        session.start_narration(cli.from).await;
    }

    let mut updates = session.subscribe();
    let mut voices = directory.subscribe();
    let mut narration = session.narration();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let mut live = !session.status().is_terminal();
    let mut voices_pending = directory.snapshot().is_empty();
    let mut stdin_open = true;
    let mut last_narrated: Option<usize> = None;

    loop {
        if watch_finished(cli.narrate, live, stdin_open, session.is_narrating()) {
            debug!(narrate = cli.narrate, stdin_open, "nothing left to watch");
            break;
        }

        tokio::select! {
            changed = updates.changed(), if live => {
                let view = updates.borrow_and_update().clone();
                renderer.render(&view);
                if changed.is_err() || view.status.is_terminal() {
                    live = false;
                    renderer.finish();
                    print_status(view.status);
                }
            }
            changed = voices.changed(), if voices_pending => {
                voices_pending = false;
                if changed.is_ok() {
                    renderer.finish();
                    println!("{}", "Voices ready.".dimmed());
                    print_voice_assignments(&session);
                }
            }
            changed = narration.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *narration.borrow_and_update();
                match state.current_index {
                    Some(index) if state.is_active && last_narrated != Some(index) => {
                        renderer.finish();
                        println!("{}", format!("🔊 narrating turn {}", index).bright_green());
                        last_narrated = Some(index);
                    }
                    _ if !state.is_active => last_narrated = None,
                    _ => {}
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match parse_command(&line) {
                        Some(Command::Play(from)) if from >= session.view().turns.len() => {
                            println!("{}", format!("No committed turn at position {}.", from).yellow());
                        }
                        Some(Command::Play(from)) => session.start_narration(from).await,
                        Some(Command::Stop) => {
                            session.stop_narration().await;
                            println!("{}", "Narration stopped.".dimmed());
                        }
                        Some(Command::Voices) => print_voice_assignments(&session),
                        Some(Command::Quit) => break,
                        Some(Command::Help) => print_help(),
                        None => {}
                    },
                    Ok(None) => {
                        debug!("stdin closed");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read stdin; commands disabled");
                        stdin_open = false;
                    }
                }
            }
        }

    }

    session.close().await;

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  Goodbye.".bright_green().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();

    Ok(())
}

/// Whether the viewer has nothing left to do. Once the debate is over, a
/// `--narrate` run ends with its narration; otherwise the viewer waits for
/// commands until stdin closes.
fn watch_finished(narrate: bool, live: bool, stdin_open: bool, narrating: bool) -> bool {
    !live && !narrating && (narrate || !stdin_open)
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "debateai_live=debug,debateai_watch=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_header(session: &DebateSession) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - {}", "DebateAI".bold(), session.title())
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Status:".bold(), status_label(session.status()));
    if let Some(created_at) = session.created_at() {
        println!("{} {}", "Started:".bold(), created_at.dimmed());
    }
    println!();
    print_voice_assignments(session);
}

fn print_voice_assignments(session: &DebateSession) {
    println!("{}", "Participants:".bold());
    for (i, p) in session.participants().iter().enumerate() {
        let voice = session
            .voice_for(&p.name)
            .map(|v| format!("{} ({})", v.name, v.language_tag))
            .unwrap_or_else(|| "no voice yet".to_string());
        println!(
            "  {}. {} ({}) - using {} - voice {}",
            i + 1,
            p.name.bright_cyan(),
            p.role.display_name().yellow(),
            p.model.dimmed(),
            voice.magenta()
        );
    }
    println!();
}

fn print_help() {
    println!("{}", "Commands: play [N] | stop | voices | quit".dimmed());
}

fn print_status(status: SessionStatus) {
    println!();
    match status {
        SessionStatus::Completed => println!("{}", "  Debate concluded.".bright_green().bold()),
        SessionStatus::Error => println!(
            "{}",
            "  Lost connection to the debate; no further updates.".red().bold()
        ),
        _ => println!("{}", "  Live updates ended.".yellow()),
    }
    println!();
}

fn status_label(status: SessionStatus) -> colored::ColoredString {
    match status {
        SessionStatus::Completed => status.as_str().green(),
        SessionStatus::Error => status.as_str().red(),
        _ => status.as_str().bright_blue(),
    }
}

/// Line being streamed from the in-progress buffer.
struct StreamLine {
    text: String,
}

/// Prints committed turns once each and streams the in-progress turn.
#[derive(Default)]
struct Renderer {
    printed: BTreeSet<u64>,
    streaming: Option<StreamLine>,
}

impl Renderer {
    fn render(&mut self, view: &SessionView) {
        for turn in view.turns.iter() {
            if !self.printed.insert(turn.sequence_index) {
                continue;
            }
            match self.streaming.take() {
                Some(line) if line.text == turn.text => {
                    println!();
                    println!();
                }
                Some(_) => {
                    println!();
                    println!();
                    print_turn(turn);
                }
                None => print_turn(turn),
            }
        }

        match &view.in_progress {
            Some(live) => {
                let restarted = self
                    .streaming
                    .as_ref()
                    .is_some_and(|line| !live.text.starts_with(&line.text));
                if restarted {
                    self.finish();
                }

                let line = self.streaming.get_or_insert_with(|| {
                    let speaker = live.speaker.as_deref().unwrap_or("Thinking...");
                    println!("{} {}", "▶".bright_cyan(), speaker.bright_cyan().bold());
                    print!("  ");
                    StreamLine { text: String::new() }
                });

                let fresh = &live.text[line.text.len()..];
                if !fresh.is_empty() {
                    print!("{}", fresh.replace('\n', "\n  ").dimmed());
                    line.text.push_str(fresh);
                    let _ = std::io::stdout().flush();
                }
            }
            None => self.finish(),
        }
    }

    /// End a partially streamed line, if any.
    fn finish(&mut self) {
        if self.streaming.take().is_some() {
            println!();
            println!();
        }
    }
}

fn print_turn(turn: &Turn) {
    println!(
        "{} {} {}",
        "▶".bright_cyan(),
        turn.speaker_name.bright_cyan().bold(),
        format!("#{}", turn.sequence_index).dimmed()
    );
    let wrapped = textwrap(&turn.text, 66);
    for line in wrapped.lines() {
        println!("  {}", line);
    }
    println!();
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}
