use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use vitrine_contracts::chat::{parse_command, ChatCommand, CHAT_HELP_COMMANDS};
use vitrine_contracts::events::EventWriter;
use vitrine_contracts::runs::summary::{now_utc_iso, write_summary, SessionSummary};
use vitrine_contracts::settings::SETTING_KEYS;
use vitrine_contracts::{GenerationSettings, SettingsError};
use vitrine_engine::{
    default_backend_registry, load_reference, save_generation, EngineConfig, FlowOutcome,
    SessionController,
};

const EXIT_FLOW_NOT_COMPLETED: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "vitrine",
    version,
    about = "Turn product reference photos into styled product shots"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session.
    Chat(ChatArgs),
    /// One-shot: compose a prompt if needed, generate, save.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct SessionArgs {
    /// Backend name (dryrun, gemini). Overrides VITRINE_BACKEND.
    #[arg(long)]
    backend: Option<String>,
    /// Event log path. Defaults to `<out>/events.jsonl`.
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Default, Args)]
struct SettingsArgs {
    #[arg(long)]
    aspect_ratio: Option<String>,
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    mode: Option<String>,
    #[arg(long)]
    variants: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    seed: Option<String>,
    #[arg(long)]
    guidance: Option<String>,
    #[arg(long)]
    reference_strength: Option<String>,
    #[arg(long)]
    temperature: Option<String>,
}

impl SettingsArgs {
    fn values(&self) -> [Option<&str>; 8] {
        [
            self.aspect_ratio.as_deref(),
            self.style.as_deref(),
            self.mode.as_deref(),
            self.variants.as_deref(),
            self.seed.as_deref(),
            self.guidance.as_deref(),
            self.reference_strength.as_deref(),
            self.temperature.as_deref(),
        ]
    }

    fn to_settings(&self) -> Result<GenerationSettings, SettingsError> {
        let mut settings = GenerationSettings::default();
        for (key, value) in SETTING_KEYS.iter().zip(self.values()) {
            if let Some(value) = value {
                settings.apply(key, value)?;
            }
        }
        Ok(settings)
    }
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    session: SessionArgs,
    /// Where `/save` writes images and receipts.
    #[arg(long, default_value = "vitrine-out")]
    out: PathBuf,
    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long = "reference", required = true)]
    references: Vec<PathBuf>,
    #[arg(long)]
    prompt: Option<String>,
    /// Compose the prompt from the references even when --prompt is given.
    #[arg(long)]
    auto_prompt: bool,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    settings: SettingsArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("vitrine error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args).await?;
            Ok(0)
        }
        Command::Run(args) => run_once(args).await,
    }
}

fn open_session(
    args: &SessionArgs,
    out: &Path,
    settings: GenerationSettings,
) -> Result<SessionController> {
    let mut config = EngineConfig::from_env();
    if let Some(backend) = args.backend.as_deref() {
        config.backend = backend.trim().to_ascii_lowercase();
    }
    tracing::debug!(?config, "engine config");
    let registry = default_backend_registry(&config)?;
    let backend = registry.resolve(&config.backend)?;

    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| out.join("events.jsonl"));
    let session_id = format!("session-{}", uuid::Uuid::new_v4().simple());
    let events = EventWriter::new(events_path, session_id);
    Ok(SessionController::with_settings(backend, events, settings))
}

/// Drives `flow` to completion, printing each new progress label.
async fn with_progress<F: Future>(session: &SessionController, flow: F) -> F::Output {
    let mut status = session.subscribe();
    let mut shown: Option<&'static str> = None;
    tokio::pin!(flow);
    loop {
        tokio::select! {
            output = &mut flow => return output,
            changed = status.changed() => {
                if changed.is_err() {
                    return flow.await;
                }
                let label = status.borrow_and_update().label();
                if let Some(text) = label.filter(|_| label != shown) {
                    println!("{text}");
                }
                shown = label;
            }
        }
    }
}

fn report_outcome<T>(outcome: &FlowOutcome<T>) {
    if let Some(notice) = outcome.notice() {
        println!("{notice}");
    }
}

fn session_summary(session: &SessionController, started_at: String) -> SessionSummary {
    let history = session.history();
    SessionSummary {
        session_id: session.session_id().to_string(),
        backend: session.backend_name().to_string(),
        started_at,
        finished_at: now_utc_iso(),
        total_generations: history.len() as u64,
        total_images: history.iter().map(|item| item.image_count as u64).sum(),
        last_prompt: history.first().map(|item| item.prompt.clone()),
    }
}

async fn run_once(args: RunArgs) -> Result<i32> {
    let settings = args.settings.to_settings()?;
    let session = open_session(&args.session, &args.out, settings)?;
    let started_at = now_utc_iso();

    let code = run_once_flows(&session, &args).await;
    write_summary(
        &args.out.join("summary.json"),
        &session_summary(&session, started_at),
    )?;
    code
}

async fn run_once_flows(session: &SessionController, args: &RunArgs) -> Result<i32> {
    for path in &args.references {
        session.add_reference(load_reference(path)?)?;
    }
    if let Some(prompt) = args.prompt.as_deref() {
        session.set_prompt(prompt)?;
    }

    if args.auto_prompt || session.prompt().trim().is_empty() {
        let outcome = with_progress(session, session.auto_prompt()).await;
        report_outcome(&outcome);
        match outcome.completed() {
            Some(composed) => println!("Prompt: {}", composed.prompt),
            None => return Ok(EXIT_FLOW_NOT_COMPLETED),
        }
    }

    let outcome = with_progress(session, session.generate()).await;
    report_outcome(&outcome);
    if !outcome.is_completed() {
        return Ok(EXIT_FLOW_NOT_COMPLETED);
    }
    for path in save_latest(session, &args.out)? {
        println!("{}", path.display());
    }
    Ok(0)
}

/// Writes the images of the latest view plus a receipt. Empty when there is
/// no latest result.
fn save_latest(session: &SessionController, out: &Path) -> Result<Vec<PathBuf>> {
    let Some(item) = session.latest_result() else {
        return Ok(Vec::new());
    };
    save_generation(&item, out, session.backend_name())
        .with_context(|| format!("failed to save into {}", out.display()))
}

async fn run_chat(args: ChatArgs) -> Result<()> {
    let settings = args.settings.to_settings()?;
    let session = open_session(&args.session, &args.out, settings)?;
    let started_at = now_utc_iso();

    println!(
        "Vitrine chat started ({} backend). Type /help for commands.",
        session.backend_name()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match parse_command(&line) {
            ChatCommand::Noop => {}
            ChatCommand::Quit => break,
            command => handle_command(&session, &args.out, command).await?,
        }
    }

    write_summary(
        &args.out.join("summary.json"),
        &session_summary(&session, started_at),
    )?;
    Ok(())
}

async fn handle_command(
    session: &SessionController,
    out: &Path,
    command: ChatCommand,
) -> Result<()> {
    match command {
        ChatCommand::Noop | ChatCommand::Quit => {}
        ChatCommand::Help => println!("Commands: {}", CHAT_HELP_COMMANDS.join(" ")),
        ChatCommand::AddReferences(paths) => {
            for path in paths {
                match load_reference(Path::new(&path)) {
                    Ok(image) => {
                        let name = image.file_name.clone();
                        match session.add_reference(image) {
                            Ok(id) => println!("Added {name} ({id})"),
                            Err(rejection) => println!("{rejection}"),
                        }
                    }
                    Err(err) => println!("Could not add {path}: {err:#}"),
                }
            }
        }
        ChatCommand::RemoveReference(id) => match session.remove_reference(&id) {
            Ok(Some(image)) => println!("Removed {}", image.file_name),
            Ok(None) => println!("No reference with id {id}"),
            Err(rejection) => println!("{rejection}"),
        },
        ChatCommand::ListReferences => {
            let references = session.references();
            if references.is_empty() {
                println!("No reference images.");
            }
            for image in references {
                println!(
                    "{}  {}  {}  {} bytes",
                    image.id, image.file_name, image.mime_type, image.byte_len
                );
            }
        }
        ChatCommand::ClearCanvas => {
            session.clear_canvas();
            println!("Canvas cleared.");
        }
        ChatCommand::SetPrompt(None) => {
            let prompt = session.prompt();
            if prompt.is_empty() {
                println!("No prompt yet.");
            } else {
                println!("Prompt: {prompt}");
            }
        }
        ChatCommand::SetPrompt(Some(text)) => match session.set_prompt(text) {
            Ok(()) => println!("Prompt set."),
            Err(rejection) => println!("{rejection}"),
        },
        ChatCommand::AutoPrompt => {
            let outcome = with_progress(session, session.auto_prompt()).await;
            report_outcome(&outcome);
            if let Some(composed) = outcome.completed() {
                println!("Prompt: {}", composed.prompt);
                print_swatches(session);
            }
        }
        ChatCommand::Generate => {
            let outcome = with_progress(session, session.generate()).await;
            report_outcome(&outcome);
            if let Some(item) = outcome.completed() {
                println!(
                    "Generated {} image(s) [{}]",
                    item.image_count,
                    item.short_id()
                );
                print_latest(session);
            }
        }
        ChatCommand::SetSetting { key, value } => match session.apply_setting(&key, &value) {
            Ok(settings) => print_settings(&settings),
            Err(err) => println!("{err}"),
        },
        ChatCommand::ShowSettings => print_settings(&session.settings()),
        ChatCommand::ShowSwatches => print_swatches(session),
        ChatCommand::ShowLatest => print_latest(session),
        ChatCommand::ShowHistory => {
            let history = session.history();
            if history.is_empty() {
                println!("No generations yet.");
            }
            for item in history {
                println!(
                    "{}  {}  {} image(s)  {}",
                    item.short_id(),
                    item.created_at.format("%H:%M:%S"),
                    item.image_count,
                    item.prompt
                );
            }
        }
        ChatCommand::Save => {
            if session.latest_images().is_empty() {
                println!("Nothing to save yet.");
            } else {
                let paths = save_latest(session, out)?;
                println!("Saved {} image(s) to {}", paths.len(), out.display());
            }
        }
        ChatCommand::Invalid { command, reason } => println!("/{command} {reason}"),
        ChatCommand::Unknown { command, .. } => {
            println!("Unknown command /{command}. Type /help for commands.")
        }
    }
    Ok(())
}

fn print_settings(settings: &GenerationSettings) {
    let seed = settings
        .seed()
        .map(|seed| seed.to_string())
        .unwrap_or_else(|| "random".to_string());
    println!(
        "aspect_ratio={} style={} mode={} variants={} seed={} guidance={} reference_strength={} temperature={}",
        settings.aspect_ratio,
        settings.style_preset,
        settings.mode,
        settings.variant_count,
        seed,
        settings.guidance_strength(),
        settings.reference_strength(),
        settings.temperature()
    );
}

fn print_swatches(session: &SessionController) {
    let swatches = session.swatches();
    if swatches.is_empty() {
        println!("No swatches.");
        return;
    }
    let hexes: Vec<String> = swatches.into_iter().map(|swatch| swatch.hex).collect();
    println!("Swatches: {}", hexes.join(" "));
}

fn print_latest(session: &SessionController) {
    let latest = session.latest_images();
    if latest.is_empty() {
        println!("No images yet.");
    }
    for (idx, image) in latest.iter().enumerate() {
        println!("{}. {}", idx + 1, describe_image_ref(image));
    }
}

/// Short form of an image reference; `data:` payloads are not printed.
fn describe_image_ref(image: &str) -> String {
    match image.strip_prefix("data:") {
        Some(rest) => {
            let mime = rest.split([';', ',']).next().unwrap_or("image");
            let payload_len = rest.split_once(',').map(|(_, data)| data.len()).unwrap_or(0);
            format!("{mime} ({payload_len} base64 chars, use /save)")
        }
        None => image.to_string(),
    }
}
