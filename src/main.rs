use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::RwLock;
use tracing_subscriber::EnvFilter;

use tonerig::chain::Preset;
use tonerig::config::{AudioConfig, Config};
use tonerig::control::shell::{self, ShellLine};
use tonerig::control::{start_socket_server, Command, CommandBus, CommandSource, ControlServer, Controller, EventLog};
use tonerig::engine::{render_file, AudioBackend, CpalBackend, Direction, StreamRequest};
use tonerig::fx::EffectKind;
use tonerig::tone::{validate, OllamaTranslator, ToneTranslator};

/// Tonerig - live guitar effect chains from plain-language tone requests
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ./tonerig.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// List audio input and output devices
    Devices,
    /// List effect kinds and their parameter bounds
    Kinds,
    /// List models installed on the language-model service
    Models,
    /// Turn a tone description into a chain and print it
    Generate {
        description: Vec<String>,
        /// Save the generated chain as a preset
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Run a WAV file through a preset
    Render {
        #[arg(long)]
        preset: PathBuf,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Stream live audio with the interactive shell and control socket
    Run {
        /// Input device name fragment
        #[arg(long)]
        input: Option<String>,
        /// Output device name fragment
        #[arg(long)]
        output: Option<String>,
        /// Preset to load before streaming
        #[arg(long)]
        preset: Option<PathBuf>,
        /// Tone to request once streaming
        #[arg(long)]
        tone: Option<String>,
        /// Control socket path
        #[arg(long)]
        socket: Option<PathBuf>,
        /// Do not read commands from stdin
        #[arg(long)]
        no_shell: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn stream_request(audio: &AudioConfig) -> StreamRequest {
    StreamRequest {
        input_device: audio.input_device.clone(),
        output_device: audio.output_device.clone(),
        sample_rate: audio.sample_rate,
        block_size: audio.block_size,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        CliCommand::Devices => list_devices(),
        CliCommand::Kinds => {
            list_kinds();
            Ok(())
        }
        CliCommand::Models => list_models(&config),
        CliCommand::Generate { description, save } => generate(&config, &description.join(" "), save.as_deref()),
        CliCommand::Render { preset, input, output } => render(&config, &preset, &input, &output),
        CliCommand::Run {
            input,
            output,
            preset,
            tone,
            socket,
            no_shell,
        } => {
            let mut config = config;
            if input.is_some() {
                config.audio.input_device = input;
            }
            if output.is_some() {
                config.audio.output_device = output;
            }
            if let Some(socket) = socket {
                config.control.socket_path = socket;
            }
            run(config, preset, tone, !no_shell)
        }
    }
}

fn list_devices() -> Result<()> {
    let backend = CpalBackend::new();
    let devices = backend.list_devices().context("Failed to enumerate audio devices")?;
    for direction in [Direction::Input, Direction::Output] {
        println!("{}:", if direction == Direction::Input { "Input" } else { "Output" });
        for device in devices.iter().filter(|d| d.direction == direction) {
            println!(
                "  {}{} ({} ch, {} Hz)",
                if device.is_default { "* " } else { "  " },
                device.name,
                device.channels,
                device.default_sample_rate
            );
        }
    }
    Ok(())
}

fn list_kinds() {
    for kind in EffectKind::all() {
        println!("{} ({})", kind.key(), kind.name());
        for p in kind.params() {
            println!(
                "    {:<18} {:>9.2} .. {:<9.2} default {}{}",
                p.key,
                p.min,
                p.max,
                p.default,
                p.unit.suffix()
            );
        }
    }
}

fn translator(config: &Config) -> Result<OllamaTranslator> {
    OllamaTranslator::new(&config.translator).context("Failed to create language-model client")
}

fn list_models(config: &Config) -> Result<()> {
    let translator = translator(config)?;
    let models = translator
        .list_models()
        .with_context(|| format!("Failed to list models at {}", translator.url()))?;
    for model in models {
        let marker = if model == translator.model() { "* " } else { "  " };
        println!("{}{}", marker, model);
    }
    Ok(())
}

fn generate(config: &Config, description: &str, save: Option<&Path>) -> Result<()> {
    if description.trim().is_empty() {
        bail!("Tone description is empty");
    }
    let translator = translator(config)?;
    if !translator.is_running() {
        bail!("Language-model service is not reachable at {}", translator.url());
    }

    let payload = translator.translate(description).map_err(|e| {
        tracing::debug!(raw = %translator.last_raw_response(), "unusable response");
        e
    })?;
    let validated = validate(&payload).context("Language model did not describe a usable chain")?;

    for warning in &validated.warnings {
        eprintln!("warning: {}", warning);
    }
    println!("{}", serde_json::to_string_pretty(&validated.chain)?);

    if let Some(path) = save {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| description.to_string());
        Preset::new(name, validated.chain)
            .save(path)
            .with_context(|| format!("Failed to save preset: {}", path.display()))?;
        eprintln!("saved {}", path.display());
    }
    Ok(())
}

fn render(config: &Config, preset: &Path, input: &Path, output: &Path) -> Result<()> {
    let (preset, warnings) =
        Preset::load(preset).with_context(|| format!("Failed to load preset: {}", preset.display()))?;
    for warning in &warnings {
        eprintln!("warning: {}", warning);
    }

    let result = render_file(&preset.chain, input, output, config.audio.block_size as usize)?;
    println!(
        "Rendered '{}' to {} ({:.2}s at {} Hz)",
        preset.name,
        output.display(),
        result.duration_secs,
        result.sample_rate
    );
    if result.faulted_units > 0 {
        eprintln!("warning: {} unit(s) faulted and were bypassed", result.faulted_units);
    }
    Ok(())
}

fn run(config: Config, preset: Option<PathBuf>, tone: Option<String>, shell: bool) -> Result<()> {
    let bus = CommandBus::new();
    let log = Arc::new(RwLock::new(EventLog::new(config.control.event_capacity)));
    let translator: Arc<dyn ToneTranslator> = Arc::new(translator(&config)?);

    let controller = Controller::new(
        Box::new(CpalBackend::new()),
        stream_request(&config.audio),
        translator,
        &bus,
        Arc::clone(&log),
    );
    let server = Arc::new(ControlServer::new(bus.sender(), log, controller.snapshot()));

    let shutdown = Arc::new(AtomicBool::new(false));
    let socket_path = &config.control.socket_path;
    let socket = start_socket_server(Arc::clone(&server), socket_path, Arc::clone(&shutdown))
        .with_context(|| format!("Failed to bind control socket: {}", socket_path.display()))?;

    // queued before the controller starts, handled in order
    let sender = bus.sender();
    if let Some(path) = preset {
        sender.send(Command::LoadPreset { path }, CommandSource::Cli);
    }
    sender.send(Command::Start { input: None, output: None }, CommandSource::Cli);
    if let Some(description) = tone {
        sender.send(Command::Tone { description }, CommandSource::Cli);
    }

    if shell {
        let server = Arc::clone(&server);
        std::thread::Builder::new()
            .name("shell".to_string())
            .spawn(move || run_shell(&server))
            .context("Failed to start shell")?;
    }

    controller.run();

    shutdown.store(true, Ordering::Relaxed);
    let _ = socket.join();
    Ok(())
}

fn run_shell(server: &ControlServer) {
    println!("tonerig ready, type 'help' for commands");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        match shell::parse_line(&line) {
            Ok(ShellLine::Empty) => {}
            Ok(ShellLine::Help) => println!("{}", shell::HELP),
            Ok(ShellLine::Call { method, params }) => {
                let reply = server.handle(method, &params, CommandSource::Shell);
                println!("{}", serde_json::to_string_pretty(&reply).unwrap_or_default());
                if method == "shutdown" {
                    return;
                }
            }
            Err(message) => eprintln!("{}", message),
        }
    }
    // stdin closed
    server.handle("shutdown", &serde_json::json!({}), CommandSource::Shell);
}
