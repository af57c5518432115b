//! Startup wiring for the `chatterm` binary: flags, logging, backend
//! construction and the sign-in prompts that run before the TUI takes over.

use chatterm_config::ChattermConfig;
use chatterm_core::{ChatError, ConversationFilter, FixtureClient, FixtureData, MessagingClient};
use chatterm_ui::{Palette, SessionSettings};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CliFlags {
    pub config_path: Option<PathBuf>,
    pub fixture_path: Option<PathBuf>,
    pub show_all: bool,
    pub help: bool,
}

pub fn parse_cli_flags<I>(args: I) -> Result<CliFlags, ChatError>
where
    I: IntoIterator<Item = String>,
{
    let mut flags = CliFlags::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                flags.config_path = Some(read_cli_path(&arg, args.next())?);
            }
            "--fixture" => {
                flags.fixture_path = Some(read_cli_path(&arg, args.next())?);
            }
            "--all" => flags.show_all = true,
            "--help" | "-h" => flags.help = true,
            value if value.starts_with("--") => {
                return Err(ChatError::Configuration(format!(
                    "Unknown flag '{value}'. Run with --help for valid flags."
                )));
            }
            unknown => {
                return Err(ChatError::Configuration(format!(
                    "Unexpected argument '{unknown}'. Run with --help for valid flags."
                )));
            }
        }
    }

    Ok(flags)
}

fn read_cli_path(flag: &str, value: Option<String>) -> Result<PathBuf, ChatError> {
    let value = value.ok_or_else(|| {
        ChatError::Configuration(format!("Missing value after {flag}. Use {flag} <path>."))
    })?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ChatError::Configuration(format!(
            "Flag '{flag}' requires a non-empty value."
        )));
    }
    Ok(PathBuf::from(value))
}

pub fn print_cli_help() {
    println!("Usage: chatterm [--config <path>] [--fixture <path>] [--all]");
    println!();
    println!("  --config <path>    Read configuration from <path> instead of the default location");
    println!("  --fixture <path>   Serve conversations from a JSON fixture file");
    println!("  --all              Start with all conversations instead of unread only");
    println!("  --help             Show this help message");
}

pub fn session_settings(config: &ChattermConfig, flags: &CliFlags) -> SessionSettings {
    let initial_filter = if flags.show_all || config.show_all_conversations {
        ConversationFilter::All
    } else {
        ConversationFilter::UnreadOnly
    };
    SessionSettings {
        conversations_limit: config.conversations_limit,
        messages_limit: config.messages_limit,
        initial_filter,
        banner_ttl: config.banner_ttl(),
        download_dir: config.download_dir(),
        open_after_download: config.downloads.open_after_download,
    }
}

pub fn palette(config: &ChattermConfig) -> Palette {
    let colors = &config.ui.colors;
    Palette::from_names(&colors.header, &colors.unread, &colors.selected, &colors.error)
}

/// The `--fixture` flag wins over `client.fixture_path`; with neither, the
/// built-in sample conversations are served.
pub fn build_fixture_client(
    config: &ChattermConfig,
    fixture_override: Option<&Path>,
) -> Result<FixtureClient, ChatError> {
    let data = match fixture_override
        .map(Path::to_path_buf)
        .or_else(|| config.fixture_path())
    {
        Some(path) => {
            info!(path = %path.display(), "loading fixture conversations");
            FixtureData::load(&path)?
        }
        None => FixtureData::sample(),
    };
    Ok(FixtureClient::new(data, config.download_dir()).with_latency(config.client_latency()))
}

/// Source of interactive sign-in answers.
pub trait CredentialPrompt {
    fn ask(&mut self, label: &str) -> Result<String, ChatError>;
}

pub struct StdinPrompt;

impl CredentialPrompt for StdinPrompt {
    fn ask(&mut self, label: &str) -> Result<String, ChatError> {
        let mut stdout = io::stdout();
        write!(stdout, "{label}: ")?;
        stdout.flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(ChatError::Unauthorized(format!(
                "input closed before {} was entered",
                label.to_ascii_lowercase()
            )));
        }
        Ok(line.trim().to_owned())
    }
}

/// Runs the phone / code / password exchange when the client is not yet
/// authorized. A password is only asked for when sign-in demands one.
pub async fn ensure_authorized(
    client: &dyn MessagingClient,
    prompt: &mut dyn CredentialPrompt,
) -> Result<(), ChatError> {
    if client.is_authorized().await? {
        debug!("client already authorized");
        return Ok(());
    }

    let phone = prompt.ask("Phone number")?;
    client.request_code(&phone).await?;
    let code = prompt.ask("Login code")?;
    match client.sign_in(&phone, &code, None).await {
        Ok(()) => {}
        Err(ChatError::AuthChallenge) => {
            let password = prompt.ask("Password")?;
            client.sign_in(&phone, &code, Some(&password)).await?;
        }
        Err(error) => return Err(error),
    }
    info!("signed in");
    Ok(())
}

pub fn init_file_logging(log_path: &Path, default_filter: &str) -> Result<(), ChatError> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|error| {
                ChatError::Configuration(format!(
                    "failed to create chatterm log directory '{}': {error}",
                    parent.display()
                ))
            })?;
        }
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|error| {
            ChatError::Configuration(format!(
                "failed to open chatterm log file '{}': {error}",
                log_path.display()
            ))
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(log_file))
        .init();

    Ok(())
}
