use anyhow::{Context, Result};
use chatterm_app::{
    StdinPrompt, build_fixture_client, ensure_authorized, init_file_logging, palette,
    parse_cli_flags, print_cli_help, session_settings,
};
use chatterm_cache::TtlCache;
use chatterm_core::MessagingClient;
use chatterm_tasks::TaskOrchestrator;
use chatterm_ui::{Session, Ui};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_cli_flags(std::env::args().skip(1))?;
    if cli.help {
        print_cli_help();
        return Ok(());
    }

    let config = match cli.config_path.as_deref() {
        Some(path) => chatterm_config::load_from_path(path)?,
        None => chatterm_config::load_from_env()?,
    };
    init_file_logging(&config.log_path(), &config.log.filter)?;
    tracing::info!(session = %config.session_name, "starting chatterm");

    let client: Arc<dyn MessagingClient> =
        Arc::new(build_fixture_client(&config, cli.fixture_path.as_deref())?);
    client.connect().await.context("failed to connect")?;
    ensure_authorized(client.as_ref(), &mut StdinPrompt)
        .await
        .context("sign-in failed")?;

    let cache = TtlCache::open(config.cache_dir(), config.cache_ttl());
    let tasks = TaskOrchestrator::from_current()?;
    let mut session = Session::new(
        Arc::clone(&client),
        session_settings(&config, &cli),
        cache,
        tasks,
    )?;

    let mut ui = Ui::init(palette(&config)).context("failed to set up the terminal")?;
    let run_result = ui.run(&mut session, config.tick_interval());

    if let Err(error) = session.shutdown().await {
        tracing::warn!(error = %error, "failed to persist cache metadata during shutdown");
    }
    drop(ui);
    if let Err(error) = client.disconnect().await {
        tracing::warn!(error = %error, "failed to disconnect during shutdown");
    }

    run_result.context("terminal UI failed")?;
    tracing::info!("chatterm stopped");
    Ok(())
}
