use clap::{
    Parser,
    Subcommand,
};
use client::ExitReason;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use nova_admin::{
    HttpAdminApi,
    Session,
    TokenStore,
    config,
};
use std::path::Path;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::EnvFilter;

mod client;
mod login;
mod ui;

const LOG_FILE: &str = "nova-admin.log";

#[derive(Parser, Debug)]
#[command(
    name = "nova-admin",
    version,
    about = "Terminal admin console for the Nova game-operations API",
    long_about = None
)]
struct Args {
    /// Base URL of the admin API
    #[arg(long, env = "NOVA_ADMIN_API_URL", default_value = config::DEFAULT_API_URL)]
    api_url: String,

    /// Where the session token is kept (defaults to ~/.nova-admin/session.json)
    #[arg(long, env = "NOVA_ADMIN_SESSION_FILE")]
    session_file: Option<String>,

    /// Directory for log files (defaults to ~/.nova-admin/logs)
    #[arg(long, env = "NOVA_ADMIN_LOG_DIR")]
    log_dir: Option<String>,

    /// Operator username; prompted for when missing
    #[arg(long, env = "NOVA_ADMIN_USERNAME")]
    username: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Forget the stored session token without opening the console
    Logout,
}

/// The terminal belongs to the UI, so logs go to a daily file instead.
fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let appender = rolling::daily(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!(e))?;
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let log_dir = config::resolve_path(args.log_dir.as_deref(), config::default_log_dir)
        .map_err(|e| eyre!(e))?;
    let _guard = init_tracing(&log_dir)?;
    tracing::info!("starting nova-admin console");

    let session_file =
        config::resolve_path(args.session_file.as_deref(), config::default_session_file)
            .map_err(|e| eyre!(e))?;
    let mut session = Session::start(TokenStore::new(session_file));

    if let Some(Command::Logout) = args.command {
        session.logout()?;
        println!(
            "Logged out; removed {}",
            session.store().path().display()
        );
        return Ok(());
    }

    let api_url = config::parse_api_url(&args.api_url).map_err(|e| eyre!(e))?;
    let api = HttpAdminApi::new(api_url.as_str()).map_err(|e| eyre!(e))?;

    loop {
        let token = match session.token() {
            Some(token) => token.clone(),
            None => login::login(&mut session, &api, args.username.as_deref()).await?,
        };
        match client::run_app(api.clone().with_token(token)).await? {
            ExitReason::Quit => break,
            ExitReason::LoggedOut => {
                session.logout()?;
                println!("Logged out.");
            }
            ExitReason::SessionExpired => {
                session.expire()?;
                println!("Session expired, please log in again.");
            }
        }
    }

    tracing::info!("console closed");
    Ok(())
}
