use std::process::ExitCode;

use clap::Parser;

use docassist::commands::{self, Command};
use docassist::config::Config;
use docassist::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "docassist", version, about = "Command-line client for the DocAssist backend")]
struct Args {
    /// Backend base URL (overrides DOCASSIST_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Do not read or write the session in the OS keychain
    #[arg(long)]
    no_keychain: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional
    let _ = dotenvy::dotenv();

    env_logger::init();
    log::info!("DocAssist CLI starting...");

    let args = Args::parse();

    let mut config = Config::from_env();
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }
    log::debug!("Using API at {}", config.api_base_url);

    let state = if args.no_keychain {
        AppState::in_memory(&config)
    } else {
        AppState::new(&config)
    };
    state.restore_session();

    let result = commands::run(&state, args.command).await;

    // Refresh or a 401 may have changed the credentials either way.
    if let Err(e) = state.persist_session() {
        log::warn!("Failed to save session: {}", e);
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if e.requires_login() {
                eprintln!("Run `docassist login --user <name>` to sign in again.");
            }
            ExitCode::FAILURE
        }
    }
}
