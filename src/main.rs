use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use portal_login::auth::Authenticator;
use portal_login::config::{default_config_path, AuthConfig};
use portal_login::credentials::AccountsFile;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "portal-login")]
#[command(about = "Log in to a portal through its identity provider")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to accounts file
    #[arg(short, long, default_value = "accounts.toml")]
    accounts: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in as ACCOUNT and print its account id
    Login {
        /// Account name from the accounts file
        account: String,
    },
    /// Validate and show the configuration
    CheckConfig,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_layer = json.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .json()
    });
    let text_layer = (!json).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = AuthConfig::load(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;

    match cli.command {
        Command::CheckConfig => {
            let resolved = config
                .resolve()
                .with_context(|| format!("Invalid config: {}", config_path.display()))?;
            println!("Config file: {}", config_path.display());
            println!("Login URL: {}", resolved.login_url);
            println!("Target domain: {}", resolved.target_domain);
            println!("Success fragment: {}", resolved.success_fragment);
            println!("Max steps: {}", resolved.max_steps);
            println!("Probe endpoints: {}", resolved.probe_endpoints.len());
            if let Some(timeout) = resolved.attempt_timeout {
                println!("Attempt timeout: {timeout:?}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Login { account } => {
            let accounts = AccountsFile::load(&cli.accounts)?;
            let credential = accounts.get(&account)?.resolve().await?;
            let authenticator = Authenticator::new(&config)?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            match authenticator
                .authenticate(&account, credential, &cancel)
                .await
            {
                Ok(session) => {
                    match session.account_id() {
                        Some(id) => println!("{id}"),
                        None => println!("authenticated, account id unknown"),
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    eprintln!("Login failed: {err}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}
