mod cli;
mod commands;
mod config;
mod credentials;
mod output;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use roshnii_client::ApiError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands, OutputFormat};
use commands::Context;
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        if e.downcast_ref::<ApiError>().is_some_and(ApiError::is_auth_failure) {
            eprintln!("  Session ended. Run `roshnii login` to sign in again.");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let profile = &cli.profile;
    let dir = config::state_dir()?;
    let profile_cfg = config::load_profile(&dir, profile)?;
    let format = cli
        .format
        .or_else(|| profile_cfg.format.as_deref().and_then(OutputFormat::parse))
        .unwrap_or_default();

    if let Commands::Config(args) = &cli.command {
        match &args.command {
            cli::ConfigCommands::Show => {
                println!("{}: {}", "Profile".cyan(), profile);
                println!(
                    "{}: {}",
                    "Server".cyan(),
                    profile_cfg.server.as_deref().unwrap_or("(not set)")
                );
                println!(
                    "{}: {}",
                    "Format".cyan(),
                    profile_cfg.format.as_deref().unwrap_or("json")
                );
            }
            cli::ConfigCommands::Set(set_args) => {
                let mut cfg = profile_cfg;
                match set_args.key.as_str() {
                    "server" => cfg.server = Some(set_args.value.clone()),
                    "format" => {
                        if OutputFormat::parse(&set_args.value).is_none() {
                            anyhow::bail!(
                                "Unknown format: {}. Valid formats: json, table",
                                set_args.value
                            );
                        }
                        cfg.format = Some(set_args.value.to_ascii_lowercase());
                    }
                    other => {
                        anyhow::bail!("Unknown config key: {other}. Valid keys: server, format")
                    }
                }
                config::save_profile(&dir, profile, &cfg)?;
                output::print_success(&format!("Set {} = {}", set_args.key, set_args.value));
            }
        }
        return Ok(());
    }

    let settings = commands::load_settings(cli.config.as_deref())?;
    init_tracing(cli.log_level.as_deref().unwrap_or(&settings.logging.level));
    let ctx = Context::open(dir, settings, cli.server.as_deref(), profile, format)?;

    let result = match &cli.command {
        Commands::Login(args) => commands::auth::login(&ctx, args).await,
        Commands::Logout => return commands::auth::logout(&ctx).await,
        Commands::Whoami => commands::auth::whoami(&ctx).await,
        Commands::Status => return commands::server::status(&ctx).await,
        Commands::Albums(args) => commands::albums::run(&ctx, &args.command).await,
        Commands::Images(args) => commands::images::run(&ctx, &args.command).await,
        Commands::Config(_) => Ok(()),
    };
    // Refresh may have rotated the cookies, and a failed one clears them.
    ctx.persist()?;
    result
}

fn init_tracing(level: &str) {
    // Prefer RUST_LOG from env, otherwise use the configured level.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
