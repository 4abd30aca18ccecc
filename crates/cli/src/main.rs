use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "poast")]
#[command(about = "Slack bot that tweets what you tell it to", long_about = None)]
struct Cli {
    /// Config file path (default: POAST_CONFIG_PATH or ./config.json)
    #[arg(long, short, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Slack and relay messages until interrupted (default)
    Run,

    /// Write a config template with empty credential fields, if no config file exists
    Init,

    /// Validate the config and print who the bot is on Slack and Twitter, then exit
    Check,

    /// Show version
    Version,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Version => {
            println!("poast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Init => run_init(cli.config),
        Commands::Check => run_check(cli.config).await,
        Commands::Run => run_bot(cli.config).await,
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(poast::config::default_config_path);
    if poast::init::init_config_file(&path)? {
        println!("wrote config template to {}", path.display());
    } else {
        println!("config already exists at {}", path.display());
    }
    Ok(())
}

async fn run_check(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = poast::config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    let identity = poast::bot::check(&config).await?;
    println!(
        "slack user {} / twitter @{}",
        identity.workspace_user_id, identity.public_handle
    );
    Ok(())
}

async fn run_bot(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = poast::config::load_config(config_path)?;
    log::info!("starting poast with config {}", path.display());
    poast::bot::run_bot(config).await
}
