//! AnnaUploader command-line entry point.

mod app;
mod config;

use std::path::PathBuf;

use anna_platform::Category;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "anna", version, about = "Bulk T-Shirt and Decal uploader")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload image files.
    Upload {
        /// Target category (tshirt or decal).
        #[arg(long, short, default_value = "decal")]
        category: Category,

        /// Upload every file as both a T-Shirt and a Decal.
        #[arg(long)]
        both: bool,

        /// Queue every file first and upload them as a single mass batch.
        #[arg(long)]
        mass: bool,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Interactive shell.
    Shell,

    /// Show or change settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the current settings.
    Show,
    /// Print the settings file location.
    Path,
    /// Change the account that will own uploads.
    SetAccount {
        account_id: u64,
        /// The id is a group id.
        #[arg(long)]
        group: bool,
    },
    /// Change one setting.
    Set { key: String, value: String },
}

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = config::Config::load()?;
    tracing::debug!(
        account_id = config.account.account_id,
        is_group = config.account.is_group,
        "configuration loaded"
    );

    match cli.command {
        Command::Config { action } => run_config(&mut config, action),
        Command::Upload {
            category,
            both,
            mass,
            files,
        } => {
            // One logical thread drives every upload task.
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            rt.block_on(app::upload(&config, files, category, both, mass))
        }
        Command::Shell => {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            rt.block_on(app::shell(config))
        }
    }
}

fn run_config(config: &mut config::Config, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => print!("{}", config.display()?),
        ConfigAction::Path => println!("{}", config::config_path()?.display()),
        ConfigAction::SetAccount { account_id, group } => {
            config.set_account(account_id, group)?;
            config.save()?;
            println!(
                "Uploads will be owned by {} {account_id}",
                if group { "group" } else { "user" }
            );
        }
        ConfigAction::Set { key, value } => {
            if let Err(e) = config.set(&key, &value) {
                anyhow::bail!("{e}\nknown settings: {}", config::SETTABLE_KEYS.join(", "));
            }
            config.save()?;
            println!("{key} updated");
        }
    }
    Ok(())
}
