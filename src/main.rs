use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use issuelink::config::IssuelinkConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "issuelink")]
#[command(version, about = "Track GitHub issues inline from document text")]
pub struct Cli {
    /// Path to the config file (defaults to ./issuelink.toml)
    #[arg(short, long, global = true, env = "ISSUELINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter such as "debug" or "issuelink=trace". Overrides issuelink.toml.
    #[arg(long, global = true)]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the issue route server
    Serve {
        /// Port to serve on (overrides config and ISSUELINK_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable dev mode (listen on all interfaces, permissive CORS)
        #[arg(long)]
        dev: bool,

        /// Serve an in-memory GitHub instead of the real API
        #[arg(long)]
        mock: bool,
    },
    /// Run one issue status sync over a markup file and write it back if changed
    Sync {
        /// Markup file to sync
        file: PathBuf,

        #[arg(long)]
        owner: String,

        #[arg(long)]
        repo: String,

        #[arg(long, default_value = "main")]
        branch: String,

        /// issuelink server root; when set, issues are fetched through its routes
        #[arg(long)]
        endpoint: Option<String>,

        /// Session id sent to the server
        #[arg(long, requires = "endpoint")]
        session: Option<String>,

        /// GitHub token for direct API access (falls back to config, then GITHUB_TOKEN)
        #[arg(long, conflicts_with = "endpoint")]
        token: Option<String>,

        /// Report changes without writing the file
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the plain-text preview of markup files
    Preview {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default issuelink.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // `config` must work even when the file does not parse.
    if let Commands::Config { command } = &cli.command {
        return cmd::cmd_config(cli.config.clone(), command.clone());
    }

    let config = IssuelinkConfig::new(cli.config.clone())?;
    let level = cli.log.clone().unwrap_or_else(|| config.toml.log_level());
    let _log_guard = issuelink::logging::init(
        &level,
        config.toml.logging.format,
        config.toml.logging.directory.as_deref(),
    )?;

    match &cli.command {
        Commands::Serve { port, dev, mock } => {
            cmd::cmd_serve(&config, *port, *dev, *mock).await?;
        }
        Commands::Sync {
            file,
            owner,
            repo,
            branch,
            endpoint,
            session,
            token,
            dry_run,
        } => {
            let target = cmd::SyncTarget {
                owner: owner.clone(),
                repo: repo.clone(),
                branch: branch.clone(),
                endpoint: endpoint.clone(),
                session: session.clone(),
                token: token.clone(),
            };
            cmd::cmd_sync(&config, file, target, *dry_run).await?;
        }
        Commands::Preview { files } => cmd::cmd_preview(files)?,
        Commands::Config { .. } => {}
    }

    Ok(())
}
