//! Configuration view and validation commands: `issuelink config`.

use std::path::PathBuf;

use anyhow::Result;

use super::super::ConfigCommands;
use issuelink::config::{CONFIG_FILE, IssuelinkToml};

pub fn cmd_config(path: Option<PathBuf>, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("issuelink configuration");
            println!("=======================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                IssuelinkToml::load(&config_path)?
            } else {
                println!("No {} found at {}; using defaults.", CONFIG_FILE, config_path.display());
                IssuelinkToml::default()
            };
            println!();

            println!("[server]");
            println!("  host = \"{}\"", toml.server.host);
            println!("  port = {}", toml.server.port);
            println!("  dev = {}", toml.server.dev);
            println!();

            println!("[github]");
            if let Some(url) = &toml.github.api_url {
                println!("  api_url = \"{}\"", url);
            }
            println!("  user_agent = \"{}\"", toml.github.user_agent);
            if let Some(secs) = toml.github.timeout_secs {
                println!("  timeout_secs = {}", secs);
            }
            println!();

            println!("[logging]");
            println!("  level = \"{}\"", toml.logging.level);
            println!("  format = \"{:?}\"", toml.logging.format);
            if let Some(dir) = &toml.logging.directory {
                println!("  directory = \"{}\"", dir.display());
            }
            println!();

            // Tokens are secrets: show where they are configured, not their values.
            println!("[tokens]");
            println!("  default = {}", if toml.tokens.default.is_some() { "<set>" } else { "<unset>" });
            println!("  ttl_minutes = {}", toml.tokens.ttl_minutes);
            for repo in toml.tokens.repos.keys() {
                println!("  repos.\"{}\" = <set>", repo);
            }
            println!();

            println!("sessions: {}", toml.sessions.len());
            println!();

            println!("Effective values (with env overrides):");
            println!("  port = {}", toml.port());
            println!("  log = \"{}\"", toml.log_level());
            println!("  api_url = \"{}\"", toml.api_url());
            println!(
                "  default token = {}",
                if toml.default_token().is_some() { "<set>" } else { "<unset>" }
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE);
                return Ok(());
            }

            let toml = IssuelinkToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                std::fs::create_dir_all(parent)?;
            }

            IssuelinkToml::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, dev");
            println!("  - [github] api_url, user_agent, timeout_secs");
            println!("  - [tokens] default, ttl_minutes, [tokens.repos] \"owner/repo\" = token");
            println!("  - [[sessions]] id, login, github_id");
            println!();
        }
    }

    Ok(())
}
