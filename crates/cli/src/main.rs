//! Replays newline-delimited JSON SIP events through the event engine
//!
//! Each line of input is one `SipEvent`; each handled event prints its
//! result as one JSON line on stdout. Logs go to stderr.

mod args;
mod replay;

use std::path::PathBuf;

use anyhow::{Context, Result};
use ccm_sip_event_core::logging::{self, LoggingConfig};
use ccm_sip_event_core::{SipEventConfig, SipEventManager};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{info, warn};

use crate::args::Cli;

const APP_NAME: &str = "ccm-replay";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    let mut logging_config = LoggingConfig::from_section(&config.logging, APP_NAME)?;
    if cli.json_logs {
        logging_config = logging_config.with_json();
    }
    logging::setup_logging(&logging_config)?;
    logging::log_welcome(&logging_config, env!("CARGO_PKG_VERSION"));

    let (manager, stores) = SipEventManager::in_memory(config)?;
    if !manager.config().enabled {
        warn!("SIP event handling is disabled, every event will be reported as NothingChanged");
    }
    let mut stdout = std::io::stdout();

    let stats = if cli.input == "-" {
        let reader = BufReader::new(tokio::io::stdin());
        replay::replay(&manager, reader, &mut stdout).await?
    } else {
        let file = tokio::fs::File::open(&cli.input)
            .await
            .with_context(|| format!("opening input {}", cli.input))?;
        replay::replay(&manager, BufReader::new(file), &mut stdout).await?
    };

    info!(
        "Replayed {} events ({} call changes, {} codec changes), {} malformed lines skipped",
        stats.processed, stats.call_changes, stats.codec_changes, stats.malformed
    );

    if cli.summary {
        let summary = replay::summary(&stats, &stores, cli.show_numbers).await?;
        println!("{}", summary);
    }
    Ok(())
}

/// `--config`, else the per-user config file if present, else the
/// environment. Command line flags win over all of them.
fn load_config(cli: &Cli) -> Result<SipEventConfig> {
    let mut config = match cli.config.clone().or_else(default_config_path) {
        Some(path) => SipEventConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => SipEventConfig::from_env()?,
    };

    if let Some(domain) = &cli.sip_domain {
        config.sip_domain = domain.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    config.validate()?;
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("ccm").join("sip-events.toml"))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sip_domain = \"file.sr.se\"\n[logging]\nlevel = \"warn\"").unwrap();

        let path = file.path().to_string_lossy().to_string();
        let cli = Cli::try_parse_from([
            "ccm-replay",
            "--config",
            path.as_str(),
            "--log-level",
            "debug",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.json);

        let cli = Cli::try_parse_from(["ccm-replay", "--config", path.as_str(), "--sip-domain", "cli.sr.se"])
            .unwrap();
        assert_eq!(load_config(&cli).unwrap().sip_domain, "cli.sr.se");
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli::try_parse_from(["ccm-replay", "--config", "/nonexistent/ccm.toml"]).unwrap();
        assert!(load_config(&cli).is_err());
    }
}
