use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ccm-replay")]
#[command(about = "Replay SIP registration and dialog events through the CCM event engine")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "CCM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Newline-delimited JSON events, `-` for stdin
    #[arg(short, long, default_value = "-")]
    pub input: String,

    /// Home SIP domain, overrides the configuration
    #[arg(long)]
    pub sip_domain: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Print ongoing calls and counts when the input is exhausted
    #[arg(long)]
    pub summary: bool,

    /// Show telephone numbers unmasked in the summary
    #[arg(long, requires = "summary")]
    pub show_numbers: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["ccm-replay"]).unwrap();
        assert_eq!(cli.input, "-");
        assert!(!cli.summary);
        assert!(cli.sip_domain.is_none());
    }

    #[test]
    fn test_show_numbers_requires_summary() {
        assert!(Cli::try_parse_from(["ccm-replay", "--show-numbers"]).is_err());
        let cli = Cli::try_parse_from(["ccm-replay", "--summary", "--show-numbers"]).unwrap();
        assert!(cli.show_numbers);
    }
}
