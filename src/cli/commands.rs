use std::path::PathBuf;
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use crate::config::BrowserKind;

#[derive(Parser)]
#[command(name = "xssprobe", version, about = "Browser-driven blind XSS detection with out-of-band callback correlation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inject every payload through a real browser and record what fires
    Scan(ScanArgs),
    /// Run the callback listener that correlates out-of-band hits
    Listen(ListenArgs),
    /// Canonicalise a findings file, result file or hit log offline
    Sort(SortArgs),
}

#[derive(Args, Clone)]
#[command(group(ArgGroup::new("source").required(true).args(["target", "request"])))]
pub struct ScanArgs {
    /// Target URL containing the FUZZ marker
    #[arg(short, long)]
    pub target: Option<String>,

    /// Raw HTTP request file containing the FUZZ marker
    #[arg(short, long)]
    pub request: Option<PathBuf>,

    /// Payload wordlist, one payload per line
    #[arg(short, long)]
    pub wordlist: Option<PathBuf>,

    /// Concurrent browser sessions (1-10)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Seconds to wait for out-of-band callbacks after each payload
    #[arg(short, long)]
    pub delay: Option<f64>,

    /// Findings file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Raw HTTP request file for the page that renders stored input
    #[arg(long)]
    pub second_order: Option<PathBuf>,

    /// Run the browser headless (default)
    #[arg(long, conflicts_with = "no_headless")]
    pub headless: bool,

    /// Show the browser window
    #[arg(long)]
    pub no_headless: bool,

    /// Attacker callback server, e.g. https://cb.example.net
    #[arg(long)]
    pub server: Option<String>,

    /// WebDriver endpoint (geckodriver/chromedriver)
    #[arg(long)]
    pub webdriver: Option<String>,

    /// Browser driven by the WebDriver endpoint
    #[arg(long, value_enum)]
    pub browser: Option<BrowserKind>,
}

impl ScanArgs {
    /// `Some` only when one of the two flags was given.
    pub fn headless_flag(&self) -> Option<bool> {
        if self.no_headless {
            Some(false)
        } else if self.headless {
            Some(true)
        } else {
            None
        }
    }
}

#[derive(Args, Clone)]
pub struct ListenArgs {
    /// Listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Listen address
    #[arg(long)]
    pub host: Option<String>,

    /// Payload wordlist the tracking ids refer to
    #[arg(short, long)]
    pub wordlist: Option<PathBuf>,

    /// Result file for correlated hits
    #[arg(short, long)]
    pub result: Option<PathBuf>,

    /// Cap recorded hits per payload
    #[arg(long)]
    pub ctf_mode: bool,

    /// Hits recorded per payload in capped mode
    #[arg(long)]
    pub max_hits: Option<u32>,

    /// Plain-HTTP port that redirects to HTTPS
    #[arg(long)]
    pub redirect_port: Option<u16>,

    /// Scheme clients use to reach this listener (http or https)
    #[arg(long)]
    pub scheme: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortKind {
    /// Scanner findings file
    Findings,
    /// Listener result file
    Hits,
    /// One-line-per-hit log
    HitLog,
}

#[derive(Args, Clone)]
pub struct SortArgs {
    /// File to sort in place
    pub file: PathBuf,

    /// File format; guessed from the file name when omitted
    #[arg(long, value_enum)]
    pub kind: Option<SortKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_requires_target_or_request() {
        assert!(Cli::try_parse_from(["xssprobe", "scan", "-w", "p.txt"]).is_err());
        assert!(Cli::try_parse_from(["xssprobe", "scan", "-t", "http://a/?q=FUZZ", "-r", "req.txt"]).is_err());
        assert!(Cli::try_parse_from(["xssprobe", "scan", "-t", "http://a/?q=FUZZ"]).is_ok());
    }

    #[test]
    fn test_headless_flags() {
        let cli = Cli::try_parse_from(["xssprobe", "scan", "-t", "http://a/?q=FUZZ", "--no-headless"]).unwrap();
        let Commands::Scan(args) = cli.command else { panic!("expected scan") };
        assert_eq!(args.headless_flag(), Some(false));

        let cli = Cli::try_parse_from(["xssprobe", "scan", "-t", "http://a/?q=FUZZ"]).unwrap();
        let Commands::Scan(args) = cli.command else { panic!("expected scan") };
        assert_eq!(args.headless_flag(), None);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["xssprobe", "listen", "-p", "9000", "-vv", "--config", "x.yaml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("x.yaml")));
    }
}
