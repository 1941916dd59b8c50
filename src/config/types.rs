use std::path::PathBuf;
use serde::{Deserialize, Serialize};

/// Built-in defaults, the last layer under CLI flags and the config file.
pub mod defaults {
    pub const WORDLIST: &str = "wordlists/www_input_payloads.txt";
    pub const DELAY_SECS: f64 = 3.0;
    pub const THREADS: usize = 1;
    pub const MAX_THREADS: usize = 10;
    pub const OUTPUT: &str = "result/findings.txt";
    pub const WEBDRIVER_URL: &str = "http://127.0.0.1:4444";
    pub const PAGE_LOAD_TIMEOUT_SECS: u64 = 10;
    pub const SETTLE_MS: u64 = 500;
    pub const RETRY_ATTEMPTS: u32 = 2;
    pub const LISTEN_HOST: &str = "0.0.0.0";
    pub const LISTEN_PORT: u16 = 8080;
    pub const RESULT_FILE: &str = "result/working.txt";
    pub const HIT_LOG_NAME: &str = "xss_hits.log";
    pub const MAX_HITS: u32 = 3;
}

/// Top-level YAML configuration. Every field is optional; CLI flags win.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProbeConfig {
    pub scan: Option<ScanSection>,
    pub browser: Option<BrowserSection>,
    pub listener: Option<ListenerSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ScanSection {
    pub wordlist: Option<PathBuf>,
    pub threads: Option<usize>,
    pub delay_secs: Option<f64>,
    pub output: Option<PathBuf>,
    /// Attacker callback origin, e.g. `https://cb.example.net`.
    pub server: Option<String>,
    pub retry_attempts: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BrowserSection {
    pub webdriver_url: Option<String>,
    pub browser: Option<BrowserKind>,
    pub headless: Option<bool>,
    pub page_load_timeout_secs: Option<u64>,
    pub settle_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ListenerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub wordlist: Option<PathBuf>,
    pub result_file: Option<PathBuf>,
    pub ctf_mode: Option<bool>,
    pub max_hits: Option<u32>,
    pub redirect_port: Option<u16>,
    pub scheme: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Firefox,
    Chrome,
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrowserKind::Firefox => write!(f, "firefox"),
            BrowserKind::Chrome => write!(f, "chrome"),
        }
    }
}
