use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use crate::callback::{self, HitLedger, ListenerSettings, ListenerState};
use crate::cli::commands::ListenArgs;
use crate::config::{self, defaults, ProbeConfig};
use crate::errors::ProbeError;
use crate::payloads::Corpus;

pub async fn handle_listen(args: ListenArgs, config_path: Option<&Path>) -> Result<(), ProbeError> {
    let file_config = match config_path {
        Some(path) => config::parse_config(path).await?,
        None => ProbeConfig::default(),
    };
    let (settings, wordlist) = resolve_settings(&args, &file_config)?;

    // Hits are still logged without a corpus, they just cannot be resolved.
    let corpus = match Corpus::load(&wordlist).await {
        Ok(corpus) => corpus,
        Err(e) => {
            warn!(error = %e, "Listening without a payload corpus");
            Corpus::default()
        }
    };

    if let Some(parent) = settings.result_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let ledger = HitLedger::new(&settings.result_file, settings.max_hits);
    print_banner(&settings, &ledger, &wordlist);
    let state = ListenerState::new(ledger, corpus, &settings.scheme);

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down listener, sorting results");
            token.cancel();
        }
    });

    callback::serve(&settings, state, shutdown).await?;
    println!("{}", console::style("Listener stopped, results sorted by payload id").green());
    Ok(())
}

/// Listener settings after merging CLI flags over the config file over the
/// built-in defaults, plus the wordlist to resolve ids against.
pub fn resolve_settings(args: &ListenArgs, file: &ProbeConfig) -> Result<(ListenerSettings, PathBuf), ProbeError> {
    let section = file.listener.clone().unwrap_or_default();

    let port = args.port.or(section.port).unwrap_or(defaults::LISTEN_PORT);
    let redirect_port = args.redirect_port.or(section.redirect_port);
    if redirect_port == Some(port) {
        return Err(ProbeError::Config(format!("Redirect port {} is the listener port", port)));
    }

    let capped = args.ctf_mode || section.ctf_mode.unwrap_or(false);
    let max_hits = if capped {
        let max = args.max_hits.or(section.max_hits).unwrap_or(defaults::MAX_HITS);
        if max == 0 {
            return Err(ProbeError::Config("--max-hits must be at least 1".into()));
        }
        Some(max)
    } else {
        None
    };

    let scheme = args
        .scheme
        .clone()
        .or(section.scheme)
        .unwrap_or_else(|| if redirect_port.is_some() { "https" } else { "http" }.to_string())
        .to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(ProbeError::Config(format!("Unknown scheme '{}', expected http or https", scheme)));
    }

    let settings = ListenerSettings {
        host: args
            .host
            .clone()
            .or(section.host)
            .unwrap_or_else(|| defaults::LISTEN_HOST.to_string()),
        port,
        scheme,
        redirect_port,
        result_file: args
            .result
            .clone()
            .or(section.result_file)
            .unwrap_or_else(|| PathBuf::from(defaults::RESULT_FILE)),
        max_hits,
    };
    let wordlist = args
        .wordlist
        .clone()
        .or(section.wordlist)
        .unwrap_or_else(|| PathBuf::from(defaults::WORDLIST));
    Ok((settings, wordlist))
}

fn print_banner(settings: &ListenerSettings, ledger: &HitLedger, wordlist: &Path) {
    use console::style;

    let rule = "=".repeat(70);
    println!("{}", style(&rule).cyan());
    println!("{}", style("XSS callback listener").bold());
    println!("{}", style(&rule).cyan());
    println!("Listening:   {}://{}:{}", settings.scheme, settings.host, settings.port);
    if let Some(port) = settings.redirect_port {
        println!("Redirect:    http://{}:{} -> https", settings.host, port);
    }
    match ledger.max_hits() {
        Some(max) => println!("Capped mode: {} (max {} hits per payload)", style("enabled").green(), max),
        None => println!("Capped mode: disabled"),
    }
    println!("Wordlist:    {}", wordlist.display());
    println!("Hit log:     {}", ledger.hit_log().display());
    println!("Result file: {}", style(ledger.result_file().display()).green());
    println!("{}", style(&rule).cyan());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use crate::cli::commands::{Cli, Commands};

    fn listen_args(argv: &[&str]) -> ListenArgs {
        let mut full = vec!["xssprobe", "listen"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Listen(args) => args,
            _ => panic!("expected listen"),
        }
    }

    #[test]
    fn test_uncapped_by_default() {
        let (settings, wordlist) = resolve_settings(&listen_args(&[]), &ProbeConfig::default()).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.max_hits, None);
        assert_eq!(settings.scheme, "http");
        assert_eq!(wordlist, PathBuf::from(defaults::WORDLIST));
    }

    #[test]
    fn test_ctf_mode_uses_default_cap() {
        let (settings, _) = resolve_settings(&listen_args(&["--ctf-mode"]), &ProbeConfig::default()).unwrap();
        assert_eq!(settings.max_hits, Some(3));
        let (settings, _) = resolve_settings(&listen_args(&["--ctf-mode", "--max-hits", "5"]), &ProbeConfig::default()).unwrap();
        assert_eq!(settings.max_hits, Some(5));
    }

    #[test]
    fn test_redirect_implies_https_and_must_differ() {
        let (settings, _) = resolve_settings(&listen_args(&["-p", "443", "--redirect-port", "80"]), &ProbeConfig::default()).unwrap();
        assert_eq!(settings.scheme, "https");
        assert!(resolve_settings(&listen_args(&["-p", "80", "--redirect-port", "80"]), &ProbeConfig::default()).is_err());
    }
}
