use clap::Parser;
use tracing_subscriber::EnvFilter;
use xssprobe::cli::{self, Cli, Commands};
use xssprobe::errors::ProbeError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!cli.no_color)
        .init();

    if cli.no_color {
        console::set_colors_enabled(false);
    }

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        git = option_env!("GIT_HASH").unwrap_or("unknown"),
        built = env!("BUILD_TIMESTAMP"),
        "xssprobe starting"
    );

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Scan(args) => cli::scan::handle_scan(args, config).await,
        Commands::Listen(args) => cli::listen::handle_listen(args, config).await,
        Commands::Sort(args) => cli::sort::handle_sort(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let exit_code = match &e {
            ProbeError::Config(_) => 2,
            ProbeError::SessionCreation(_) => 3,
            _ => 1,
        };
        std::process::exit(exit_code);
    }
}
